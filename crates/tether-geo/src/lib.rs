//! tether-geo: fenced geocoding cascade and coordinate autofill.
//!
//! [`CandidateResolver`] walks the five lookup strategies against a
//! [`Geocoder`] and accepts the first candidate inside the [`GeoFence`].
//! [`CoordinateAutofill`] is its debounced caller: one state per location
//! form, stale lookups discarded by generation.

pub mod address;
pub mod advisory;
pub mod autofill;
pub mod fence;
pub mod geocoder;
pub mod nominatim;
pub mod resolver;
pub mod session;
pub mod strategy;

pub use address::AddressFields;
pub use advisory::Advisory;
pub use autofill::{CoordinateAutofill, GeoEvent, OwnerKey};
pub use fence::{Coordinate, GeoFence};
pub use geocoder::{Candidate, Geocoder, LookupError};
pub use nominatim::NominatimGeocoder;
pub use resolver::{CandidateResolver, Resolution, StepOutcome, StepRecord};
pub use session::LookupSession;
pub use strategy::{LookupQuery, Strategy, StructuredQuery};
