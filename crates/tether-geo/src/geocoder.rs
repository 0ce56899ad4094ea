use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_core::ErrorCode;

use crate::fence::{Coordinate, GeoFence};
use crate::strategy::LookupQuery;

/// First hit returned for a query. Coordinates arrive as strings and are
/// only trusted once [`coordinate`](Self::coordinate) parses them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub lat: String,
    #[serde(default)]
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Candidate {
    #[must_use]
    pub fn new(lat: impl ToString, lon: impl ToString) -> Self {
        Self {
            lat: lat.to_string(),
            lon: lon.to_string(),
            display_name: None,
        }
    }

    /// Parsed coordinate, or `None` when either part is missing, unparsable
    /// or not finite.
    #[must_use]
    pub fn coordinate(&self) -> Option<Coordinate> {
        let lat = self.lat.trim().parse::<f64>().ok()?;
        let lng = self.lon.trim().parse::<f64>().ok()?;
        let point = Coordinate::new(lat, lng);
        point.is_finite().then_some(point)
    }
}

/// Why a single lookup produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("lookup transport failure: {0}")]
    Transport(String),

    #[error("lookup endpoint answered {0}")]
    Status(u16),

    #[error("lookup response could not be decoded: {0}")]
    Decode(String),
}

impl LookupError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::TransportFailure,
            Self::Status(_) => ErrorCode::Rejected,
            Self::Decode(_) => ErrorCode::LookupDecodeFailed,
        }
    }
}

/// External geocoding collaborator. Returns at most one candidate.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn lookup(
        &self,
        query: &LookupQuery,
        fence: &GeoFence,
    ) -> Result<Option<Candidate>, LookupError>;
}
