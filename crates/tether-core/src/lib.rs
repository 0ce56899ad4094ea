//! tether-core: debounced optimistic commits with generation-guarded
//! reconciliation.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums for commit outcomes, `anyhow::Result` at
//!   the config edge, [`ErrorCode`] for machine-readable codes.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//! - **Concurrency**: registry state sits behind a `std::sync::Mutex` that is
//!   never held across an `.await`; every asynchronous completion checks its
//!   [`GenerationToken`] before writing.

pub mod cancel;
pub mod commit;
pub mod config;
pub mod debounce;
pub mod error;
pub mod guard;
pub mod key;
pub mod registry;

pub use cancel::{AbortHandle, AbortSignal, Cancellable};
pub use commit::{CommitBackend, CommitterConfig, OptimisticCommitter};
pub use debounce::DebounceCoalescer;
pub use error::{CommitError, ErrorCode};
pub use guard::{GenerationToken, RaceGuard};
pub use key::SyncKey;
pub use registry::{FieldValue, SyncEvent, SyncKeyRegistry, SyncSnapshot, SyncStatus};
