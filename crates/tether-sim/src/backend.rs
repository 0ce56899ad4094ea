use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_core::{AbortSignal, CommitBackend, CommitError, SyncKey};
use tokio::time::Instant;

use crate::rng::DeterministicRng;
use crate::trace::{Trace, TraceEventKind};

/// Fault injection for the simulated persistence endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Upper bound of the per-request latency.
    pub max_latency_ms: u64,
    /// Percentage of requests that fail in transit and never reach the
    /// server.
    pub transport_failure_percent: u8,
    /// Percentage of requests the server refuses.
    pub reject_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: 1500,
            transport_failure_percent: 10,
            reject_percent: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Apply,
    Transport,
    Reject,
}

/// One write the server accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerWrite {
    pub at_ms: u64,
    pub key: String,
    pub value: u64,
}

/// Authoritative store behind the endpoint.
#[derive(Debug, Default)]
struct ServerState {
    values: BTreeMap<String, u64>,
    log: Vec<ServerWrite>,
}

/// Fault-injecting [`CommitBackend`] driven by virtual time.
///
/// A request sleeps for its latency and then meets its fate. An abort during
/// the latency means the request never reaches the server.
#[derive(Debug)]
pub struct SimulatedBackend {
    fault: FaultConfig,
    rng: Mutex<DeterministicRng>,
    server: Mutex<ServerState>,
    trace: Trace,
    start: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedBackend {
    #[must_use]
    pub fn new(fault: FaultConfig, rng: DeterministicRng, trace: Trace, start: Instant) -> Self {
        Self {
            fault,
            rng: Mutex::new(rng),
            server: Mutex::new(ServerState::default()),
            trace,
            start,
        }
    }

    /// Seed the server with a row's initial value (not logged as a write).
    pub fn seed(&self, key: &SyncKey, value: u64) {
        lock(&self.server).values.insert(key.to_string(), value);
    }

    #[must_use]
    pub fn value(&self, key: &SyncKey) -> Option<u64> {
        lock(&self.server).values.get(&key.to_string()).copied()
    }

    #[must_use]
    pub fn values(&self) -> BTreeMap<String, u64> {
        lock(&self.server).values.clone()
    }

    #[must_use]
    pub fn writes(&self) -> Vec<ServerWrite> {
        lock(&self.server).log.clone()
    }

    fn roll(&self) -> (Duration, Fate) {
        let mut rng = lock(&self.rng);
        let latency = Duration::from_millis(rng.next_inclusive(0, self.fault.max_latency_ms));
        let fate = if rng.hit_rate_percent(self.fault.transport_failure_percent) {
            Fate::Transport
        } else if rng.hit_rate_percent(self.fault.reject_percent) {
            Fate::Reject
        } else {
            Fate::Apply
        };
        drop(rng);
        (latency, fate)
    }

    fn record(&self, kind: TraceEventKind) {
        self.trace.record(self.start, kind);
    }
}

#[async_trait]
impl CommitBackend<u64> for SimulatedBackend {
    async fn commit(
        &self,
        key: &SyncKey,
        value: u64,
        mut abort: AbortSignal,
    ) -> Result<u64, CommitError> {
        let (latency, fate) = self.roll();
        self.record(TraceEventKind::CommitSent {
            key: key.to_string(),
            value,
        });

        if abort
            .until_aborted(tokio::time::sleep(latency))
            .await
            .is_none()
        {
            return Err(CommitError::Aborted);
        }

        match fate {
            Fate::Apply => {
                let at_ms = Trace::elapsed_ms(self.start);
                let mut server = lock(&self.server);
                server.values.insert(key.to_string(), value);
                server.log.push(ServerWrite {
                    at_ms,
                    key: key.to_string(),
                    value,
                });
                drop(server);
                self.record(TraceEventKind::CommitApplied {
                    key: key.to_string(),
                    value,
                });
                Ok(value)
            }
            Fate::Transport => {
                self.record(TraceEventKind::CommitFailed {
                    key: key.to_string(),
                    value,
                    reason: "transport".to_string(),
                });
                Err(CommitError::Transport("simulated connection reset".to_string()))
            }
            Fate::Reject => {
                self.record(TraceEventKind::CommitFailed {
                    key: key.to_string(),
                    value,
                    reason: "rejected".to_string(),
                });
                Err(CommitError::Rejected {
                    status: 400,
                    detail: format!("{value} is not a valid choice"),
                })
            }
        }
    }
}
