use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tether_core::{SyncSnapshot, SyncStatus};

use crate::SimulationResult;
use crate::backend::ServerWrite;
use crate::trace::TraceEventKind;
use crate::user::IntentPlan;

// ── Core result types ─────────────────────────────────────────────────────────

/// Outcome of one invariant check, or of all of them merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "invariant", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// A key was still pending (or still showing "saved") at quiescence.
    Unsettled { key: String, status: SyncStatus },

    /// The UI shows something other than the committed value at rest.
    DisplayDiverged {
        key: String,
        displayed: Option<u64>,
        committed: Option<u64>,
    },

    /// The client's committed value disagrees with the server.
    BackendDisagreement {
        key: String,
        committed: Option<u64>,
        server: Option<u64>,
    },

    /// The last intent reached the server but is not what the client holds.
    LastIntentLost {
        key: String,
        last_intent: u64,
        committed: Option<u64>,
    },

    /// The server applied an older value after a newer one.
    OutOfOrder { key: String, earlier: u64, later: u64 },

    /// A value that was not the last of its burst reached the server.
    IntermediateCommitted { key: String, value: u64 },

    /// A burst produced zero or several commit requests.
    BurstCommitCount {
        key: String,
        bursts: usize,
        commits: usize,
    },
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Checks the committer's guarantees against a finished run.
///
/// # Invariants checked
///
/// 1. **Settled** (`check_settled`): every key is `idle` or `error`.
/// 2. **Display** (`check_display`): displayed equals committed at rest.
/// 3. **Backend agreement** (`check_backend_agreement`): committed equals the
///    server's value.
/// 4. **Last intent wins** (`check_last_intent`): if the final intent's
///    commit succeeded, the client holds it.
/// 5. **Generation order** (`check_generation_order`): per key, the server
///    applies values in intent order.
/// 6. **Coalescing** (`check_coalescing`): only the last value of a burst is
///    ever sent, and each burst sends exactly once.
pub struct SyncOracle;

impl SyncOracle {
    #[must_use]
    pub fn check_all(result: &SimulationResult) -> OracleResult {
        Self::check_settled(&result.snapshots)
            .merge(Self::check_display(&result.snapshots))
            .merge(Self::check_backend_agreement(
                &result.snapshots,
                &result.server,
            ))
            .merge(Self::check_last_intent(
                &result.plan,
                &result.snapshots,
                &result.writes,
            ))
            .merge(Self::check_generation_order(&result.writes))
            .merge(Self::check_coalescing(result))
    }

    #[must_use]
    pub fn check_settled(snapshots: &[SyncSnapshot<u64>]) -> OracleResult {
        OracleResult::from_violations(
            snapshots
                .iter()
                .filter(|snap| !matches!(snap.status, SyncStatus::Idle | SyncStatus::Error))
                .map(|snap| InvariantViolation::Unsettled {
                    key: snap.key.to_string(),
                    status: snap.status,
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn check_display(snapshots: &[SyncSnapshot<u64>]) -> OracleResult {
        OracleResult::from_violations(
            snapshots
                .iter()
                .filter(|snap| snap.displayed != snap.committed)
                .map(|snap| InvariantViolation::DisplayDiverged {
                    key: snap.key.to_string(),
                    displayed: snap.displayed,
                    committed: snap.committed,
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn check_backend_agreement(
        snapshots: &[SyncSnapshot<u64>],
        server: &BTreeMap<String, u64>,
    ) -> OracleResult {
        OracleResult::from_violations(
            snapshots
                .iter()
                .filter_map(|snap| {
                    let key = snap.key.to_string();
                    let on_server = server.get(&key).copied();
                    (snap.committed != on_server).then_some(InvariantViolation::BackendDisagreement {
                        key,
                        committed: snap.committed,
                        server: on_server,
                    })
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn check_last_intent(
        plan: &IntentPlan,
        snapshots: &[SyncSnapshot<u64>],
        writes: &[ServerWrite],
    ) -> OracleResult {
        let written: BTreeSet<(&str, u64)> = writes
            .iter()
            .map(|write| (write.key.as_str(), write.value))
            .collect();

        let mut violations = Vec::new();
        for snap in snapshots {
            let Some(last_intent) = plan.last_value_for(&snap.key) else {
                continue;
            };
            let key = snap.key.to_string();
            if written.contains(&(key.as_str(), last_intent)) && snap.committed != Some(last_intent)
            {
                violations.push(InvariantViolation::LastIntentLost {
                    key,
                    last_intent,
                    committed: snap.committed,
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_generation_order(writes: &[ServerWrite]) -> OracleResult {
        let mut latest: BTreeMap<&str, u64> = BTreeMap::new();
        let mut violations = Vec::new();
        for write in writes {
            if let Some(previous) = latest.insert(write.key.as_str(), write.value)
                && previous >= write.value
            {
                violations.push(InvariantViolation::OutOfOrder {
                    key: write.key.clone(),
                    earlier: write.value,
                    later: previous,
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_coalescing(result: &SimulationResult) -> OracleResult {
        let burst_lasts: BTreeSet<(String, u64)> = result
            .plan
            .bursts
            .iter()
            .filter_map(|burst| burst.last_value().map(|v| (burst.key.to_string(), v)))
            .collect();

        let mut violations = Vec::new();
        let mut sent_per_key: BTreeMap<&str, usize> = BTreeMap::new();
        for event in &result.trace {
            if let TraceEventKind::CommitSent { key, value } = &event.kind {
                *sent_per_key.entry(key.as_str()).or_default() += 1;
                if !burst_lasts.contains(&(key.clone(), *value)) {
                    violations.push(InvariantViolation::IntermediateCommitted {
                        key: key.clone(),
                        value: *value,
                    });
                }
            }
        }

        for key in result.plan.keys() {
            let bursts = result.plan.bursts_for(&key).count();
            let rendered = key.to_string();
            let commits = sent_per_key.get(rendered.as_str()).copied().unwrap_or(0);
            if bursts != commits {
                violations.push(InvariantViolation::BurstCommitCount {
                    key: rendered,
                    bursts,
                    commits,
                });
            }
        }
        OracleResult::from_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::SyncKey;

    fn snap(row: u32, committed: u64, displayed: u64, status: SyncStatus) -> SyncSnapshot<u64> {
        SyncSnapshot {
            key: SyncKey::new("victim", row).with_field("status"),
            committed: Some(committed),
            displayed: Some(displayed),
            generation: 2,
            status,
            last_error: None,
        }
    }

    fn write(row: u32, value: u64) -> ServerWrite {
        ServerWrite {
            at_ms: 0,
            key: format!("victim-{row}.status"),
            value,
        }
    }

    #[test]
    fn settled_accepts_idle_and_error_only() {
        let ok = [snap(1, 3, 3, SyncStatus::Idle), snap(2, 0, 0, SyncStatus::Error)];
        assert!(SyncOracle::check_settled(&ok).passed);

        let pending = [snap(1, 3, 4, SyncStatus::Inflight)];
        let result = SyncOracle::check_settled(&pending);
        assert!(!result.passed);
        assert!(matches!(
            result.violations[0],
            InvariantViolation::Unsettled {
                status: SyncStatus::Inflight,
                ..
            }
        ));
    }

    #[test]
    fn display_mismatch_is_reported() {
        let result = SyncOracle::check_display(&[snap(1, 3, 4, SyncStatus::Idle)]);
        assert_eq!(result.violations.len(), 1);
    }

    #[test]
    fn backend_disagreement_is_reported() {
        let snaps = [snap(1, 3, 3, SyncStatus::Idle)];
        let mut server = BTreeMap::new();
        server.insert("victim-1.status".to_string(), 3);
        assert!(SyncOracle::check_backend_agreement(&snaps, &server).passed);

        server.insert("victim-1.status".to_string(), 5);
        assert!(!SyncOracle::check_backend_agreement(&snaps, &server).passed);
    }

    #[test]
    fn out_of_order_writes_are_reported() {
        assert!(SyncOracle::check_generation_order(&[write(1, 2), write(2, 1), write(1, 5)]).passed);

        let result = SyncOracle::check_generation_order(&[write(1, 5), write(1, 2)]);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::OutOfOrder {
                key: "victim-1.status".into(),
                earlier: 2,
                later: 5,
            }]
        );
    }

    #[test]
    fn merge_accumulates_failures() {
        let a = OracleResult::pass();
        let b = OracleResult::from_violations(vec![InvariantViolation::IntermediateCommitted {
            key: "victim-1.status".into(),
            value: 3,
        }]);
        let merged = a.merge(b);
        assert!(!merged.passed);
        assert_eq!(merged.violations.len(), 1);
    }
}
