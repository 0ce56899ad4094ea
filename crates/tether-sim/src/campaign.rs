//! Multi-seed campaigns over the commit simulator.
//!
//! Executes many seeds with one parameter set, collecting pass/fail results
//! and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::FaultConfig;
use crate::oracle::{InvariantViolation, OracleResult, SyncOracle};
use crate::user::WorkloadConfig;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: which seeds to run and the workload and
/// fault parameters every seed shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Seeds to run, e.g. `0..100`.
    pub seed_range: Range<u64>,
    /// Simulated operators per seed.
    pub users: usize,
    /// Rows owned by each operator.
    pub keys_per_user: usize,
    pub bursts_per_user: usize,
    /// Longest typing burst, in intents.
    pub max_burst_len: u64,
    /// Debounce quiet window of the committer under test.
    pub quiet_ms: u64,
    pub saved_display_ms: u64,
    /// Upper bound of simulated request latency.
    pub max_latency_ms: u64,
    /// Requests lost in transit (percent, 0–100).
    pub transport_failure_percent: u8,
    /// Requests refused by the server (percent, 0–100).
    pub reject_percent: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let workload = WorkloadConfig::default();
        let fault = FaultConfig::default();
        Self {
            seed_range: 0..100,
            users: workload.users,
            keys_per_user: workload.keys_per_user,
            bursts_per_user: workload.bursts_per_user,
            max_burst_len: workload.max_burst_len,
            quiet_ms: workload.quiet_ms,
            saved_display_ms: SimulationConfig::default().saved_display_ms,
            max_latency_ms: fault.max_latency_ms,
            transport_failure_percent: fault.transport_failure_percent,
            reject_percent: fault.reject_percent,
        }
    }
}

impl CampaignConfig {
    /// The per-seed [`SimulationConfig`] this campaign runs.
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            workload: WorkloadConfig {
                users: self.users,
                keys_per_user: self.keys_per_user,
                bursts_per_user: self.bursts_per_user,
                max_burst_len: self.max_burst_len,
                quiet_ms: self.quiet_ms,
            },
            fault: FaultConfig {
                max_latency_ms: self.max_latency_ms,
                transport_failure_percent: self.transport_failure_percent,
                reject_percent: self.reject_percent,
            },
            saved_display_ms: self.saved_display_ms,
        }
    }

    /// Reject workloads the simulator cannot drive.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty seed range, an empty workload, or a
    /// fault rate above 100%.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.users == 0 {
            bail!("users must be > 0");
        }
        if self.keys_per_user == 0 {
            bail!("keys_per_user must be > 0");
        }
        if self.max_burst_len == 0 {
            bail!("max_burst_len must be > 0");
        }
        if self.quiet_ms < 2 {
            bail!("quiet_ms must be >= 2");
        }
        if self.transport_failure_percent > 100 || self.reject_percent > 100 {
            bail!("fault percentages must be within 0..=100");
        }
        Ok(())
    }
}

/// A seed whose run broke at least one invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    /// Invariant violations found, formatted for humans.
    pub violations: Vec<String>,
}

/// Totals across every seed of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// Lowest failing seed, the one to replay first.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that exercised an abort or a failed commit.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Everything recorded while replaying one seed.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Outcome of one seed: the raw run plus the oracle verdict.
struct SeedRun {
    result: SimulationResult,
    oracle: OracleResult,
}

fn execute(seed: u64, config: &CampaignConfig) -> Result<SeedRun> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = SyncOracle::check_all(&result);
    Ok(SeedRun { result, oracle })
}

/// Run every seed in `config.seed_range` and collect the failures.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let run = execute(seed, config)?;

        if run.result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }
        if run.oracle.passed {
            report.seeds_passed += 1;
        } else {
            warn!(seed, violations = run.oracle.violations.len(), "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: run.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed,
        interesting = report.interesting_states_reached,
        "campaign finished"
    );
    Ok(report)
}

/// Run one seed. The inner `Err` carries the broken invariants.
///
/// # Errors
///
/// Returns an error if the simulator rejects the config or its runtime fails
/// to start.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let run = execute(seed, config)?;
    if run.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(run.oracle.violations))
    }
}

/// Re-run one seed and keep its full trace alongside the oracle verdict.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    let SeedRun { result, oracle } = execute(seed, config)?;
    Ok(DetailedTrace { result, oracle })
}

/// One-line description of a violation for text output.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::Unsettled { key, status } => {
            format!("Unsettled: {key} still {status:?} after drain")
        }
        InvariantViolation::DisplayDiverged {
            key,
            displayed,
            committed,
        } => format!(
            "DisplayDiverged: {key} shows {displayed:?} but committed is {committed:?}"
        ),
        InvariantViolation::BackendDisagreement {
            key,
            committed,
            server,
        } => format!(
            "BackendDisagreement: {key} committed={committed:?} server={server:?}"
        ),
        InvariantViolation::LastIntentLost {
            key,
            last_intent,
            committed,
        } => format!(
            "LastIntentLost: server applied {last_intent} for {key} but client holds {committed:?}"
        ),
        InvariantViolation::OutOfOrder {
            key,
            earlier,
            later,
        } => format!("OutOfOrder: {key} applied {earlier} after {later}"),
        InvariantViolation::IntermediateCommitted { key, value } => {
            format!("IntermediateCommitted: {key} sent mid-burst value {value}")
        }
        InvariantViolation::BurstCommitCount {
            key,
            bursts,
            commits,
        } => format!("BurstCommitCount: {key} had {bursts} bursts but {commits} commits"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_config_default_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn campaign_config_empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn campaign_config_zero_users_rejected() {
        let config = CampaignConfig {
            users: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn campaign_config_tiny_quiet_window_rejected() {
        let config = CampaignConfig {
            quiet_ms: 1,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_for_seed_uses_correct_seed() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.workload.users, config.users);
        assert_eq!(sim.fault.max_latency_ms, config.max_latency_ms);
    }

    #[test]
    fn run_single_seed_passes_without_faults() {
        let config = CampaignConfig {
            transport_failure_percent: 0,
            reject_percent: 0,
            ..CampaignConfig::default()
        };
        let result = run_single_seed(0, &config).expect("sim should not error");
        assert!(result.is_ok(), "seed 0 should pass: {result:?}");
    }

    #[test]
    fn run_campaign_100_seeds_pass() {
        // Faults are safe to keep on: every invariant must hold whether a
        // commit lands, fails, or is superseded.
        let report = run_campaign(&CampaignConfig::default()).expect("campaign should not error");
        assert_eq!(report.seeds_run, 100);
        assert!(
            report.all_passed(),
            "campaign failed: {} failures, first at seed {:?}: {:?}",
            report.failures.len(),
            report.first_failure,
            report.failures.first(),
        );
    }

    #[test]
    fn campaign_reaches_interesting_states() {
        let config = CampaignConfig {
            seed_range: 0..20,
            max_latency_ms: 3000,
            transport_failure_percent: 30,
            reject_percent: 20,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert!(report.all_passed(), "{:?}", report.failures.first());
        assert!(
            report.interesting_states_reached > 0,
            "expected some seeds to exercise aborts or failures"
        );
    }

    #[test]
    fn replay_is_deterministic() {
        let config = CampaignConfig::default();
        let first = replay_seed(7, &config).expect("replay 1");
        let second = replay_seed(7, &config).expect("replay 2");

        assert!(!first.result.trace.is_empty());
        assert_eq!(first.result, second.result);
        assert_eq!(first.oracle, second.oracle);
    }

    #[test]
    fn campaign_report_serializes_to_json() {
        let report = CampaignReport {
            seeds_run: 10,
            seeds_passed: 9,
            first_failure: Some(7),
            failures: vec![SeedFailure {
                seed: 7,
                violations: vec!["OutOfOrder: victim-1.status applied 2 after 5".into()],
            }],
            interesting_states_reached: 5,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"seeds_run\":10"));
        assert!(json.contains("\"first_failure\":7"));
    }

    #[test]
    fn format_violation_produces_readable_strings() {
        let s = format_violation(&InvariantViolation::BurstCommitCount {
            key: "victim-0.status".into(),
            bursts: 3,
            commits: 4,
        });
        assert!(s.starts_with("BurstCommitCount"));
        assert!(s.contains("3 bursts but 4 commits"));
    }
}
