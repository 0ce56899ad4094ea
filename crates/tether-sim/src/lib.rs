//! Deterministic simulation harness for the optimistic committer.
//!
//! Every seed runs on a single-threaded tokio runtime with the clock paused,
//! so timers fire in virtual time and identical seeds replay identically.
//! Simulated operators edit rows in bursts while a fault-injecting backend
//! delays, drops, and rejects commits; the [`oracle`] then checks the
//! committer's guarantees once everything has settled.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod backend;
pub mod campaign;
pub mod oracle;
pub mod rng;
pub mod trace;
pub mod user;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tether_core::{CommitterConfig, OptimisticCommitter, SyncSnapshot};
use tokio::time::Instant;
use tracing::debug;

pub use backend::{FaultConfig, ServerWrite, SimulatedBackend};
pub use rng::DeterministicRng;
pub use trace::{Trace, TraceEvent, TraceEventKind};
pub use user::{IntentPlan, WorkloadConfig};

const PLAN_STREAM: u64 = 1;
const BACKEND_STREAM: u64 = 2;

/// Extra virtual time granted after the last intent before the oracle runs.
const DRAIN_MARGIN_MS: u64 = 50;

/// Everything needed to reproduce one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub workload: WorkloadConfig,
    pub fault: FaultConfig,
    /// How long "saved" stays visible before the field returns to idle.
    pub saved_display_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            workload: WorkloadConfig::default(),
            fault: FaultConfig::default(),
            saved_display_ms: 1000,
        }
    }
}

impl SimulationConfig {
    /// Virtual time to wait after the last intent: long enough for the final
    /// debounce, the slowest request, and the saved indicator to run out.
    #[must_use]
    pub const fn drain_ms(&self) -> u64 {
        self.workload.quiet_ms + self.fault.max_latency_ms + self.saved_display_ms + DRAIN_MARGIN_MS
    }
}

/// Counters summarising one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub intents: usize,
    pub commits_sent: usize,
    pub commits_applied: usize,
    pub commits_failed: usize,
    /// Requests superseded by a newer intent before they resolved.
    pub commits_aborted: usize,
}

impl SimulationStats {
    fn from_trace(trace: &[TraceEvent]) -> Self {
        let mut stats = Self::default();
        for event in trace {
            match event.kind {
                TraceEventKind::Intent { .. } => stats.intents += 1,
                TraceEventKind::CommitSent { .. } => stats.commits_sent += 1,
                TraceEventKind::CommitApplied { .. } => stats.commits_applied += 1,
                TraceEventKind::CommitFailed { .. } => stats.commits_failed += 1,
            }
        }
        stats.commits_aborted = stats
            .commits_sent
            .saturating_sub(stats.commits_applied + stats.commits_failed);
        stats
    }
}

/// Output of one run, consumed by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub plan: IntentPlan,
    pub trace: Vec<TraceEvent>,
    /// Client-side state of every key at quiescence.
    pub snapshots: Vec<SyncSnapshot<u64>>,
    /// Server-side value of every key at quiescence.
    pub server: BTreeMap<String, u64>,
    /// Writes the server accepted, in order.
    pub writes: Vec<ServerWrite>,
    pub stats: SimulationStats,
    /// True when the run exercised an abort or a failed commit.
    pub interesting_state_reached: bool,
}

/// Runs one seed.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if the workload cannot produce meaningful bursts.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.workload.users == 0 {
            bail!("workload needs at least one user");
        }
        if config.workload.keys_per_user == 0 {
            bail!("workload needs at least one key per user");
        }
        if config.workload.quiet_ms < 2 {
            bail!("quiet window must be at least 2ms");
        }
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run the seed to quiescence.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .context("failed to build simulation runtime")?;
        Ok(runtime.block_on(drive(self.config)))
    }
}

async fn drive(config: SimulationConfig) -> SimulationResult {
    let start = Instant::now();
    let trace = Trace::new();

    let plan = IntentPlan::generate(
        &config.workload,
        &mut DeterministicRng::fork(config.seed, PLAN_STREAM),
    );
    let backend = Arc::new(SimulatedBackend::new(
        config.fault,
        DeterministicRng::fork(config.seed, BACKEND_STREAM),
        trace.clone(),
        start,
    ));
    let committer = OptimisticCommitter::new(CommitterConfig {
        quiet: Duration::from_millis(config.workload.quiet_ms),
        saved_display: Duration::from_millis(config.saved_display_ms),
    });

    for key in plan.keys() {
        committer.seed(&key, 0);
        backend.seed(&key, 0);
    }

    for intent in &plan.intents {
        tokio::time::sleep_until(start + Duration::from_millis(intent.at_ms)).await;
        trace.record(
            start,
            TraceEventKind::Intent {
                key: intent.key.to_string(),
                value: intent.value,
            },
        );
        committer.schedule_with(intent.key.clone(), intent.value, Arc::clone(&backend));
    }

    tokio::time::sleep(Duration::from_millis(config.drain_ms())).await;

    let snapshots = committer.registry().snapshots();
    committer.shutdown();

    let events = trace.events();
    let stats = SimulationStats::from_trace(&events);
    debug!(
        seed = config.seed,
        intents = stats.intents,
        sent = stats.commits_sent,
        applied = stats.commits_applied,
        failed = stats.commits_failed,
        aborted = stats.commits_aborted,
        "simulation drained"
    );

    SimulationResult {
        seed: config.seed,
        interesting_state_reached: stats.commits_aborted > 0 || stats.commits_failed > 0,
        plan,
        trace: events,
        snapshots,
        server: backend.values(),
        writes: backend.writes(),
        stats,
    }
}
