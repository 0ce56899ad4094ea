//! `tether sim`: deterministic simulation campaign commands.
//!
//! `tether sim run`: execute a campaign across many seeds.
//! `tether sim replay`: replay a single seed with detailed trace output.

use std::io::Write;
use std::process;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use tether_sim::campaign::{self, CampaignConfig};
use tether_sim::{SimulationStats, TraceEventKind};

use crate::output::{OutputMode, pretty_kv, pretty_section};

/// Top-level arguments for `tether sim`.
#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across multiple seeds",
        long_about = "Drive the optimistic committer through deterministic seeds of bursty\n\
                      edits against a faulty backend. Reports pass/fail per seed and the\n\
                      first failure for replay. Exits with status 1 if any seed fails.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    tether sim run --seeds 100\n\n\
                      # Heavier workload and more faults\n    tether sim run --seeds 200 --users 6 --bursts 10 --faults 30\n\n\
                      # Machine-readable output\n    tether sim run --seeds 100 --format json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay a single seed with detailed trace output",
        long_about = "Replay one seed to get its full event trace, final field states and\n\
                      oracle verdict. Use after a campaign failure to debug.",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    tether sim replay --seed 42\n\n\
                      # Replay with the parameters of the failing campaign\n    tether sim replay --seed 42 --users 6 --faults 30"
    )]
    Replay(SimReplayArgs),
}

/// Workload and fault knobs shared by `run` and `replay`.
#[derive(Args, Debug, Clone, Copy)]
pub struct WorkloadArgs {
    /// Simulated operators.
    #[arg(long, default_value = "3")]
    pub users: usize,

    /// Rows owned by each operator.
    #[arg(long, default_value = "2")]
    pub keys: usize,

    /// Typing bursts per operator.
    #[arg(long, default_value = "6")]
    pub bursts: usize,

    /// Failed requests, in percent. Transport failures use this rate and
    /// rejections half of it.
    #[arg(long, default_value = "10")]
    pub faults: u8,

    /// Upper bound of simulated request latency.
    #[arg(long, default_value = "1500")]
    pub max_latency_ms: u64,
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "100")]
    pub seeds: u64,

    /// Starting seed value.
    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub workload: WorkloadArgs,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    /// Seed to replay.
    #[arg(long)]
    pub seed: u64,

    #[command(flatten)]
    pub workload: WorkloadArgs,

    /// Print every trace event, not only the summary.
    #[arg(long)]
    pub trace: bool,
}

#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    all_passed: bool,
    failures: Vec<campaign::SeedFailure>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
    stats: SimulationStats,
    fields: Vec<FieldOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<Vec<tether_sim::TraceEvent>>,
}

#[derive(Debug, Serialize)]
struct FieldOutput {
    key: String,
    committed: Option<u64>,
    server: Option<u64>,
    status: &'static str,
}

fn campaign_config(seed_start: u64, seeds: u64, args: WorkloadArgs) -> CampaignConfig {
    let faults = args.faults.min(100);
    CampaignConfig {
        seed_range: seed_start..seed_start.saturating_add(seeds),
        users: args.users,
        keys_per_user: args.keys,
        bursts_per_user: args.bursts,
        max_latency_ms: args.max_latency_ms,
        transport_failure_percent: faults,
        reject_percent: faults / 2,
        ..CampaignConfig::default()
    }
}

/// Execute `tether sim run`.
///
/// # Errors
///
/// Returns an error if the campaign configuration is invalid.
pub fn run_sim_run(args: &SimRunArgs, output: OutputMode) -> Result<()> {
    let config = campaign_config(args.seed_start, args.seeds, args.workload);
    let report = campaign::run_campaign(&config)?;

    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        interesting_states_reached: report.interesting_states_reached,
        all_passed: report.all_passed(),
        failures: report.failures,
    };
    let w = args.workload;

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            println!(
                "campaign seeds_run={} users={} keys={} bursts={} faults_pct={} max_latency_ms={}",
                out.seeds_run, w.users, w.keys, w.bursts, w.faults, w.max_latency_ms
            );
            println!(
                "results passed={} failed={} interesting_states={} all_passed={}",
                out.seeds_passed, out.seeds_failed, out.interesting_states_reached, out.all_passed
            );
            if !out.all_passed {
                for failure in out.failures.iter().take(5) {
                    println!(
                        "failure seed={} violations={}",
                        failure.seed,
                        failure.violations.len()
                    );
                }
                if out.failures.len() > 5 {
                    println!("failures_truncated count={}", out.failures.len() - 5);
                }
                println!("hint replay_seed={}", out.first_failure.unwrap_or(0));
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w_out = stdout.lock();
            pretty_section(&mut w_out, "Simulation Campaign")?;
            pretty_kv(&mut w_out, "Seeds", out.seeds_run.to_string())?;
            pretty_kv(
                &mut w_out,
                "Workload",
                format!(
                    "{} users x {} keys, {} bursts each",
                    w.users, w.keys, w.bursts
                ),
            )?;
            pretty_kv(&mut w_out, "Fault rate", format!("{}%", w.faults))?;
            pretty_kv(&mut w_out, "Max latency", format!("{}ms", w.max_latency_ms))?;
            pretty_kv(
                &mut w_out,
                "Results",
                format!(
                    "{} passed / {} failed ({} interesting states)",
                    out.seeds_passed, out.seeds_failed, out.interesting_states_reached
                ),
            )?;

            if out.all_passed {
                pretty_kv(&mut w_out, "Status", "all seeds passed")?;
            } else {
                let first = out.first_failure.unwrap_or(0);
                pretty_kv(
                    &mut w_out,
                    "Status",
                    format!("{} failures (first at seed {first})", out.seeds_failed),
                )?;
                writeln!(w_out)?;
                pretty_section(&mut w_out, "Failure Samples")?;
                for failure in out.failures.iter().take(5) {
                    writeln!(w_out, "seed {:<8} violations={}", failure.seed, failure.violations.len())?;
                    for violation in &failure.violations {
                        writeln!(w_out, "  - {violation}")?;
                    }
                }
                if out.failures.len() > 5 {
                    writeln!(w_out, "... and {} more failures", out.failures.len() - 5)?;
                }
                writeln!(w_out)?;
                pretty_kv(
                    &mut w_out,
                    "Replay",
                    format!(
                        "tether sim replay --seed {first} --users {} --keys {} --bursts {} --faults {}",
                        w.users, w.keys, w.bursts, w.faults
                    ),
                )?;
            }
        }
    }

    // Exit code 1 on any failure for CI integration
    if !out.all_passed {
        process::exit(1);
    }
    Ok(())
}

/// Execute `tether sim replay`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the run fails.
pub fn run_sim_replay(args: &SimReplayArgs, output: OutputMode) -> Result<()> {
    let config = campaign_config(args.seed, 1, args.workload);
    let detail = campaign::replay_seed(args.seed, &config)?;
    let result = &detail.result;

    let fields = result
        .snapshots
        .iter()
        .map(|snap| {
            let key = snap.key.to_string();
            FieldOutput {
                server: result.server.get(&key).copied(),
                committed: snap.committed,
                status: snap.status.label(),
                key,
            }
        })
        .collect();

    let out = ReplayOutput {
        seed: args.seed,
        oracle_passed: detail.oracle.passed,
        violations: detail
            .oracle
            .violations
            .iter()
            .map(campaign::format_violation)
            .collect(),
        interesting_state_reached: result.interesting_state_reached,
        stats: result.stats,
        fields,
        trace: args.trace.then(|| result.trace.clone()),
    };

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            let s = out.stats;
            println!(
                "replay seed={} oracle_passed={} interesting_state_reached={}",
                out.seed, out.oracle_passed, out.interesting_state_reached
            );
            println!(
                "stats intents={} sent={} applied={} failed={} aborted={}",
                s.intents, s.commits_sent, s.commits_applied, s.commits_failed, s.commits_aborted
            );
            for violation in &out.violations {
                println!("violation={violation}");
            }
            for field in &out.fields {
                println!(
                    "field key={} committed={} server={} status={:?}",
                    field.key,
                    display_opt(field.committed),
                    display_opt(field.server),
                    field.status
                );
            }
            if let Some(trace) = &out.trace {
                for event in trace {
                    println!("event at_ms={} {}", event.at_ms, describe(&event.kind));
                }
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            let s = out.stats;
            pretty_section(&mut w, &format!("Replay Seed {}", out.seed))?;
            pretty_kv(&mut w, "Intents", s.intents.to_string())?;
            pretty_kv(
                &mut w,
                "Commits",
                format!(
                    "{} sent, {} applied, {} failed, {} aborted",
                    s.commits_sent, s.commits_applied, s.commits_failed, s.commits_aborted
                ),
            )?;
            pretty_kv(&mut w, "Interesting", out.interesting_state_reached.to_string())?;
            pretty_kv(&mut w, "Oracle", out.oracle_passed.to_string())?;

            if !out.oracle_passed {
                writeln!(w)?;
                pretty_section(&mut w, "Invariant Violations")?;
                for violation in &out.violations {
                    writeln!(w, "- {violation}")?;
                }
            }

            writeln!(w)?;
            pretty_section(&mut w, "Fields")?;
            for field in &out.fields {
                writeln!(
                    w,
                    "{:<20} committed={:<6} server={:<6} {}",
                    field.key,
                    display_opt(field.committed),
                    display_opt(field.server),
                    field.status
                )?;
            }

            if let Some(trace) = &out.trace {
                writeln!(w)?;
                pretty_section(&mut w, "Trace")?;
                for event in trace {
                    writeln!(w, "{:>7}ms  {}", event.at_ms, describe(&event.kind))?;
                }
            }
        }
    }

    if !detail.oracle.passed {
        process::exit(1);
    }
    Ok(())
}

/// Dispatch `tether sim` subcommands.
///
/// # Errors
///
/// Propagates the selected subcommand's error.
pub fn run_sim(args: &SimArgs, output: OutputMode) -> Result<()> {
    match &args.command {
        SimCommand::Run(run_args) => run_sim_run(run_args, output),
        SimCommand::Replay(replay_args) => run_sim_replay(replay_args, output),
    }
}

fn display_opt(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn describe(kind: &TraceEventKind) -> String {
    match kind {
        TraceEventKind::Intent { key, value } => format!("intent  {key} = {value}"),
        TraceEventKind::CommitSent { key, value } => format!("sent    {key} = {value}"),
        TraceEventKind::CommitApplied { key, value } => format!("applied {key} = {value}"),
        TraceEventKind::CommitFailed { key, value, reason } => {
            format!("failed  {key} = {value} ({reason})")
        }
    }
}
