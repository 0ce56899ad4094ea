#![forbid(unsafe_code)]

use anyhow::Result;
use tether_sim::{SimulationConfig, Simulator};

fn main() -> Result<()> {
    let mut simulator = Simulator::new(SimulationConfig::default())?;
    let result = simulator.run()?;

    println!(
        "simulation complete: intents={} commits_sent={} applied={} failed={} aborted={} interesting={}",
        result.stats.intents,
        result.stats.commits_sent,
        result.stats.commits_applied,
        result.stats.commits_failed,
        result.stats.commits_aborted,
        result.interesting_state_reached
    );

    Ok(())
}
