#![forbid(unsafe_code)]

use anyhow::Result;
use cartograph_sim::remote::FaultConfig;
use cartograph_sim::{SimulationConfig, Simulator};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Run one deterministic editing session and print its result as JSON.
#[derive(Parser, Debug)]
#[command(name = "cartograph-sim", version)]
struct Args {
    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long, default_value_t = 40)]
    rounds: u64,

    /// Chance per round (percent) of a concurrent remote edit.
    #[arg(long, default_value_t = 30)]
    remote_edits: u8,

    /// Chance per round (percent) of saving.
    #[arg(long, default_value_t = 15)]
    saves: u8,

    /// Chance (percent) of a remote call failing as unavailable.
    #[arg(long, default_value_t = 5)]
    outages: u8,

    /// Chance (percent) of an upload racing a remote edit.
    #[arg(long, default_value_t = 10)]
    races: u8,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CARTOGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut simulator = Simulator::new(SimulationConfig {
        seed: args.seed,
        rounds: args.rounds,
        remote_edit_percent: args.remote_edits,
        save_percent: args.saves,
        fault: FaultConfig {
            unavailable_percent: args.outages,
            race_percent: args.races,
        },
    })?;
    let result = simulator.run()?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.violations.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
