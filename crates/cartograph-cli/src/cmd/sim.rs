//! `cg sim`: deterministic simulation campaigns.
//!
//! `cg sim run` runs many seeds; `cg sim replay` replays one seed with its
//! full trace.

use std::io::Write;
use std::process;

use anyhow::Result;
use cartograph_sim::campaign::{self, CampaignConfig};
use cartograph_sim::{TraceEvent, TraceEventKind};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across many seeds",
        long_about = "Run seeded editing sessions against a simulated remote with concurrent\n\
                      edits, outages and upload races. Each session is checked by the invariant\n\
                      oracle; the first failing seed is reported for replay.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    cg sim run --seeds 100\n\n\
                      # Busier remote, more saves\n    cg sim run --seeds 200 --remote-edits 60 --saves 25\n\n\
                      # Machine-readable output\n    cg sim run --seeds 50 --json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay one seed with its full trace",
        long_about = "Replay a single seed and print every remote edit, local edit and save\n\
                      outcome, followed by any invariant violations.",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    cg sim replay --seed 42\n\n\
                      # Same parameters as the failing campaign\n    cg sim replay --seed 42 --rounds 80 --races 30"
    )]
    Replay(SimReplayArgs),
}

/// Parameters shared by `run` and `replay`.
#[derive(Args, Debug, Clone)]
pub struct SimParams {
    /// Rounds per seed.
    #[arg(long, default_value = "40")]
    pub rounds: u64,

    /// Percent chance per round that the remote is edited first.
    #[arg(long, default_value = "30")]
    pub remote_edits: u8,

    /// Percent chance per round of saving instead of editing.
    #[arg(long, default_value = "15")]
    pub saves: u8,

    /// Percent of remote calls failing as unavailable.
    #[arg(long, default_value = "5")]
    pub outages: u8,

    /// Percent of uploads racing a concurrent remote edit.
    #[arg(long, default_value = "10")]
    pub races: u8,
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "100")]
    pub seeds: u64,

    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub params: SimParams,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    #[arg(long)]
    pub seed: u64,

    #[command(flatten)]
    pub params: SimParams,
}

impl SimParams {
    fn campaign(&self, seed_start: u64, seeds: u64) -> CampaignConfig {
        CampaignConfig {
            seed_range: seed_start..seed_start.saturating_add(seeds),
            rounds: self.rounds,
            remote_edit_percent: self.remote_edits,
            save_percent: self.saves,
            fault_unavailable_percent: self.outages,
            fault_race_percent: self.races,
        }
    }

    fn replay_flags(&self) -> String {
        format!(
            "--rounds {} --remote-edits {} --saves {} --outages {} --races {}",
            self.rounds, self.remote_edits, self.saves, self.outages, self.races
        )
    }
}

#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    uploads: usize,
    all_passed: bool,
    failures: Vec<campaign::SeedFailure>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    passed: bool,
    uploads: usize,
    conflicts_resolved: usize,
    interesting_state_reached: bool,
    violations: Vec<String>,
    trace: Vec<TraceEvent>,
}

/// Execute `cg sim run`. Exits with status 1 when any seed fails.
///
/// # Errors
///
/// Returns an error for invalid parameters or a simulation failure.
pub fn run_sim_run(args: &SimRunArgs, output: OutputMode) -> Result<()> {
    let config = args.params.campaign(args.seed_start, args.seeds);
    let report = campaign::run_campaign(&config)?;
    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        interesting_states_reached: report.interesting_states_reached,
        uploads: report.uploads,
        all_passed: report.all_passed(),
        failures: report.failures,
    };
    let replay = |seed: u64| format!("cg sim replay --seed {seed} {}", args.params.replay_flags());

    render_mode(
        output,
        &out,
        |o, w| {
            writeln!(
                w,
                "results seeds={} passed={} failed={} interesting={} uploads={}",
                o.seeds_run, o.seeds_passed, o.seeds_failed, o.interesting_states_reached, o.uploads
            )?;
            for failure in o.failures.iter().take(5) {
                writeln!(w, "failure seed={} violations={}", failure.seed, failure.violations.len())?;
            }
            if let Some(seed) = o.first_failure {
                writeln!(w, "hint {}", replay(seed))?;
            }
            Ok(())
        },
        |o, w| {
            pretty_section(w, "Simulation campaign")?;
            pretty_kv(w, "Seeds", o.seeds_run.to_string())?;
            pretty_kv(w, "Rounds", args.params.rounds.to_string())?;
            pretty_kv(
                w,
                "Faults",
                format!("{}% outages, {}% races", args.params.outages, args.params.races),
            )?;
            pretty_kv(
                w,
                "Results",
                format!(
                    "{} passed / {} failed ({} interesting, {} uploads)",
                    o.seeds_passed, o.seeds_failed, o.interesting_states_reached, o.uploads
                ),
            )?;
            let Some(seed) = o.first_failure else {
                return pretty_kv(w, "Status", "all seeds passed");
            };
            pretty_kv(w, "Status", format!("{} failures (first at seed {seed})", o.seeds_failed))?;
            writeln!(w)?;
            pretty_section(w, "Failure samples")?;
            for failure in o.failures.iter().take(5) {
                writeln!(w, "seed {:<8}", failure.seed)?;
                for violation in &failure.violations {
                    writeln!(w, "  - {violation}")?;
                }
            }
            if o.failures.len() > 5 {
                writeln!(w, "... and {} more failures", o.failures.len() - 5)?;
            }
            writeln!(w)?;
            pretty_kv(w, "Replay", replay(seed))
        },
    )?;

    if !out.all_passed {
        process::exit(1);
    }
    Ok(())
}

fn describe(kind: &TraceEventKind) -> String {
    match kind {
        TraceEventKind::RemoteTag { id, key, value } => format!("remote  tag {id} {key}={value}"),
        TraceEventKind::RemoteMove { id, to } => format!("remote  move {id} to {to:?}"),
        TraceEventKind::Local { op, applied } => {
            let op = serde_json::to_string(op).unwrap_or_default();
            let skipped = if *applied { "" } else { " (skipped)" };
            format!("local   {op}{skipped}")
        }
        TraceEventKind::Conflicts { ids, resolved } => {
            let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
            let resolved: Vec<String> = resolved.iter().map(ToString::to_string).collect();
            format!("save    conflicts on {} -> {}", ids.join(", "), resolved.join(", "))
        }
        TraceEventKind::Uploaded {
            modified,
            created,
            deleted,
        } => format!("save    uploaded {modified} modified, {created} created, {deleted} deleted"),
        TraceEventKind::NothingToSave => "save    nothing to save".to_string(),
        TraceEventKind::SaveFailed { error } => format!("save    failed: {error}"),
        TraceEventKind::Reload { entities } => format!("reload  {entities} entities"),
    }
}

/// Execute `cg sim replay`. Exits with status 1 when the seed fails.
///
/// # Errors
///
/// Returns an error for invalid parameters or a simulation failure.
pub fn run_sim_replay(args: &SimReplayArgs, output: OutputMode) -> Result<()> {
    let config = args.params.campaign(args.seed, 1);
    let replayed = campaign::replay_seed(args.seed, &config)?;
    let passed = replayed.passed();
    let result = replayed.result;
    let out = ReplayOutput {
        seed: replayed.seed,
        passed,
        uploads: result.uploads,
        conflicts_resolved: result.conflicts_resolved,
        interesting_state_reached: result.interesting_state_reached,
        violations: result.violations.iter().map(campaign::format_violation).collect(),
        trace: result.trace,
    };

    render_mode(
        output,
        &out,
        |o, w| {
            for event in &o.trace {
                writeln!(w, "{}\t{}", event.round, describe(&event.kind))?;
            }
            for violation in &o.violations {
                writeln!(w, "violation\t{violation}")?;
            }
            writeln!(w, "result seed={} passed={}", o.seed, o.passed)
        },
        |o, w| {
            pretty_section(w, &format!("Replay of seed {}", o.seed))?;
            pretty_kv(w, "Events", o.trace.len().to_string())?;
            pretty_kv(w, "Uploads", o.uploads.to_string())?;
            pretty_kv(w, "Resolved", o.conflicts_resolved.to_string())?;
            pretty_kv(w, "Status", if o.passed { "passed" } else { "FAILED" })?;
            writeln!(w)?;
            pretty_section(w, "Trace")?;
            for event in &o.trace {
                writeln!(w, "{:>4}  {}", event.round, describe(&event.kind))?;
            }
            if !o.violations.is_empty() {
                writeln!(w)?;
                pretty_section(w, "Violations")?;
                for violation in &o.violations {
                    writeln!(w, "  - {violation}")?;
                }
            }
            Ok(())
        },
    )?;

    if !passed {
        process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SimParams {
        SimParams {
            rounds: 12,
            remote_edits: 30,
            saves: 20,
            outages: 0,
            races: 0,
        }
    }

    #[test]
    fn campaign_covers_the_requested_seeds() {
        let config = params().campaign(10, 5);
        assert_eq!(config.seed_range, 10..15);
        assert_eq!(config.rounds, 12);
        assert_eq!(config.save_percent, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn replay_hint_repeats_the_parameters() {
        assert_eq!(
            params().replay_flags(),
            "--rounds 12 --remote-edits 30 --saves 20 --outages 0 --races 0"
        );
    }

    #[test]
    fn trace_events_read_as_one_line() {
        let line = describe(&TraceEventKind::Uploaded {
            modified: 2,
            created: 1,
            deleted: 0,
        });
        assert_eq!(line, "save    uploaded 2 modified, 1 created, 0 deleted");
        assert_eq!(describe(&TraceEventKind::NothingToSave), "save    nothing to save");
    }
}
