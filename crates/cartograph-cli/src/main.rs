#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::Path;
use std::process::ExitCode;

use cartograph_core::ErrorCode;
use cartograph_core::config::{EffectiveConfig, resolve_config};
use cartograph_core::history::{PersistError, StorageError};
use cartograph_core::model::RecordError;
use cartograph_core::save::SaveError;
use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "cg: inspect and check cartograph editing histories",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Read",
        about = "Show the shape of a saved history",
        long_about = "Show version, cursor, entity counts, annotations and next placeholder ids\n\
                      of a saved history.",
        after_help = "EXAMPLES:\n    # Inspect a file\n    cg inspect saved_history.json\n\n\
                      # Inspect the history store of this project\n    cg inspect\n\n\
                      # Emit machine-readable output\n    cg inspect saved_history.json --json"
    )]
    Inspect(cmd::inspect::InspectArgs),

    #[command(
        next_help_heading = "Read",
        about = "Summarize created, modified and deleted features",
        long_about = "List the features a saved history changes relative to its base, the way\n\
                      they would be shown before saving.",
        after_help = "EXAMPLES:\n    # Summarize a file\n    cg summary saved_history.json\n\n\
                      # Emit machine-readable output\n    cg summary saved_history.json --json"
    )]
    Summary(cmd::summary::SummaryArgs),

    #[command(
        name = "undo-log",
        next_help_heading = "Read",
        about = "List the edits on the undo stack",
        long_about = "List annotated edits newest first, marking the current edit and the\n\
                      ones that were undone.",
        after_help = "EXAMPLES:\n    # Annotated edits only\n    cg undo-log saved_history.json\n\n\
                      # Include merges and intermediate steps\n    cg undo-log saved_history.json --all"
    )]
    UndoLog(cmd::undo_log::UndoLogArgs),

    #[command(
        name = "merge-check",
        next_help_heading = "Save",
        about = "Dry-run a save against remote entities",
        long_about = "Merge a saved history with a snapshot of remote entities the way a save\n\
                      would, and report conflicts or the resulting upload. Nothing is written.\n\
                      Exits with status 1 when conflicts remain.",
        after_help = "EXAMPLES:\n    # Report conflicts\n    cg merge-check saved_history.json --remote remote.json\n\n\
                      # Keep local values wherever both sides changed\n    cg merge-check saved_history.json --remote remote.json --strategy mine"
    )]
    MergeCheck(cmd::merge_check::MergeCheckArgs),

    #[command(
        next_help_heading = "Develop",
        about = "Deterministic simulation campaigns",
        after_help = "EXAMPLES:\n    # Run a campaign\n    cg sim run --seeds 100\n\n\
                      # Replay a failing seed\n    cg sim replay --seed 7"
    )]
    Sim(cmd::sim::SimArgs),

    #[command(
        next_help_heading = "Develop",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    # Bash\n    cg completions bash > ~/.local/share/bash-completion/completions/cg"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CARTOGRAPH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "cartograph=debug,info"
        } else {
            "cartograph=info,warn"
        })
    });

    let format = env::var("CARTOGRAPH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Stable error code for failures raised by the core library.
fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<PersistError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<StorageError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<SaveError>() {
            Some(e.code())
        } else {
            cause.downcast_ref::<RecordError>().map(RecordError::code)
        }
    })
}

fn to_cli_error(err: &anyhow::Error) -> CliError {
    let message = format!("{err:#}");
    match error_code(err) {
        Some(code) => CliError::with_code(message, code),
        None => CliError::new(message),
    }
}

fn run(cli: Cli, output: OutputMode, project_root: &Path, config: &EffectiveConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Inspect(ref args) => cmd::inspect::run_inspect(args, output, project_root, config),
        Commands::Summary(ref args) => cmd::summary::run_summary(args, output, project_root, config),
        Commands::UndoLog(ref args) => cmd::undo_log::run_undo_log(args, output, project_root, config),
        Commands::MergeCheck(ref args) => {
            cmd::merge_check::run_merge_check(args, output, project_root, config)
        }
        Commands::Sim(ref args) => match &args.command {
            cmd::sim::SimCommand::Run(run) => cmd::sim::run_sim_run(run, output),
            cmd::sim::SimCommand::Replay(replay) => cmd::sim::run_sim_replay(replay, output),
        },
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = match env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("error: cannot read the current directory: {e}");
            return ExitCode::FAILURE;
        }
    };
    let config = match resolve_config(&project_root, cli.json) {
        Ok(config) => config,
        Err(e) => {
            let mode = if cli.json { OutputMode::Json } else { OutputMode::Text };
            let _ = render_error(mode, &CliError::with_code(format!("{e:#}"), ErrorCode::ConfigParseError));
            return ExitCode::FAILURE;
        }
    };
    let output = OutputMode::from_resolved(&config.resolved_output);
    debug!(output = %config.resolved_output, "resolved output mode");

    match run(cli, output, &project_root, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = render_error(output, &to_cli_error(&e));
            ExitCode::FAILURE
        }
    }
}
