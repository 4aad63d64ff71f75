//! `cg undo-log`: every edit on the stack, newest first, with the cursor.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use cartograph_core::config::EffectiveConfig;
use cartograph_core::{Difference, History};
use clap::Args;
use serde::Serialize;

use super::HistorySource;
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct UndoLogArgs {
    #[command(flatten)]
    pub source: HistorySource,

    /// Include unannotated edits (merges, intermediate steps).
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub index: usize,
    pub annotation: Option<String>,
    /// Entities this edit changed relative to the one below it.
    pub changed: usize,
    /// Undone edits sit above the cursor and come back with redo.
    pub undone: bool,
    pub current: bool,
}

/// Log entries above the base edit, newest first.
pub fn undo_log(history: &History, all: bool) -> Vec<LogEntry> {
    let edits = history.edits();
    let mut entries: Vec<LogEntry> = edits
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let index = i + 1;
            LogEntry {
                index,
                annotation: pair[1].annotation.clone(),
                changed: Difference::new(&pair[0].graph, &pair[1].graph).len(),
                undone: index > history.index(),
                current: index == history.index(),
            }
        })
        .filter(|e| all || e.annotation.is_some())
        .collect();
    entries.reverse();
    entries
}

/// Execute `cg undo-log`.
///
/// # Errors
///
/// Returns an error if the saved history cannot be loaded.
pub fn run_undo_log(
    args: &UndoLogArgs,
    output: OutputMode,
    project_root: &Path,
    config: &EffectiveConfig,
) -> Result<()> {
    let loaded = args.source.load(project_root, config)?;
    let entries = undo_log(&loaded.history, args.all);

    render_mode(
        output,
        &entries,
        |entries, w| {
            for e in entries {
                let state = if e.undone { "undone" } else { "done" };
                writeln!(
                    w,
                    "{}\t{state}\t{}\t{}",
                    e.index,
                    e.changed,
                    e.annotation.as_deref().unwrap_or("")
                )?;
            }
            Ok(())
        },
        |entries, w| {
            pretty_section(w, "Undo log")?;
            if entries.is_empty() {
                writeln!(w, "Nothing to undo.")?;
            }
            for e in entries {
                let marker = if e.current { "->" } else { "  " };
                let label = e.annotation.as_deref().unwrap_or("(unannotated)");
                let undone = if e.undone { "  [undone]" } else { "" };
                writeln!(w, "{marker} {:>3}  {label} ({} changed){undone}", e.index, e.changed)?;
            }
            Ok(())
        },
    )
}
