//! `cg summary`: what a saved history would upload, grouped by change type.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use cartograph_core::config::EffectiveConfig;
use cartograph_core::difference::ChangeType;
use cartograph_core::{EntityId, EntityKind, History};
use clap::Args;
use serde::Serialize;

use super::HistorySource;
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub source: HistorySource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub id: EntityId,
    pub kind: EntityKind,
    pub change: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryOutput {
    pub created: usize,
    pub modified: usize,
    pub deleted: usize,
    pub rows: Vec<SummaryRow>,
}

/// Summary rows of `history`, ordered by change type then id.
pub fn summarize(history: &History) -> SummaryOutput {
    let mut rows: Vec<SummaryRow> = history
        .difference()
        .summary()
        .into_iter()
        .map(|(id, entry)| SummaryRow {
            kind: entry.entity.kind(),
            change: entry.change_type,
            name: entry.entity.tag("name").map(str::to_owned),
            id,
        })
        .collect();
    rows.sort_by(|a, b| a.change.cmp(&b.change).then_with(|| a.id.cmp(&b.id)));
    let count = |change| rows.iter().filter(|r| r.change == change).count();
    SummaryOutput {
        created: count(ChangeType::Created),
        modified: count(ChangeType::Modified),
        deleted: count(ChangeType::Deleted),
        rows,
    }
}

const fn change_label(change: ChangeType) -> &'static str {
    match change {
        ChangeType::Created => "created",
        ChangeType::Modified => "modified",
        ChangeType::Deleted => "deleted",
    }
}

/// Execute `cg summary`.
///
/// # Errors
///
/// Returns an error if the saved history cannot be loaded.
pub fn run_summary(
    args: &SummaryArgs,
    output: OutputMode,
    project_root: &Path,
    config: &EffectiveConfig,
) -> Result<()> {
    let loaded = args.source.load(project_root, config)?;
    let out = summarize(&loaded.history);

    render_mode(
        output,
        &out,
        |o, w| {
            for row in &o.rows {
                writeln!(
                    w,
                    "{}\t{}\t{}",
                    change_label(row.change),
                    row.id,
                    row.name.as_deref().unwrap_or("")
                )?;
            }
            Ok(())
        },
        |o, w| {
            pretty_section(
                w,
                &format!("{} created, {} modified, {} deleted", o.created, o.modified, o.deleted),
            )?;
            if o.rows.is_empty() {
                writeln!(w, "No changes.")?;
            }
            for row in &o.rows {
                let name = row.name.as_deref().map(|n| format!(" \"{n}\"")).unwrap_or_default();
                writeln!(w, "{:<9} {} {}{name}", change_label(row.change), row.kind.as_str(), row.id)?;
            }
            Ok(())
        },
    )
}
