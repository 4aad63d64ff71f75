//! `cg inspect`: the shape of a saved history.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use cartograph_core::config::EffectiveConfig;
use cartograph_core::model::IdGenerator;
use clap::Args;
use serde::Serialize;

use super::HistorySource;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub source: HistorySource,
}

#[derive(Debug, Serialize)]
pub struct InspectOutput {
    pub path: String,
    pub version: u32,
    pub saved_at: Option<String>,
    pub edits: usize,
    pub index: usize,
    pub entities: usize,
    pub base_entities: usize,
    /// Annotations up to and including the cursor.
    pub annotations: Vec<String>,
    pub undo_annotation: Option<String>,
    pub redo_annotation: Option<String>,
    pub next_ids: IdGenerator,
}

/// Execute `cg inspect`.
///
/// # Errors
///
/// Returns an error if the saved history cannot be loaded.
pub fn run_inspect(
    args: &InspectArgs,
    output: OutputMode,
    project_root: &Path,
    config: &EffectiveConfig,
) -> Result<()> {
    let loaded = args.source.load(project_root, config)?;
    let saved = &loaded.saved;
    let out = InspectOutput {
        path: loaded.path.display().to_string(),
        version: saved.version,
        saved_at: saved.saved_at().map(|t| t.to_rfc3339()),
        edits: saved.stack.len(),
        index: saved.index,
        entities: saved.entities.len(),
        base_entities: saved.base_entities.len(),
        annotations: saved.annotations().into_iter().map(str::to_owned).collect(),
        undo_annotation: loaded.history.undo_annotation().map(str::to_owned),
        redo_annotation: loaded.history.redo_annotation().map(str::to_owned),
        next_ids: saved.next_ids.clone(),
    };

    render_mode(
        output,
        &out,
        |o, w| {
            writeln!(w, "version\t{}", o.version)?;
            writeln!(w, "index\t{}/{}", o.index, o.edits)?;
            writeln!(w, "entities\t{}\t{}", o.entities, o.base_entities)?;
            writeln!(w, "next_ids\t{}\t{}\t{}", o.next_ids.node, o.next_ids.way, o.next_ids.relation)?;
            for annotation in &o.annotations {
                writeln!(w, "annotation\t{annotation}")?;
            }
            Ok(())
        },
        |o, w| {
            pretty_section(w, &format!("Saved history {}", o.path))?;
            pretty_kv(w, "Version", o.version.to_string())?;
            pretty_kv(w, "Saved", o.saved_at.as_deref().unwrap_or("-"))?;
            pretty_kv(w, "Cursor", format!("{} of {} edits", o.index, o.edits))?;
            pretty_kv(w, "Entities", format!("{} ({} base)", o.entities, o.base_entities))?;
            pretty_kv(w, "Undo", o.undo_annotation.as_deref().unwrap_or("-"))?;
            pretty_kv(w, "Redo", o.redo_annotation.as_deref().unwrap_or("-"))?;
            pretty_kv(
                w,
                "Next ids",
                format!("n{} w{} r{}", o.next_ids.node, o.next_ids.way, o.next_ids.relation),
            )?;
            if !o.annotations.is_empty() {
                writeln!(w)?;
                pretty_section(w, "Annotations")?;
                for (i, annotation) in o.annotations.iter().enumerate() {
                    writeln!(w, "{:>3}. {annotation}", i + 1)?;
                }
            }
            Ok(())
        },
    )
}
