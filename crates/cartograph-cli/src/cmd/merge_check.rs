//! `cg merge-check`: dry-run a save of a saved history against a snapshot
//! of remote entities.
//!
//! The snapshot is a JSON array of entity records as found in saved
//! histories (`id`, `loc`/`nodes`/`members`, `tags`, `version`,
//! `visible`). Nothing is written anywhere: the upload is captured and
//! reported.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use cartograph_core::config::EffectiveConfig;
use cartograph_core::history::Changes;
use cartograph_core::model::EntityRecord;
use cartograph_core::save::{ConflictItem, RemoteError, RemoteService, SaveCoordinator, SaveOutcome};
use cartograph_core::{Entity, EntityId, Strategy};
use clap::Args;
use serde::Serialize;
use tracing::{debug, info};

use super::HistorySource;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Rounds of save-then-resolve before giving up on a strategy.
const MAX_ROUNDS: usize = 4;

#[derive(Args, Debug)]
pub struct MergeCheckArgs {
    #[command(flatten)]
    pub source: HistorySource,

    /// JSON array of remote entity records.
    #[arg(long)]
    pub remote: PathBuf,

    /// Settle every conflict this way (`force_local`/`mine` or
    /// `force_remote`/`theirs`); `safe` only reports them.
    #[arg(long, default_value = "safe")]
    pub strategy: Strategy,
}

/// Remote store backed by a snapshot file. Uploads are captured, not sent.
#[derive(Debug, Default)]
pub struct SnapshotRemote {
    entities: BTreeMap<EntityId, Entity>,
    uploaded: Option<Changes>,
}

impl SnapshotRemote {
    /// # Errors
    ///
    /// Returns an error if a record's geometry does not fit its kind.
    pub fn from_records(records: Vec<EntityRecord>) -> Result<Self> {
        let mut entities = BTreeMap::new();
        for record in records {
            let entity = Entity::try_from(record)?;
            entities.insert(entity.id().clone(), entity);
        }
        Ok(Self {
            entities,
            uploaded: None,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let records: Vec<EntityRecord> =
            serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))?;
        Self::from_records(records)
    }
}

impl RemoteService for SnapshotRemote {
    fn load_entities(&mut self, ids: &[EntityId]) -> Result<Vec<Entity>, RemoteError> {
        Ok(ids.iter().filter_map(|id| self.entities.get(id).cloned()).collect())
    }

    fn upload(&mut self, changes: &Changes) -> Result<(), RemoteError> {
        debug!(entities = changes.len(), "captured upload");
        self.uploaded = Some(changes.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    NoChanges,
    Clean,
    Conflicts,
}

#[derive(Debug, Serialize)]
pub struct Resolution {
    pub id: EntityId,
    pub name: String,
    pub choice: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UploadIds {
    pub modified: Vec<EntityId>,
    pub created: Vec<EntityId>,
    pub deleted: Vec<EntityId>,
}

impl From<&Changes> for UploadIds {
    fn from(changes: &Changes) -> Self {
        let ids = |list: &[std::rc::Rc<Entity>]| list.iter().map(|e| e.id().clone()).collect();
        Self {
            modified: ids(&changes.modified),
            created: ids(&changes.created),
            deleted: ids(&changes.deleted),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MergeCheckOutput {
    pub status: CheckStatus,
    pub strategy: Strategy,
    pub resolved: Vec<Resolution>,
    pub conflicts: Vec<ConflictItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadIds>,
}

/// Save `history` against `remote`, settling conflicts with `strategy` until
/// the save goes through or stops on conflicts it cannot settle.
///
/// # Errors
///
/// Returns an error if the save fails or a conflict offers no choice for
/// `strategy`.
pub fn check(
    history: &mut cartograph_core::History,
    remote: &mut SnapshotRemote,
    coordinator: &SaveCoordinator,
    strategy: Strategy,
) -> Result<MergeCheckOutput> {
    let mut resolved = Vec::new();
    let mut round = 0;
    loop {
        round += 1;
        let items = match coordinator.save(history, remote)? {
            SaveOutcome::NoChanges => {
                return Ok(MergeCheckOutput {
                    status: CheckStatus::NoChanges,
                    strategy,
                    resolved,
                    conflicts: Vec::new(),
                    upload: None,
                });
            }
            SaveOutcome::Uploaded { changes } => {
                info!(round, entities = changes.len(), "merge check is clean");
                return Ok(MergeCheckOutput {
                    status: CheckStatus::Clean,
                    strategy,
                    resolved,
                    conflicts: Vec::new(),
                    upload: Some(UploadIds::from(&changes)),
                });
            }
            SaveOutcome::Conflicts(items) => items,
        };
        if strategy == Strategy::Safe || round == MAX_ROUNDS {
            return Ok(MergeCheckOutput {
                status: CheckStatus::Conflicts,
                strategy,
                resolved,
                conflicts: items,
                upload: None,
            });
        }
        for item in &items {
            let choice = item
                .choices
                .iter()
                .position(|c| c.strategy == strategy)
                .with_context(|| format!("conflict on {} has no {strategy} choice", item.id))?;
            coordinator.resolve(history, item, choice)?;
            resolved.push(Resolution {
                id: item.id.clone(),
                name: item.name.clone(),
                choice: item.choices[choice].label,
            });
        }
    }
}

/// Execute `cg merge-check`. Exits with status 1 when conflicts remain.
///
/// # Errors
///
/// Returns an error if either input cannot be loaded or the save fails.
pub fn run_merge_check(
    args: &MergeCheckArgs,
    output: OutputMode,
    project_root: &Path,
    config: &EffectiveConfig,
) -> Result<()> {
    let mut loaded = args.source.load(project_root, config)?;
    let mut remote = SnapshotRemote::from_file(&args.remote)?;
    let coordinator = SaveCoordinator::new(config.editor.save.clone(), config.editor.merge.clone());
    let out = check(&mut loaded.history, &mut remote, &coordinator, args.strategy)?;

    render_mode(
        output,
        &out,
        |o, w| {
            for r in &o.resolved {
                writeln!(w, "resolved\t{}\t{}", r.id, r.choice)?;
            }
            for item in &o.conflicts {
                for detail in &item.details {
                    writeln!(w, "conflict\t{}\t{detail}", item.id)?;
                }
            }
            if let Some(upload) = &o.upload {
                writeln!(
                    w,
                    "upload\t{}\t{}\t{}",
                    upload.modified.len(),
                    upload.created.len(),
                    upload.deleted.len()
                )?;
            }
            Ok(())
        },
        |o, w| {
            pretty_section(w, "Merge check")?;
            pretty_kv(w, "Strategy", o.strategy.as_str())?;
            let status = match o.status {
                CheckStatus::NoChanges => "nothing to save",
                CheckStatus::Clean => "clean",
                CheckStatus::Conflicts => "conflicts",
            };
            pretty_kv(w, "Status", status)?;
            for r in &o.resolved {
                writeln!(w, "  resolved {} ({}): {}", r.name, r.id, r.choice)?;
            }
            for item in &o.conflicts {
                writeln!(w, "  {} ({})", item.name, item.id)?;
                for detail in &item.details {
                    writeln!(w, "    - {detail}")?;
                }
            }
            if let Some(upload) = &o.upload {
                pretty_kv(
                    w,
                    "Upload",
                    format!(
                        "{} modified, {} created, {} deleted",
                        upload.modified.len(),
                        upload.created.len(),
                        upload.deleted.len()
                    ),
                )?;
            }
            Ok(())
        },
    )?;

    if out.status == CheckStatus::Conflicts {
        process::exit(1);
    }
    Ok(())
}
