//! Conflict check and upload of the local edits.
//!
//! [`SaveCoordinator::save`] pushes one unannotated speculation edit, loads
//! the remote versions of every modified entity, and merges each entity
//! whose versions moved with [`MergeRemoteChanges`] under the safe strategy.
//! If anything conflicts, the speculation edit is popped and the conflicts
//! are returned as [`ConflictItem`]s; the caller picks a side for each with
//! [`SaveCoordinator::resolve`] and saves again. Otherwise the changes are
//! uploaded. A version-conflict response re-runs the check, up to
//! `max_conflict_retries` times. Any other failure pops the speculation edit
//! before the error is returned, so the stack never keeps a partial merge.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::action::{Action, ActionRef, DiscardTags, noop};
use crate::config::{MergeConfig, SaveConfig};
use crate::difference::{ChangeType, Difference};
use crate::error::ErrorCode;
use crate::graph::Graph;
use crate::history::{Changes, History};
use crate::merge::{MergeRemoteChanges, Strategy};
use crate::model::{Entity, EntityId, EntityKind};

/// Failure reported by a [`RemoteService`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The remote store holds newer versions than the upload was based on.
    #[error("remote rejected the upload with a version conflict")]
    VersionConflict,
    #[error("remote service unavailable: {0}")]
    Unavailable(String),
    #[error("remote service rejected the upload: {0}")]
    Rejected(String),
}

impl RemoteError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::VersionConflict => ErrorCode::RemoteVersionConflict,
            Self::Unavailable(_) => ErrorCode::RemoteUnavailable,
            Self::Rejected(_) => ErrorCode::RemoteRejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaveError {
    #[error("a save is already in progress")]
    InProgress,
    #[error("choice {choice} is out of range for a conflict with {len} choices")]
    UnknownChoice { choice: usize, len: usize },
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl SaveError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InProgress => ErrorCode::SaveInProgress,
            Self::UnknownChoice { .. } => ErrorCode::MergeConflict,
            Self::Remote(e) => e.code(),
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// The remote map store.
pub trait RemoteService {
    /// Current remote versions of `ids`. Ids the remote does not know are
    /// left out of the result; deleted entities come back invisible.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the remote cannot be reached.
    fn load_entities(&mut self, ids: &[EntityId]) -> Result<Vec<Entity>, RemoteError>;

    /// Upload one changeset.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::VersionConflict`] when any uploaded entity is
    /// stale, or another [`RemoteError`] on failure.
    fn upload(&mut self, changes: &Changes) -> Result<(), RemoteError>;
}

/// One way of settling a conflicted entity.
#[derive(Debug, Clone)]
pub struct ConflictChoice {
    pub label: &'static str,
    pub strategy: Strategy,
    action: Rc<MergeRemoteChanges>,
}

impl ConflictChoice {
    fn new(label: &'static str, merge: &MergeRemoteChanges, strategy: Strategy) -> Self {
        Self {
            label,
            strategy,
            action: Rc::new(merge.with_strategy(strategy)),
        }
    }
}

/// A conflicted entity as shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictItem {
    pub id: EntityId,
    pub name: String,
    pub details: Vec<String>,
    #[serde(serialize_with = "serialize_choice_labels")]
    pub choices: Vec<ConflictChoice>,
    /// Index into `choices` preselected for the user.
    pub chosen: usize,
}

fn serialize_choice_labels<S: serde::Serializer>(
    choices: &[ConflictChoice],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(choices.iter().map(|c| c.label))
}

#[derive(Debug, Clone)]
pub enum SaveOutcome {
    /// Nothing differs from base; nothing was uploaded.
    NoChanges,
    /// Conflicts must be resolved before saving again. The stack is as it
    /// was before the save.
    Conflicts(Vec<ConflictItem>),
    /// Uploaded. The merged graph is left on the stack as an unannotated edit.
    Uploaded { changes: Changes },
}

struct InProgressGuard<'a>(&'a Cell<bool>);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[derive(Debug)]
pub struct SaveCoordinator {
    save: SaveConfig,
    merge: MergeConfig,
    in_progress: Cell<bool>,
}

impl Default for SaveCoordinator {
    fn default() -> Self {
        Self::new(SaveConfig::default(), MergeConfig::default())
    }
}

impl SaveCoordinator {
    #[must_use]
    pub const fn new(save: SaveConfig, merge: MergeConfig) -> Self {
        Self {
            save,
            merge,
            in_progress: Cell::new(false),
        }
    }

    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.in_progress.get()
    }

    /// Check `history` against `remote` and upload it.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::InProgress`] when called while another save on
    /// this coordinator is running, and [`SaveError::Remote`] when loading
    /// or uploading fails (after the version-conflict retries, if that was
    /// the failure).
    #[instrument(level = "debug", skip_all, fields(edits = history.len()))]
    pub fn save(
        &self,
        history: &mut History,
        remote: &mut dyn RemoteService,
    ) -> Result<SaveOutcome, SaveError> {
        if self.in_progress.replace(true) {
            return Err(SaveError::InProgress);
        }
        let _guard = InProgressGuard(&self.in_progress);

        if !history.has_changes() {
            return Ok(SaveOutcome::NoChanges);
        }
        history.perform(&[noop()], None);

        let mut retries = 0_u32;
        loop {
            let conflicts = match self.check_conflicts(history, remote) {
                Ok(conflicts) => conflicts,
                Err(e) => {
                    warn!(error = %e, "loading remote entities failed; reverting");
                    history.pop(None);
                    return Err(e.into());
                }
            };
            if !conflicts.is_empty() {
                info!(conflicts = conflicts.len(), "save stopped on conflicts");
                history.pop(None);
                return Ok(SaveOutcome::Conflicts(conflicts));
            }

            let changes = self.upload_changes(history);
            if changes.is_empty() {
                history.pop(None);
                return Ok(SaveOutcome::NoChanges);
            }
            match remote.upload(&changes) {
                Ok(()) => {
                    info!(
                        modified = changes.modified.len(),
                        created = changes.created.len(),
                        deleted = changes.deleted.len(),
                        "uploaded changes"
                    );
                    return Ok(SaveOutcome::Uploaded { changes });
                }
                Err(RemoteError::VersionConflict) if retries < self.save.max_conflict_retries => {
                    retries += 1;
                    warn!(retries, "remote reported a version conflict; checking again");
                }
                Err(e) => {
                    warn!(error = %e, "upload failed; reverting");
                    history.pop(None);
                    return Err(e.into());
                }
            }
        }
    }

    /// Apply `choice` of `item` as an annotated edit.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::UnknownChoice`] when `choice` is out of range.
    pub fn resolve(
        &self,
        history: &mut History,
        item: &ConflictItem,
        choice: usize,
    ) -> Result<Difference, SaveError> {
        let picked = item.choices.get(choice).ok_or(SaveError::UnknownChoice {
            choice,
            len: item.choices.len(),
        })?;
        let action: ActionRef = picked.action.clone();
        let annotation = format!("Resolved conflict on {}", item.name);
        Ok(history.perform(&[action], Some(&annotation)))
    }

    /// Entities to upload: the current difference with the discard keys
    /// stripped.
    fn upload_changes(&self, history: &History) -> Changes {
        let ids: Vec<EntityId> = history
            .difference()
            .changes()
            .iter()
            .filter(|(_, change)| change.head.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        let discard = DiscardTags::new(ids, self.merge.discard_tags.iter().cloned());
        history.changes(Some(&discard as &dyn Action))
    }

    fn check_conflicts(
        &self,
        history: &mut History,
        remote: &mut dyn RemoteService,
    ) -> Result<Vec<ConflictItem>, RemoteError> {
        let local_graph = history.graph().clone();
        let mut to_check: BTreeSet<EntityId> = BTreeSet::new();
        for (id, entry) in history.difference().summary() {
            if entry.change_type != ChangeType::Modified {
                continue;
            }
            if entry.entity.kind() == EntityKind::Way {
                for child in local_graph.child_nodes(&entry.entity).unwrap_or_default() {
                    if child.version().is_some() {
                        to_check.insert(child.id().clone());
                    }
                }
            }
            to_check.insert(id);
        }
        if to_check.is_empty() {
            return Ok(Vec::new());
        }

        let remote_graph = load_remote_graph(history.base(), &mut to_check, remote)?;

        let mut items = Vec::new();
        for id in &to_check {
            let (Some(local), Some(theirs)) = (local_graph.has_entity(id), remote_graph.has_entity(id))
            else {
                continue;
            };
            if same_versions(&local, &theirs, &local_graph, &remote_graph) {
                continue;
            }
            let merge = MergeRemoteChanges::new(id.clone(), &local_graph, &remote_graph)
                .with_discard_tags(self.merge.discard_tags.iter().cloned())
                .with_epsilon(self.merge.location_epsilon);
            let merge = Rc::new(merge);
            let action: ActionRef = merge.clone();
            history.replace(&[action], None);

            let conflicts = merge.conflicts();
            if conflicts.is_empty() {
                continue;
            }
            items.push(ConflictItem {
                id: id.clone(),
                name: display_name(&local),
                details: conflicts.iter().map(|c| c.message.clone()).collect(),
                choices: vec![
                    ConflictChoice::new("keep mine", &merge, Strategy::ForceLocal),
                    ConflictChoice::new("use theirs", &merge, Strategy::ForceRemote),
                ],
                chosen: 1,
            });
        }
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }
}

/// Load the remote versions of `to_check` into a graph over `base`, following
/// way children (which are added to `to_check`) and multipolygon members.
fn load_remote_graph(
    base: &Graph,
    to_check: &mut BTreeSet<EntityId>,
    remote: &mut dyn RemoteService,
) -> Result<Graph, RemoteError> {
    let remote_graph = Graph::derive(base, true);
    let mut requested: BTreeSet<EntityId> = BTreeSet::new();
    let mut pending: BTreeSet<EntityId> = to_check.clone();
    while !pending.is_empty() {
        let batch: Vec<EntityId> = pending.iter().cloned().collect();
        requested.append(&mut pending);
        for entity in remote.load_entities(&batch)? {
            let entity = Rc::new(entity);
            let _ = remote_graph.replace(Rc::clone(&entity));
            if !entity.visible() {
                continue;
            }
            if entity.kind() == EntityKind::Way {
                for child in entity.nodes() {
                    to_check.insert(child.clone());
                    if !requested.contains(child) {
                        pending.insert(child.clone());
                    }
                }
            } else if entity.is_multipolygon() {
                for member in entity.member_ids() {
                    if !requested.contains(&member) {
                        pending.insert(member);
                    }
                }
            }
        }
    }
    Ok(remote_graph.freeze())
}

fn same_versions(local: &Entity, remote: &Entity, local_graph: &Graph, remote_graph: &Graph) -> bool {
    if local.version() != remote.version() {
        return false;
    }
    if local.kind() != EntityKind::Way {
        return true;
    }
    local.nodes().iter().chain(remote.nodes()).all(|child| {
        match (local_graph.has_entity(child), remote_graph.has_entity(child)) {
            (Some(a), Some(b)) => a.version() == b.version(),
            _ => true,
        }
    })
}

fn display_name(entity: &Entity) -> String {
    entity
        .tag("name")
        .map_or_else(|| format!("{} {}", entity.kind(), entity.id()), str::to_owned)
}
