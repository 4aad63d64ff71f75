//! Invariant checks run against a session while the simulation runs.
//!
//! 1. **Parent index**: every way lists exactly the nodes that name it as a
//!    parent.
//! 2. **Spatial index**: a tree query returns what a full scan returns.
//! 3. **Undo/redo**: undoing then redoing an annotated edit lands on the very
//!    same graph.
//! 4. **Saved history**: the JSON form restores to the same cursor,
//!    annotations and changes.
//! 5. **Remote edits**: an accepted upload never overwrote a remote tag edit
//!    unless the user chose "keep mine" for that entity.
//! 6. **Save rollback**: a save that stops on conflicts or fails leaves the
//!    stack as it found it.

use std::collections::{BTreeMap, BTreeSet};

use cartograph_core::config::HistoryConfig;
use cartograph_core::history::Changes;
use cartograph_core::{Entity, EntityId, EntityKind, Extent, Graph, History};
use serde::{Deserialize, Serialize};

use crate::remote::SimulatedRemote;
use crate::session::Session;

/// Diagnostic for one failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "invariant", rename_all = "snake_case")]
pub enum InvariantViolation {
    ParentIndex {
        way: EntityId,
        node: EntityId,
    },
    SpatialIndex {
        missing: Vec<EntityId>,
        extra: Vec<EntityId>,
    },
    UndoRedo {
        index: usize,
        detail: String,
    },
    SavedHistory {
        detail: String,
    },
    RemoteEditLost {
        id: EntityId,
        key: String,
        expected: String,
        found: Option<String>,
    },
    SaveRollback {
        before: usize,
        after: usize,
    },
}

/// Oracle result for a batch of checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleResult {
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    fn extend(&mut self, violations: impl IntoIterator<Item = InvariantViolation>) {
        self.violations.extend(violations);
    }
}

/// Everything the simulated world can be queried over.
const WORLD: Extent = Extent::new([-1000.0, -1000.0], [1000.0, 1000.0]);

/// Run the per-round checks (1 to 4) against `session`.
#[must_use]
pub fn check_session(session: &mut Session, config: &HistoryConfig) -> OracleResult {
    let mut result = OracleResult::default();
    result.extend(check_parent_index(session.history().graph()));
    result.extend(check_spatial_index(session.history_mut()));
    result.extend(check_undo_redo(session.history_mut()));
    result.extend(check_saved_history(session.history(), config));
    result
}

#[must_use]
pub fn check_parent_index(graph: &Graph) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    for entity in graph.entities() {
        match entity.kind() {
            EntityKind::Way => {
                for node in entity.nodes() {
                    if !graph.parent_way_ids(node).contains(entity.id()) {
                        violations.push(InvariantViolation::ParentIndex {
                            way: entity.id().clone(),
                            node: node.clone(),
                        });
                    }
                }
            }
            EntityKind::Node => {
                for way in graph.parent_way_ids(entity.id()) {
                    let listed = graph.has_entity(&way).is_some_and(|w| w.contains(entity.id()));
                    if !listed {
                        violations.push(InvariantViolation::ParentIndex {
                            way,
                            node: entity.id().clone(),
                        });
                    }
                }
            }
            EntityKind::Relation => {}
        }
    }
    violations
}

#[must_use]
pub fn check_spatial_index(history: &mut History) -> Option<InvariantViolation> {
    let graph = history.graph().clone();
    let scanned: BTreeSet<EntityId> = graph
        .entities()
        .into_iter()
        .filter(|e| {
            let extent = graph.extent(e);
            !extent.is_empty() && extent.intersects(&WORLD)
        })
        .map(|e| e.id().clone())
        .collect();
    let indexed: BTreeSet<EntityId> = history
        .intersects(&WORLD)
        .iter()
        .map(|e| e.id().clone())
        .collect();
    if scanned == indexed {
        return None;
    }
    Some(InvariantViolation::SpatialIndex {
        missing: scanned.difference(&indexed).cloned().collect(),
        extra: indexed.difference(&scanned).cloned().collect(),
    })
}

/// Undo then redo from an annotated edit. Leaves `history` where it was.
#[must_use]
pub fn check_undo_redo(history: &mut History) -> Option<InvariantViolation> {
    let index = history.index();
    if index == 0 || history.peek_annotation().is_none() {
        return None;
    }
    let graph = history.graph().clone();
    if history.undo().is_none() {
        return Some(InvariantViolation::UndoRedo {
            index,
            detail: "undo refused above the base edit".into(),
        });
    }
    if history.redo().is_none() {
        return Some(InvariantViolation::UndoRedo {
            index,
            detail: "redo refused right after an undo".into(),
        });
    }
    if history.index() != index || !history.graph().ptr_eq(&graph) {
        return Some(InvariantViolation::UndoRedo {
            index,
            detail: format!("redo landed on edit {}", history.index()),
        });
    }
    None
}

#[must_use]
pub fn check_saved_history(history: &History, config: &HistoryConfig) -> Option<InvariantViolation> {
    let fail = |detail: String| Some(InvariantViolation::SavedHistory { detail });
    let json = match history.to_json() {
        Ok(Some(json)) => json,
        Ok(None) if !history.has_changes() => return None,
        Ok(None) => return fail("nothing saved for a changed history".into()),
        Err(e) => return fail(format!("serialize: {e}")),
    };

    let mut restored = History::with_config(config);
    if let Err(e) = restored.from_json(&json) {
        return fail(format!("restore: {e}"));
    }
    if restored.index() != history.index() {
        return fail(format!("cursor {} restored as {}", history.index(), restored.index()));
    }
    let annotations = |h: &History| -> Vec<Option<String>> {
        h.edits().iter().map(|e| e.annotation.clone()).collect()
    };
    if annotations(&restored) != annotations(history) {
        return fail("annotations differ".into());
    }
    let (before, after) = (changed_values(&history.changes(None)), changed_values(&restored.changes(None)));
    if before != after {
        let ids: BTreeSet<&EntityId> = before.keys().chain(after.keys()).collect();
        let differing: Vec<String> = ids
            .into_iter()
            .filter(|id| before.get(*id) != after.get(*id))
            .map(ToString::to_string)
            .collect();
        return fail(format!("changes differ for {}", differing.join(", ")));
    }
    None
}

/// Head value per changed id; `None` for deletions. The local revision
/// counter is cleared: a restore may renumber it.
fn changed_values(changes: &Changes) -> BTreeMap<EntityId, Option<Entity>> {
    changes
        .modified
        .iter()
        .chain(&changes.created)
        .map(|e| (e.id().clone(), Some((**e).clone().with_v(0))))
        .chain(changes.deleted.iter().map(|e| (e.id().clone(), None)))
        .collect()
}

/// After an accepted upload: every remote tag edit the session saw is still
/// on the remote, unless its entity was settled as "keep mine".
#[must_use]
pub fn check_remote_edits(session: &Session, remote: &SimulatedRemote) -> Vec<InvariantViolation> {
    session
        .remote_edits()
        .iter()
        .filter(|((id, _), _)| !session.forced().contains(id))
        .filter_map(|((id, key), expected)| {
            let found = remote.get(id).and_then(|e| e.tag(key)).map(str::to_owned);
            (found.as_deref() != Some(expected.as_str())).then(|| InvariantViolation::RemoteEditLost {
                id: id.clone(),
                key: key.clone(),
                expected: expected.clone(),
                found,
            })
        })
        .collect()
}

/// After a save that did not upload: the stack is the one the save started
/// from.
#[must_use]
pub fn check_rollback(before_len: usize, before: &Graph, history: &History) -> Option<InvariantViolation> {
    (history.len() != before_len || !history.graph().ptr_eq(before)).then(|| InvariantViolation::SaveRollback {
        before: before_len,
        after: history.len(),
    })
}
