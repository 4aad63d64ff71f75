//! One simulated editing session: a [`History`] loaded from the remote
//! store, random local edits, and the bookkeeping the oracle needs to judge
//! a save.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use cartograph_core::action::{Action, ActionRef, AddEntity, ChangeTags, DeleteMultiple, MoveNode};
use cartograph_core::config::HistoryConfig;
use cartograph_core::save::ConflictItem;
use cartograph_core::{Entity, EntityId, EntityKind, Graph, History, Loc, Strategy};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::remote::SimulatedRemote;
use crate::rng::DeterministicRng;

/// Tag keys both the session and the remote mappers edit.
pub const KEYS: [&str; 3] = ["name", "ref", "surface"];

/// A local edit, chosen from the current graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LocalOp {
    Move { id: EntityId, to: Loc },
    Retag { id: EntityId, key: String, value: String },
    Delete { id: EntityId },
    AddPoint { at: Loc },
    DrawWay { from: EntityId, to: EntityId },
    Undo,
    Redo,
}

/// A location on the half-unit grid, so every coordinate survives JSON
/// exactly.
pub fn grid_loc(rng: &mut DeterministicRng) -> Loc {
    let mut coord = || f64::from(u8::try_from(rng.next_bounded(40)).unwrap_or(0)) / 2.0;
    [coord(), coord()]
}

pub struct Session {
    history: History,
    /// Remote tag edits made since the session loaded, keyed by entity and
    /// tag key. They must survive the next upload.
    remote_edits: BTreeMap<(EntityId, String), String>,
    /// Entities a conflict was settled for as "keep mine"; remote edits to
    /// them may legitimately be overwritten.
    forced: BTreeSet<EntityId>,
}

impl Session {
    /// Fresh session over every visible remote entity.
    #[must_use]
    pub fn load(remote: &SimulatedRemote, config: &HistoryConfig) -> Self {
        let mut history = History::with_config(&HistoryConfig {
            transition_ms: 0,
            ..config.clone()
        });
        let entities: Vec<Rc<Entity>> = remote.snapshot().into_iter().map(Rc::new).collect();
        history.merge(&entities, None);
        Self {
            history,
            remote_edits: BTreeMap::new(),
            forced: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }

    pub const fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    #[must_use]
    pub const fn remote_edits(&self) -> &BTreeMap<(EntityId, String), String> {
        &self.remote_edits
    }

    #[must_use]
    pub const fn forced(&self) -> &BTreeSet<EntityId> {
        &self.forced
    }

    pub fn note_remote_edit(&mut self, id: EntityId, key: &str, value: &str) {
        self.remote_edits.insert((id, key.to_string()), value.to_string());
    }

    /// Record the settlement of `item`. A forced way also forces its child
    /// nodes, which the merge overwrites along with it.
    pub fn note_resolution(&mut self, item: &ConflictItem, strategy: Strategy, graph: &Graph) {
        if strategy != Strategy::ForceLocal {
            return;
        }
        if let Some(entity) = graph.has_entity(&item.id) {
            self.forced.extend(entity.nodes().iter().cloned());
        }
        self.forced.insert(item.id.clone());
    }

    /// Pick an edit that makes sense on the current graph.
    pub fn plan(&self, rng: &mut DeterministicRng) -> Option<LocalOp> {
        let graph = self.history.graph();
        let entities = graph.entities();
        let nodes: Vec<EntityId> = entities
            .iter()
            .filter(|e| e.kind() == EntityKind::Node)
            .map(|e| e.id().clone())
            .collect();
        let tagged: Vec<EntityId> = entities
            .iter()
            .filter(|e| e.kind() != EntityKind::Node || !e.tags().is_empty())
            .map(|e| e.id().clone())
            .collect();

        let op = match rng.next_bounded(10) {
            0..=2 => LocalOp::Move {
                id: rng.pick(&nodes)?.clone(),
                to: grid_loc(rng),
            },
            3..=4 => LocalOp::Retag {
                id: rng.pick(&tagged)?.clone(),
                key: (*rng.pick(&KEYS)?).to_string(),
                value: format!("local {}", rng.next_bounded(100)),
            },
            5 => LocalOp::Delete {
                id: rng.pick(&tagged)?.clone(),
            },
            6 => LocalOp::AddPoint { at: grid_loc(rng) },
            7 => {
                let from = rng.pick(&nodes)?.clone();
                let to = rng.pick(&nodes)?.clone();
                if from == to {
                    return None;
                }
                LocalOp::DrawWay { from, to }
            }
            8 => LocalOp::Undo,
            _ => LocalOp::Redo,
        };
        Some(op)
    }

    /// Apply `op`. Returns `false` when it was not applicable.
    pub fn apply(&mut self, op: &LocalOp) -> bool {
        let (action, annotation): (ActionRef, &str) = match op {
            LocalOp::Undo => return self.history.undo().is_some(),
            LocalOp::Redo => return self.history.redo().is_some(),
            LocalOp::Move { id, to } => (Rc::new(MoveNode::new(id.clone(), *to)), "Moved a point."),
            LocalOp::Retag { id, key, value } => {
                let Some(entity) = self.history.graph().has_entity(id) else {
                    return false;
                };
                let mut tags = entity.tags().clone();
                tags.insert(key.clone(), value.clone());
                (Rc::new(ChangeTags::new(id.clone(), tags)), "Changed tags.")
            }
            LocalOp::Delete { id } => (Rc::new(DeleteMultiple::new(vec![id.clone()])), "Deleted a feature."),
            LocalOp::AddPoint { at } => {
                let id = self.history.next_id(EntityKind::Node);
                let point = Entity::node(id, *at).with_tag("amenity", "bench");
                (Rc::new(AddEntity::new(point)), "Added a point.")
            }
            LocalOp::DrawWay { from, to } => {
                let graph = self.history.graph();
                if graph.has_entity(from).is_none() || graph.has_entity(to).is_none() {
                    return false;
                }
                let id = self.history.next_id(EntityKind::Way);
                let way = Entity::way(id, vec![from.clone(), to.clone()]).with_tag("highway", "path");
                (Rc::new(AddEntity::new(way)), "Drew a line.")
            }
        };
        if let Some(reason) = action.disabled(self.history.graph()) {
            trace!(%reason, "skipping disabled edit");
            return false;
        }
        self.history.perform(&[action], Some(annotation));
        true
    }
}
