//! Three-way merge of one locally edited entity with its remote version.
//!
//! [`MergeRemoteChanges`] is an ordinary [`Action`]: applied to the current
//! graph it produces the merged graph, or returns its input unchanged when
//! the safe strategy finds conflicts. The common ancestor of every field is
//! the entity's value in the shared base graph.
//!
//! Under [`Strategy::Safe`]:
//!
//! - node locations merge when equal within `epsilon`;
//! - way node lists merge through [`diff3`], resolving a conflicting hunk
//!   to whichever side changed it;
//! - relation member lists merge only when equal;
//! - tags merge key by key, except keys in the discard set.
//!
//! A way's child nodes are merged too: nodes dropped from the merged way are
//! deleted when nothing else uses them, and nodes whose version moved
//! remotely are merged by location.

mod conflict;
pub mod diff3;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::action::{Action, DeleteMultiple};
use crate::graph::Graph;
use crate::model::{Entity, EntityId, EntityKind, Loc, Tags};

pub use conflict::{Conflict, ConflictField};
use diff3::Hunk;

/// Default tolerance for treating two node locations as equal.
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// How to settle fields both sides changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Merge what can be merged; report the rest as conflicts.
    #[default]
    Safe,
    /// Keep every local value ("keep mine").
    ForceLocal,
    /// Take every remote value ("use theirs").
    ForceRemote,
}

impl Strategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::ForceLocal => "force_local",
            Self::ForceRemote => "force_remote",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown merge strategy '{0}' (expected safe, force_local or force_remote)")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "safe" => Ok(Self::Safe),
            "force_local" | "local" | "mine" => Ok(Self::ForceLocal),
            "force_remote" | "remote" | "theirs" => Ok(Self::ForceRemote),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Edits accumulated for a way's child nodes, applied after the way itself
/// has merged cleanly.
#[derive(Default)]
struct ChildUpdates {
    replacements: Vec<Entity>,
    remove: Vec<EntityId>,
}

/// Merge the remote version of `id` into the graph it is applied to.
///
/// `local_graph` is the graph the local edit was read from and
/// `remote_graph` holds the freshly loaded remote entities. Conflicts found
/// by the last [`Action::apply`] are available from [`Self::conflicts`].
#[derive(Debug, Clone)]
pub struct MergeRemoteChanges {
    id: EntityId,
    local_graph: Graph,
    remote_graph: Graph,
    discard_tags: BTreeSet<String>,
    strategy: Strategy,
    epsilon: f64,
    conflicts: RefCell<Vec<Conflict>>,
}

impl MergeRemoteChanges {
    #[must_use]
    pub fn new(id: EntityId, local_graph: &Graph, remote_graph: &Graph) -> Self {
        Self {
            id,
            local_graph: local_graph.clone(),
            remote_graph: remote_graph.clone(),
            discard_tags: BTreeSet::new(),
            strategy: Strategy::Safe,
            epsilon: DEFAULT_EPSILON,
            conflicts: RefCell::new(Vec::new()),
        }
    }

    /// Tag keys never considered in the tag merge.
    #[must_use]
    pub fn with_discard_tags(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.discard_tags = keys.into_iter().collect();
        self
    }

    #[must_use]
    pub const fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Same merge under another strategy, with no recorded conflicts.
    #[must_use]
    pub fn with_strategy(&self, strategy: Strategy) -> Self {
        Self {
            strategy,
            conflicts: RefCell::new(Vec::new()),
            ..self.clone()
        }
    }

    #[must_use]
    pub const fn id(&self) -> &EntityId {
        &self.id
    }

    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[must_use]
    pub fn conflicts(&self) -> Vec<Conflict> {
        self.conflicts.borrow().clone()
    }

    fn conflict_count(&self) -> usize {
        self.conflicts.borrow().len()
    }

    fn push(&self, field: ConflictField, local: Option<String>, remote: Option<String>, id: &EntityId) {
        self.conflicts
            .borrow_mut()
            .push(Conflict::new(id, field, local, remote));
    }

    fn merge_location(&self, remote: &Entity, target: Entity) -> Entity {
        let (Some(local_loc), Some(remote_loc)) = (target.loc(), remote.loc()) else {
            return target;
        };
        if self.strategy == Strategy::ForceLocal || loc_equal(local_loc, remote_loc, self.epsilon) {
            return target;
        }
        if self.strategy == Strategy::ForceRemote {
            return target.rebuild(|e| e.set_loc(remote_loc));
        }
        self.push(
            ConflictField::Location,
            Some(format_loc(local_loc)),
            Some(format_loc(remote_loc)),
            target.id(),
        );
        target
    }

    fn merge_nodes(&self, base: Option<&Entity>, remote: &Entity, target: Entity) -> Entity {
        if self.strategy == Strategy::ForceLocal || target.nodes() == remote.nodes() {
            return target;
        }
        if self.strategy == Strategy::ForceRemote {
            return target.rebuild(|e| e.set_nodes(remote.nodes().to_vec()));
        }

        let before = self.conflict_count();
        let o = base.map_or(&[][..], Entity::nodes);
        let a = target.nodes();
        let b = remote.nodes();
        let mut merged = Vec::with_capacity(a.len().max(b.len()));
        for hunk in diff3::merge(a, o, b, true) {
            match hunk {
                Hunk::Ok(nodes) => merged.extend(nodes),
                Hunk::Conflict { a: ha, o: ho, b: hb } => {
                    if ho == ha {
                        merged.extend(hb);
                    } else if ho == hb {
                        merged.extend(ha);
                    } else {
                        self.push(
                            ConflictField::Nodelist,
                            Some(join_ids(&ha)),
                            Some(join_ids(&hb)),
                            target.id(),
                        );
                        break;
                    }
                }
            }
        }

        if self.conflict_count() == before {
            target.rebuild(|e| e.set_nodes(merged))
        } else {
            target
        }
    }

    /// A node kept alive by something other than `way`.
    fn is_used(graph: &Graph, node: &Entity, way: &EntityId) -> bool {
        node.has_interesting_tags()
            || graph.parent_ways(node).iter().any(|p| p.id() != way)
            || !graph.parent_relations(node).is_empty()
    }

    fn merge_children(&self, target: &Entity, children: &[EntityId], updates: &mut ChildUpdates, graph: &Graph) {
        for id in children {
            let node = graph.has_entity(id);
            if !target.contains(id) {
                if node.as_ref().is_some_and(|n| !Self::is_used(graph, n, target.id())) {
                    updates.remove.push(id.clone());
                }
                continue;
            }

            // The child's own merge may already have run on `graph`.
            let local = node;
            let remote = self.remote_graph.has_entity(id);
            let replacement = match (self.strategy, &local, &remote) {
                // Keep the local revision counter; saved-history keys are `<id>v<v>`.
                (Strategy::ForceRemote, Some(local), Some(remote)) if remote.visible() => {
                    Some(local.rebuild(|e| {
                        e.set_version(remote.version());
                        e.set_tags(remote.tags().clone());
                        if let Some(loc) = remote.loc() {
                            e.set_loc(loc);
                        }
                    }))
                }
                (Strategy::ForceRemote, None, Some(remote)) if remote.visible() => {
                    Some((**remote).clone())
                }
                (Strategy::ForceLocal, Some(local), remote) => {
                    let version = remote.as_ref().map_or(local.version(), |r| r.version());
                    Some(local.rebuild(|e| e.set_version(version)))
                }
                (Strategy::Safe, Some(local), Some(remote)) if local.version() != remote.version() => {
                    let stamped = local.rebuild(|e| e.set_version(remote.version()));
                    let before = self.conflict_count();
                    let merged = if remote.visible() {
                        let base = graph.base().get(id);
                        let moved = self.merge_location(remote, stamped);
                        self.merge_tags(base.as_deref(), remote, moved)
                    } else {
                        self.push(ConflictField::Deleted, None, None, id);
                        stamped
                    };
                    if self.conflict_count() > before {
                        break;
                    }
                    Some(merged)
                }
                _ => None,
            };
            if let Some(replacement) = replacement {
                updates.replacements.push(replacement);
            }
        }
    }

    fn update_children(updates: ChildUpdates, graph: &Graph) -> Graph {
        let mut graph = graph.update(|g| {
            for node in updates.replacements {
                let _ = g.replace(node);
            }
        });
        if !updates.remove.is_empty() {
            graph = DeleteMultiple::new(updates.remove).apply(&graph, 1.0);
        }
        graph
    }

    fn merge_members(&self, remote: &Entity, target: Entity) -> Entity {
        if self.strategy == Strategy::ForceLocal || target.members() == remote.members() {
            return target;
        }
        if self.strategy == Strategy::ForceRemote {
            return target.rebuild(|e| e.set_members(remote.members().to_vec()));
        }
        self.push(
            ConflictField::Memberlist,
            Some(target.members().len().to_string()),
            Some(remote.members().len().to_string()),
            target.id(),
        );
        target
    }

    fn merge_tags(&self, base: Option<&Entity>, remote: &Entity, target: Entity) -> Entity {
        if self.strategy == Strategy::ForceLocal || target.tags() == remote.tags() {
            return target;
        }
        if self.strategy == Strategy::ForceRemote {
            return target.rebuild(|e| e.set_tags(remote.tags().clone()));
        }

        let before = self.conflict_count();
        let empty = Tags::new();
        let o = base.map_or(&empty, Entity::tags);
        let a = target.tags();
        let b = remote.tags();
        let keys: BTreeSet<&String> = o
            .keys()
            .chain(a.keys())
            .chain(b.keys())
            .filter(|k| !self.discard_tags.contains(*k))
            .collect();

        let mut tags = a.clone();
        let mut changed = false;
        for key in keys {
            let (ov, av, bv) = (o.get(key), a.get(key), b.get(key));
            if ov == bv || av == bv {
                continue;
            }
            if ov != av {
                self.push(
                    ConflictField::Tags { key: key.clone() },
                    av.cloned(),
                    bv.cloned(),
                    target.id(),
                );
                continue;
            }
            match bv {
                Some(value) => tags.insert(key.clone(), value.clone()),
                None => tags.remove(key),
            };
            changed = true;
        }

        if changed && self.conflict_count() == before {
            target.rebuild(|e| e.set_tags(tags))
        } else {
            target
        }
    }
}

impl Action for MergeRemoteChanges {
    #[instrument(level = "debug", skip_all, fields(id = %self.id, strategy = %self.strategy))]
    fn apply(&self, graph: &Graph, _t: f64) -> Graph {
        self.conflicts.borrow_mut().clear();
        let (Some(local), Some(remote)) = (
            self.local_graph.has_entity(&self.id),
            self.remote_graph.has_entity(&self.id),
        ) else {
            return graph.clone();
        };
        let base = graph.base().get(&self.id);
        let mut target = local.rebuild(|e| e.set_version(remote.version()));
        let mut updates = ChildUpdates::default();

        if !remote.visible() {
            return match self.strategy {
                Strategy::ForceRemote => DeleteMultiple::new(vec![self.id.clone()]).apply(graph, 1.0),
                Strategy::ForceLocal => {
                    if target.kind() == EntityKind::Way {
                        let children: Vec<EntityId> = unique(local.nodes().iter());
                        self.merge_children(&target, &children, &mut updates, graph);
                    }
                    Self::update_children(updates, graph).replace(target)
                }
                Strategy::Safe => {
                    self.push(ConflictField::Deleted, None, None, &self.id);
                    graph.clone()
                }
            };
        }

        match target.kind() {
            EntityKind::Node => target = self.merge_location(&remote, target),
            EntityKind::Way => {
                let remote_children: Vec<Rc<Entity>> = remote
                    .nodes()
                    .iter()
                    .filter_map(|n| self.remote_graph.has_entity(n))
                    .collect();
                graph.rebase(&remote_children, std::slice::from_ref(graph), false);
                target = self.merge_nodes(base.as_deref(), &remote, target);
                let children = unique(local.nodes().iter().chain(remote.nodes()));
                self.merge_children(&target, &children, &mut updates, graph);
            }
            EntityKind::Relation => target = self.merge_members(&remote, target),
        }
        target = self.merge_tags(base.as_deref(), &remote, target);

        let conflicts = self.conflict_count();
        if conflicts > 0 {
            debug!(conflicts, "merge left conflicts; graph unchanged");
            return graph.clone();
        }
        Self::update_children(updates, graph).replace(target)
    }

    fn name(&self) -> &str {
        "merge_remote_changes"
    }
}

fn unique<'a>(ids: impl Iterator<Item = &'a EntityId>) -> Vec<EntityId> {
    let mut seen = BTreeSet::new();
    ids.filter(|id| seen.insert(*id)).cloned().collect()
}

fn loc_equal(a: Loc, b: Loc, epsilon: f64) -> bool {
    (a[0] - b[0]).abs() <= epsilon && (a[1] - b[1]).abs() <= epsilon
}

fn format_loc(loc: Loc) -> String {
    format!("{:.7}, {:.7}", loc[0], loc[1])
}

fn join_ids(ids: &[EntityId]) -> String {
    ids.iter().map(EntityId::as_str).collect::<Vec<_>>().join(", ")
}
