//! Difference between two graphs that share a base.
//!
//! Only ids present in either overlay can differ, so construction is a
//! single pass over the two overlays. Entities held by both graphs as the
//! same instance are skipped without comparing values.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde::Serialize;

use crate::graph::{Graph, same_instance};
use crate::model::{Entity, EntityId, EntityKind, Geometry};

/// Base and head value of one changed id. At least one side is present.
#[derive(Debug, Clone)]
pub struct Change {
    pub base: Option<Rc<Entity>>,
    pub head: Option<Rc<Entity>>,
}

impl Change {
    /// Head value if present, else base value.
    #[must_use]
    pub fn entity(&self) -> Option<&Rc<Entity>> {
        self.head.as_ref().or(self.base.as_ref())
    }
}

/// Which kinds of change a difference contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DidChange {
    pub addition: bool,
    pub deletion: bool,
    pub geometry: bool,
    pub properties: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

/// One row of [`Difference::summary`]: the entity to show, the graph it
/// should be read from, and how it changed.
#[derive(Debug, Clone)]
pub struct SummaryEntry {
    pub entity: Rc<Entity>,
    pub graph: Graph,
    pub change_type: ChangeType,
}

#[derive(Debug, Clone)]
pub struct Difference {
    base: Graph,
    head: Graph,
    changes: BTreeMap<EntityId, Change>,
    did_change: DidChange,
}

impl Difference {
    #[must_use]
    pub fn new(base: &Graph, head: &Graph) -> Self {
        let mut diff = Self {
            base: base.clone(),
            head: head.clone(),
            changes: BTreeMap::new(),
            did_change: DidChange::default(),
        };
        if base.ptr_eq(head) {
            return diff;
        }

        let ids: BTreeSet<EntityId> = head
            .local_ids()
            .into_iter()
            .chain(base.local_ids())
            .collect();

        for id in ids {
            let h = head.has_entity(&id);
            let b = base.has_entity(&id);
            if same_instance(h.as_ref(), b.as_ref()) {
                continue;
            }
            match (&b, &h) {
                (Some(_), None) => diff.did_change.deletion = true,
                (None, Some(_)) => diff.did_change.addition = true,
                (Some(bv), Some(hv)) => {
                    if !diff.compare(bv, hv) {
                        continue;
                    }
                }
                (None, None) => continue,
            }
            diff.changes.insert(id, Change { base: b, head: h });
        }
        diff
    }

    /// Record which aspects differ; `false` when the values are equal.
    fn compare(&mut self, b: &Entity, h: &Entity) -> bool {
        let mut changed = false;
        match (b.geometry(), h.geometry()) {
            (Geometry::Relation { members: bm }, Geometry::Relation { members: hm }) => {
                if bm != hm {
                    self.did_change.geometry = true;
                    self.did_change.properties = true;
                    changed = true;
                }
            }
            (bg, hg) => {
                if bg != hg {
                    self.did_change.geometry = true;
                    changed = true;
                }
            }
        }
        if b.tags() != h.tags() {
            self.did_change.properties = true;
            changed = true;
        }
        changed
    }

    #[must_use]
    pub const fn base(&self) -> &Graph {
        &self.base
    }

    #[must_use]
    pub const fn head(&self) -> &Graph {
        &self.head
    }

    #[must_use]
    pub const fn did_change(&self) -> DidChange {
        self.did_change
    }

    #[must_use]
    pub const fn changes(&self) -> &BTreeMap<EntityId, Change> {
        &self.changes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Head values of ids present on both sides.
    #[must_use]
    pub fn modified(&self) -> Vec<Rc<Entity>> {
        self.changes
            .values()
            .filter_map(|c| c.base.as_ref().and(c.head.clone()))
            .collect()
    }

    #[must_use]
    pub fn created(&self) -> Vec<Rc<Entity>> {
        self.changes
            .values()
            .filter(|c| c.base.is_none())
            .filter_map(|c| c.head.clone())
            .collect()
    }

    /// Base values of ids absent from head.
    #[must_use]
    pub fn deleted(&self) -> Vec<Rc<Entity>> {
        self.changes
            .values()
            .filter(|c| c.head.is_none())
            .filter_map(|c| c.base.clone())
            .collect()
    }

    /// User-facing change list.
    ///
    /// Vertices (nodes on a way) are folded into their ways: moving an
    /// untagged vertex reports each parent way as modified, and the vertex
    /// itself only shows up when it was retagged or carries interesting
    /// tags. Created or deleted vertices are reported only with interesting
    /// tags.
    #[must_use]
    pub fn summary(&self) -> BTreeMap<EntityId, SummaryEntry> {
        let mut result = BTreeMap::new();

        for change in self.changes.values() {
            let h = change.head.as_ref();
            let b = change.base.as_ref();
            match (b, h) {
                (_, Some(h)) if !is_vertex(&self.head, h) => {
                    let kind = if b.is_some() {
                        ChangeType::Modified
                    } else {
                        ChangeType::Created
                    };
                    add(&mut result, h, &self.head, kind);
                }
                (Some(b), _) if !is_vertex(&self.base, b) => {
                    add(&mut result, b, &self.base, ChangeType::Deleted);
                }
                (Some(b), Some(h)) => {
                    let moved = b.loc() != h.loc();
                    let retagged = b.tags() != h.tags();
                    if moved {
                        for parent in self.head.parent_ways(h) {
                            if !result.contains_key(parent.id()) {
                                add(&mut result, &parent, &self.head, ChangeType::Modified);
                            }
                        }
                    }
                    if retagged || (moved && h.has_interesting_tags()) {
                        add(&mut result, h, &self.head, ChangeType::Modified);
                    }
                }
                (None, Some(h)) if h.has_interesting_tags() => {
                    add(&mut result, h, &self.head, ChangeType::Created);
                }
                (Some(b), None) if b.has_interesting_tags() => {
                    add(&mut result, b, &self.base, ChangeType::Deleted);
                }
                _ => {}
            }
        }
        result
    }

    /// Everything a consumer must redraw or re-validate: the changed ids,
    /// the child nodes of changed ways (head and base), the loaded members
    /// of changed multipolygons, and parent ways/relations transitively.
    /// `None` values mark deletions.
    #[must_use]
    pub fn complete(&self) -> BTreeMap<EntityId, Option<Rc<Entity>>> {
        let head = &self.head;
        let mut result: BTreeMap<EntityId, Option<Rc<Entity>>> = BTreeMap::new();

        for (id, change) in &self.changes {
            let Some(entity) = change.entity() else {
                continue;
            };
            result.insert(id.clone(), change.head.clone());

            match entity.kind() {
                EntityKind::Way => {
                    let nodes = union_ids(
                        change.head.as_ref().map(|e| e.nodes().to_vec()),
                        change.base.as_ref().map(|e| e.nodes().to_vec()),
                    );
                    for node in nodes {
                        let value = head.has_entity(&node);
                        result.insert(node, value);
                    }
                }
                EntityKind::Relation if entity.is_multipolygon() => {
                    let members = union_ids(
                        change.head.as_ref().map(|e| e.member_ids()),
                        change.base.as_ref().map(|e| e.member_ids()),
                    );
                    for member in members {
                        if let Some(value) = head.has_entity(&member) {
                            result.insert(member, Some(value));
                        }
                    }
                }
                _ => {}
            }

            let mut pending: Vec<Rc<Entity>> = head.parent_ways(entity);
            pending.extend(head.parent_relations(entity));
            while let Some(parent) = pending.pop() {
                if result.contains_key(parent.id()) {
                    continue;
                }
                result.insert(parent.id().clone(), Some(Rc::clone(&parent)));
                pending.extend(head.parent_relations(&parent));
            }
        }
        result
    }
}

fn add(
    result: &mut BTreeMap<EntityId, SummaryEntry>,
    entity: &Rc<Entity>,
    graph: &Graph,
    change_type: ChangeType,
) {
    result.insert(
        entity.id().clone(),
        SummaryEntry {
            entity: Rc::clone(entity),
            graph: graph.clone(),
            change_type,
        },
    );
}

fn is_vertex(graph: &Graph, entity: &Entity) -> bool {
    entity.kind() == EntityKind::Node && !graph.parent_way_ids(entity.id()).is_empty()
}

fn union_ids(a: Option<Vec<EntityId>>, b: Option<Vec<EntityId>>) -> Vec<EntityId> {
    let mut out: Vec<EntityId> = Vec::new();
    for id in a.into_iter().flatten().chain(b.into_iter().flatten()) {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
