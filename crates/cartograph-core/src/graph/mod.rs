//! Persistent entity graph.
//!
//! # Overview
//!
//! A [`Graph`] is a view over two layers:
//!
//! - a shared [`Base`] of entities as they were loaded from the remote store,
//!   together with base parent indices (node -> parent ways, entity -> parent
//!   relations), and
//! - a private overlay holding every id whose local value differs from base.
//!   An overlay entry of `None` means "deleted here".
//!
//! The overlay keeps its own copy-on-write parent sets for children whose
//! parents changed locally, so lookups read overlay first and fall back to
//! base.
//!
//! # Mutation
//!
//! Frozen graphs (the default) are persistent: `replace`, `remove` and
//! `revert` return a new graph sharing the base and leave the receiver
//! untouched. An unfrozen graph (see [`Graph::update`]) is mutated in place,
//! which lets actions batch many edits without allocating a graph per edit.
//!
//! Only [`Graph::rebase`] writes to the base. It is the one operation that
//! observably changes other graphs, which is why it takes the list of graphs
//! that share the base.
//!
//! # Invariant
//!
//! For every way `w` and node `n` visible in a graph, `w` is among
//! `parent_ways(n)` iff `w.nodes` contains `n`; likewise for relations and
//! their members.

mod base;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ErrorCode;
use crate::model::{Entity, EntityId, EntityKind, Extent};

pub use base::Base;
pub(crate) use base::{BaseStore, MembershipDelta, ParentKind};

// ---------------------------------------------------------------------------
// Errors and small types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
}

impl GraphError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EntityNotFound(_) => ErrorCode::EntityNotFound,
        }
    }
}

/// How an entity is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryType {
    Point,
    Vertex,
    Line,
    Area,
    Relation,
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Point => "point",
            Self::Vertex => "vertex",
            Self::Line => "line",
            Self::Area => "area",
            Self::Relation => "relation",
        })
    }
}

/// `true` when both sides are absent or hold the same instance.
#[must_use]
pub fn same_instance(a: Option<&Rc<Entity>>, b: Option<&Rc<Entity>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

type ParentSets = HashMap<EntityId, Rc<BTreeSet<EntityId>>>;

#[derive(Debug, Clone, Default)]
struct Local {
    entities: HashMap<EntityId, Option<Rc<Entity>>>,
    parent_ways: ParentSets,
    parent_rels: ParentSets,
}

impl Local {
    const fn parents(&self, kind: ParentKind) -> &ParentSets {
        match kind {
            ParentKind::Way => &self.parent_ways,
            ParentKind::Relation => &self.parent_rels,
        }
    }

    const fn parents_mut(&mut self, kind: ParentKind) -> &mut ParentSets {
        match kind {
            ParentKind::Way => &mut self.parent_ways,
            ParentKind::Relation => &mut self.parent_rels,
        }
    }

    /// Record `delta` in the overlay parent sets, copying base sets on first write.
    fn apply(&mut self, base: &BaseStore, delta: &MembershipDelta) {
        let base_sets = base.parents(delta.kind);
        let sets = self.parents_mut(delta.kind);
        let current = |sets: &ParentSets, child: &EntityId| -> BTreeSet<EntityId> {
            sets.get(child).map_or_else(
                || base_sets.get(child).cloned().unwrap_or_default(),
                |set| (**set).clone(),
            )
        };
        for child in &delta.removed {
            let mut set = current(sets, child);
            set.remove(&delta.parent);
            sets.insert(child.clone(), Rc::new(set));
        }
        for child in &delta.added {
            let mut set = current(sets, child);
            set.insert(delta.parent.clone());
            sets.insert(child.clone(), Rc::new(set));
        }
    }
}

#[derive(Debug)]
struct GraphInner {
    base: Base,
    local: RefCell<Local>,
    frozen: Cell<bool>,
    child_nodes: RefCell<HashMap<EntityId, Vec<Rc<Entity>>>>,
    extents: RefCell<HashMap<EntityId, Extent>>,
}

/// Cheap, clonable handle to a graph. Clones share identity; use
/// [`Graph::ptr_eq`] to compare graphs.
#[derive(Debug, Clone)]
pub struct Graph(Rc<GraphInner>);

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    fn from_parts(base: Base, local: Local, frozen: bool) -> Self {
        Self(Rc::new(GraphInner {
            base,
            local: RefCell::new(local),
            frozen: Cell::new(frozen),
            child_nodes: RefCell::new(HashMap::new()),
            extents: RefCell::new(HashMap::new()),
        }))
    }

    /// Empty, frozen graph over a fresh base.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(Base::new(), Local::default(), true)
    }

    /// Frozen graph whose base is seeded with `entities`.
    #[must_use]
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let entities: Vec<Rc<Entity>> = entities.into_iter().map(Rc::new).collect();
        let graph = Self::new();
        graph.rebase(&entities, std::slice::from_ref(&graph), false);
        graph
    }

    /// New graph sharing `other`'s base with a shallow copy of its overlay.
    #[must_use]
    pub fn derive(other: &Self, mutable: bool) -> Self {
        let local = other.0.local.borrow().clone();
        Self::from_parts(other.0.base.clone(), local, !mutable)
    }

    /// Freeze in place; later mutators return new graphs.
    pub fn freeze(&self) -> Self {
        self.0.frozen.set(true);
        self.clone()
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn base(&self) -> &Base {
        &self.0.base
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Current value of `id`: overlay first, then base.
    #[must_use]
    pub fn has_entity(&self, id: &EntityId) -> Option<Rc<Entity>> {
        if let Some(slot) = self.0.local.borrow().entities.get(id) {
            return slot.clone();
        }
        self.0.base.get(id)
    }

    /// # Errors
    ///
    /// Returns [`GraphError::EntityNotFound`] if `id` is absent or deleted.
    pub fn entity(&self, id: &EntityId) -> Result<Rc<Entity>, GraphError> {
        self.has_entity(id)
            .ok_or_else(|| GraphError::EntityNotFound(id.clone()))
    }

    /// `true` when the overlay marks `id` deleted.
    #[must_use]
    pub fn is_deleted_locally(&self, id: &EntityId) -> bool {
        matches!(self.0.local.borrow().entities.get(id), Some(None))
    }

    /// Ids present in the overlay, ordered.
    #[must_use]
    pub fn local_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.0.local.borrow().entities.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Overlay entries, ordered by id; `None` marks a deletion.
    #[must_use]
    pub fn local_entities(&self) -> Vec<(EntityId, Option<Rc<Entity>>)> {
        let mut out: Vec<(EntityId, Option<Rc<Entity>>)> = self
            .0
            .local
            .borrow()
            .entities
            .iter()
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[must_use]
    pub fn base_entities(&self) -> Vec<Rc<Entity>> {
        self.0.base.entities()
    }

    /// Every entity visible in this graph, ordered by id.
    #[must_use]
    pub fn entities(&self) -> Vec<Rc<Entity>> {
        let local = self.0.local.borrow();
        let mut out: Vec<Rc<Entity>> = self
            .0
            .base
            .entities()
            .into_iter()
            .filter(|e| !local.entities.contains_key(e.id()))
            .collect();
        out.extend(local.entities.values().flatten().cloned());
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }

    fn holds(&self, entity: &Entity) -> bool {
        self.has_entity(entity.id())
            .is_some_and(|held| std::ptr::eq(&*held, entity))
    }

    // -----------------------------------------------------------------------
    // Parent indices
    // -----------------------------------------------------------------------

    fn parent_ids(&self, id: &EntityId, kind: ParentKind) -> Vec<EntityId> {
        let local = self.0.local.borrow();
        if let Some(set) = local.parents(kind).get(id) {
            return set.iter().cloned().collect();
        }
        drop(local);
        self.0
            .base
            .store()
            .parents(kind)
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn parent_way_ids(&self, id: &EntityId) -> Vec<EntityId> {
        self.parent_ids(id, ParentKind::Way)
    }

    #[must_use]
    pub fn parent_relation_ids(&self, id: &EntityId) -> Vec<EntityId> {
        self.parent_ids(id, ParentKind::Relation)
    }

    /// Ways whose node list contains `entity`.
    #[must_use]
    pub fn parent_ways(&self, entity: &Entity) -> Vec<Rc<Entity>> {
        self.parent_way_ids(entity.id())
            .iter()
            .filter_map(|id| self.has_entity(id))
            .collect()
    }

    /// Relations listing `entity` as a member.
    #[must_use]
    pub fn parent_relations(&self, entity: &Entity) -> Vec<Rc<Entity>> {
        self.parent_relation_ids(entity.id())
            .iter()
            .filter_map(|id| self.has_entity(id))
            .collect()
    }

    #[must_use]
    pub fn parent_multipolygons(&self, entity: &Entity) -> Vec<Rc<Entity>> {
        self.parent_relations(entity)
            .into_iter()
            .filter(|r| r.is_multipolygon())
            .collect()
    }

    /// Resolved nodes of a way, in order. Memoized per graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::EntityNotFound`] if a node is not loaded.
    pub fn child_nodes(&self, way: &Entity) -> Result<Vec<Rc<Entity>>, GraphError> {
        let cacheable = self.holds(way);
        if cacheable {
            if let Some(cached) = self.0.child_nodes.borrow().get(way.id()) {
                return Ok(cached.clone());
            }
        }
        let nodes = way
            .nodes()
            .iter()
            .map(|id| self.entity(id))
            .collect::<Result<Vec<_>, _>>()?;
        if cacheable {
            self.0
                .child_nodes
                .borrow_mut()
                .insert(way.id().clone(), nodes.clone());
        }
        Ok(nodes)
    }

    /// A node that belongs to no way.
    #[must_use]
    pub fn is_poi(&self, node: &Entity) -> bool {
        node.kind() == EntityKind::Node && self.parent_way_ids(node.id()).is_empty()
    }

    /// A node used by more than one way, or visited twice by one way
    /// (ignoring the closing node of a closed way).
    #[must_use]
    pub fn is_shared(&self, node: &Entity) -> bool {
        let parents = self.parent_ways(node);
        if parents.len() > 1 {
            return true;
        }
        parents.first().is_some_and(|way| {
            let mut visits = way.nodes().iter().filter(|n| *n == node.id()).count();
            if way.is_closed() && way.first() == Some(node.id()) {
                visits -= 1;
            }
            visits > 1
        })
    }

    /// # Errors
    ///
    /// Returns [`GraphError::EntityNotFound`] if `id` is absent.
    pub fn geometry(&self, id: &EntityId) -> Result<GeometryType, GraphError> {
        let entity = self.entity(id)?;
        Ok(match entity.kind() {
            EntityKind::Node if self.is_poi(&entity) => GeometryType::Point,
            EntityKind::Node => GeometryType::Vertex,
            EntityKind::Way if entity.is_area() => GeometryType::Area,
            EntityKind::Way => GeometryType::Line,
            EntityKind::Relation => GeometryType::Relation,
        })
    }

    /// Bounding box of `entity` in this graph. Unloaded children are skipped,
    /// so a way whose nodes are all missing has an empty extent.
    #[must_use]
    pub fn extent(&self, entity: &Entity) -> Extent {
        let cacheable = self.holds(entity);
        if cacheable {
            if let Some(ext) = self.0.extents.borrow().get(entity.id()) {
                return *ext;
            }
        }
        let ext = self.compute_extent(entity, &mut HashSet::new());
        if cacheable {
            self.0.extents.borrow_mut().insert(entity.id().clone(), ext);
        }
        ext
    }

    fn compute_extent(&self, entity: &Entity, visited: &mut HashSet<EntityId>) -> Extent {
        match entity.kind() {
            EntityKind::Node => entity.loc().map_or_else(Extent::empty, Extent::from_point),
            EntityKind::Way => entity
                .nodes()
                .iter()
                .filter_map(|id| self.has_entity(id).and_then(|n| n.loc()))
                .fold(Extent::empty(), |ext, loc| ext.extend_point(loc)),
            EntityKind::Relation => {
                if !visited.insert(entity.id().clone()) {
                    return Extent::empty();
                }
                let mut ext = Extent::empty();
                for member in entity.members() {
                    if let Some(child) = self.has_entity(&member.id) {
                        ext = ext.extend(&self.compute_extent(&child, visited));
                    }
                }
                ext
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Run `f` against an unfrozen graph: `self` if unfrozen, otherwise a
    /// fresh derivative which is frozen again before it is returned.
    pub fn update(&self, f: impl FnOnce(&Self)) -> Self {
        let frozen = self.is_frozen();
        let graph = if frozen {
            Self::derive(self, true)
        } else {
            self.clone()
        };
        f(&graph);
        if frozen {
            graph.0.frozen.set(true);
        }
        graph
    }

    fn clear_caches(&self) {
        self.0.child_nodes.borrow_mut().clear();
        self.0.extents.borrow_mut().clear();
    }

    fn write_local(&self, id: &EntityId, previous: Option<&Entity>, value: Option<Rc<Entity>>) {
        {
            let base = self.0.base.store();
            let mut local = self.0.local.borrow_mut();
            if let Some(delta) = MembershipDelta::between(previous, value.as_deref()) {
                local.apply(&base, &delta);
            }
            local.entities.insert(id.clone(), value);
        }
        self.clear_caches();
    }

    /// Graph in which `entity` is the value of its id. No-op when the current
    /// value is the same instance or equal by value.
    #[must_use]
    pub fn replace(&self, entity: impl Into<Rc<Entity>>) -> Self {
        let entity: Rc<Entity> = entity.into();
        let current = self.has_entity(entity.id());
        if let Some(current) = &current {
            if Rc::ptr_eq(current, &entity) || **current == *entity {
                return self.clone();
            }
        }
        let id = entity.id().clone();
        self.update(|graph| graph.write_local(&id, current.as_deref(), Some(entity)))
    }

    /// Graph in which `entity` is deleted. No-op when it is already absent.
    #[must_use]
    pub fn remove(&self, entity: &Entity) -> Self {
        let Some(current) = self.has_entity(entity.id()) else {
            return self.clone();
        };
        self.update(|graph| graph.write_local(entity.id(), Some(&*current), None))
    }

    /// Graph in which `id` has its base value again (or is gone, if it was
    /// created locally).
    #[must_use]
    pub fn revert(&self, id: &EntityId) -> Self {
        let original = self.0.base.get(id);
        let current = self.has_entity(id);
        let in_overlay = self.0.local.borrow().entities.contains_key(id);
        if !in_overlay || same_instance(current.as_ref(), original.as_ref()) {
            return self.clone();
        }
        self.update(|graph| {
            {
                let base = graph.0.base.store();
                let mut local = graph.0.local.borrow_mut();
                if let Some(delta) = MembershipDelta::between(current.as_deref(), original.as_deref()) {
                    local.apply(&base, &delta);
                }
                local.entities.remove(id);
            }
            graph.clear_caches();
        })
    }

    /// Replace the overlay wholesale with `entities` (used to replay a saved
    /// edit). Parent sets are rebuilt against base.
    pub fn load(&self, entities: impl IntoIterator<Item = (EntityId, Option<Rc<Entity>>)>) -> &Self {
        {
            let base = self.0.base.store();
            let mut local = self.0.local.borrow_mut();
            *local = Local::default();
            for (id, entity) in entities {
                let original = base.entities.get(&id).cloned();
                if let Some(delta) = MembershipDelta::between(original.as_deref(), entity.as_deref()) {
                    local.apply(&base, &delta);
                }
                local.entities.insert(id, entity);
            }
        }
        self.clear_caches();
        self
    }

    // -----------------------------------------------------------------------
    // Rebase
    // -----------------------------------------------------------------------

    /// Write freshly learned `entities` into the shared base and bring every
    /// graph in `stack` up to date.
    ///
    /// Invisible entities are skipped; ids already in base are skipped unless
    /// `force`. Nodes deleted in the overlay of the last graph in `stack` are
    /// restored when a newly learned way turns out to use them. With `force`,
    /// overlay entries still holding the replaced base instance are dropped.
    #[instrument(level = "debug", skip_all, fields(entities = entities.len(), graphs = stack.len(), force))]
    pub fn rebase(&self, entities: &[Rc<Entity>], stack: &[Self], force: bool) {
        let head = stack.last();
        let mut restore = BTreeSet::new();
        let mut replaced: HashMap<EntityId, Rc<Entity>> = HashMap::new();
        let mut written = 0_usize;
        {
            let mut base = self.0.base.store_mut();
            for entity in entities {
                if !entity.visible() {
                    continue;
                }
                let previous = base.entities.get(entity.id()).cloned();
                match &previous {
                    Some(_) if !force => continue,
                    Some(prev) if Rc::ptr_eq(prev, entity) => continue,
                    Some(prev) => {
                        replaced.insert(entity.id().clone(), Rc::clone(prev));
                    }
                    None => {}
                }
                base.entities.insert(entity.id().clone(), Rc::clone(entity));
                if let Some(delta) = MembershipDelta::between(previous.as_deref(), Some(&**entity)) {
                    base.apply(&delta);
                }
                if let (EntityKind::Way, Some(head)) = (entity.kind(), head) {
                    restore.extend(
                        entity
                            .nodes()
                            .iter()
                            .filter(|n| head.is_deleted_locally(n))
                            .cloned(),
                    );
                }
                written += 1;
            }
        }

        for graph in stack {
            graph.refresh_after_rebase(&restore, &replaced);
        }
        if !stack.iter().any(|g| g.ptr_eq(self)) {
            self.clear_caches();
        }
        debug!(written, restored = restore.len(), "rebased entities into base");
    }

    fn refresh_after_rebase(&self, restore: &BTreeSet<EntityId>, replaced: &HashMap<EntityId, Rc<Entity>>) {
        {
            let base = self.0.base.store();
            let mut local = self.0.local.borrow_mut();
            for id in restore {
                if matches!(local.entities.get(id), Some(None)) {
                    local.entities.remove(id);
                }
            }
            for (id, old) in replaced {
                let stale = matches!(local.entities.get(id), Some(Some(held)) if Rc::ptr_eq(held, old));
                if stale {
                    local.entities.remove(id);
                }
            }
            let Local {
                entities,
                parent_ways,
                parent_rels,
            } = &mut *local;
            refresh_sets(parent_ways, &base.parent_ways, entities, ParentKind::Way);
            refresh_sets(parent_rels, &base.parent_rels, entities, ParentKind::Relation);
        }
        self.clear_caches();
    }
}

/// Recompute overlay parent sets: base parents that are not edited locally,
/// plus locally edited parents that still reference the child.
fn refresh_sets(
    sets: &mut ParentSets,
    base_sets: &HashMap<EntityId, BTreeSet<EntityId>>,
    entities: &HashMap<EntityId, Option<Rc<Entity>>>,
    kind: ParentKind,
) {
    for (child, set) in sets.iter_mut() {
        let mut next: BTreeSet<EntityId> = base_sets
            .get(child)
            .map(|parents| {
                parents
                    .iter()
                    .filter(|p| !entities.contains_key(*p))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for parent in set.iter() {
            let references = match entities.get(parent) {
                Some(Some(value)) => match kind {
                    ParentKind::Way => value.contains(child),
                    ParentKind::Relation => value.has_member(child),
                },
                _ => false,
            };
            if references {
                next.insert(parent.clone());
            }
        }
        if next != **set {
            *set = Rc::new(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Member;

    fn id(raw: &str) -> EntityId {
        raw.parse().expect("valid id")
    }

    #[test]
    fn frozen_graph_is_persistent() {
        let graph = Graph::new();
        let node = Rc::new(Entity::node(id("n1"), [0.0, 0.0]));
        let next = graph.replace(Rc::clone(&node));
        assert!(!next.ptr_eq(&graph));
        assert!(graph.has_entity(&id("n1")).is_none());
        assert!(Rc::ptr_eq(&next.entity(&id("n1")).expect("present"), &node));
        assert!(next.is_frozen());
    }

    #[test]
    fn unfrozen_graph_mutates_in_place() {
        let graph = Graph::derive(&Graph::new(), true);
        let next = graph.replace(Entity::node(id("n1"), [0.0, 0.0]));
        assert!(next.ptr_eq(&graph));
        assert!(graph.has_entity(&id("n1")).is_some());
    }

    #[test]
    fn update_batches_then_refreezes() {
        let graph = Graph::new();
        let next = graph.update(|g| {
            let _ = g.replace(Entity::node(id("n1"), [0.0, 0.0]));
            let _ = g.replace(Entity::node(id("n2"), [1.0, 1.0]));
        });
        assert!(next.is_frozen());
        assert_eq!(next.local_ids(), vec![id("n1"), id("n2")]);
        assert!(graph.local_ids().is_empty());
    }

    #[test]
    fn extent_of_relation_survives_cycles() {
        let graph = Graph::from_entities([
            Entity::node(id("n1"), [1.0, 1.0]),
            Entity::relation(id("r1"), vec![Member::new(id("n1"), ""), Member::new(id("r2"), "")]),
            Entity::relation(id("r2"), vec![Member::new(id("r1"), "")]),
        ]);
        let r1 = graph.entity(&id("r1")).expect("r1");
        assert_eq!(graph.extent(&r1), Extent::from_point([1.0, 1.0]));
        let r2 = graph.entity(&id("r2")).expect("r2");
        assert_eq!(graph.extent(&r2), Extent::from_point([1.0, 1.0]));
    }

    #[test]
    fn geometry_classifies_vertices() {
        let graph = Graph::from_entities([
            Entity::node(id("n1"), [0.0, 0.0]),
            Entity::node(id("n2"), [1.0, 0.0]),
            Entity::node(id("n3"), [5.0, 5.0]),
            Entity::way(id("w1"), vec![id("n1"), id("n2")]),
        ]);
        assert_eq!(graph.geometry(&id("n1")), Ok(GeometryType::Vertex));
        assert_eq!(graph.geometry(&id("n3")), Ok(GeometryType::Point));
        assert_eq!(graph.geometry(&id("w1")), Ok(GeometryType::Line));
        assert_eq!(
            graph.geometry(&id("n9")),
            Err(GraphError::EntityNotFound(id("n9")))
        );
    }

    #[test]
    fn shared_nodes() {
        let graph = Graph::from_entities([
            Entity::node(id("n1"), [0.0, 0.0]),
            Entity::node(id("n2"), [1.0, 0.0]),
            Entity::node(id("n3"), [1.0, 1.0]),
            Entity::way(id("w1"), vec![id("n1"), id("n2"), id("n3"), id("n1")]),
            Entity::way(id("w2"), vec![id("n3"), id("n2")]),
        ]);
        let n1 = graph.entity(&id("n1")).expect("n1");
        let n2 = graph.entity(&id("n2")).expect("n2");
        assert!(!graph.is_shared(&n1));
        assert!(graph.is_shared(&n2));
    }
}
