//! Spatial index over the entities of a "current" graph.
//!
//! The tree tracks which graph it was last brought up to date with. Queries
//! take the graph to answer for; when that is not the current graph the tree
//! diffs the two and patches only the changed entities (and the tracked
//! ways/relations above them) before searching. Asking twice with the same
//! graph does no index work at all.
//!
//! Entities enter the index through [`Tree::rebase`] (data learned from the
//! remote store) or as creations in a diff. An entity whose extent is empty,
//! e.g. a way whose nodes are not loaded yet, is still tracked so that its
//! box is filled in once the nodes arrive.

pub mod rtree;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use tracing::{instrument, trace};

use crate::difference::Difference;
use crate::graph::Graph;
use crate::model::{Entity, EntityId, EntityKind, Extent};

pub use rtree::RTree;

/// One edge of a way between two consecutive nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub way: EntityId,
    pub index: usize,
    pub nodes: [EntityId; 2],
}

impl Segment {
    /// Stable id `"<way>-<index>"`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}-{}", self.way, self.index)
    }
}

#[derive(Debug)]
pub struct Tree {
    current: Graph,
    entities: RTree<EntityId>,
    boxes: HashMap<EntityId, Option<Extent>>,
    segments: RTree<Segment>,
    way_segments: HashMap<EntityId, Vec<(Extent, Segment)>>,
}

impl Tree {
    #[must_use]
    pub fn new(graph: &Graph) -> Self {
        Self {
            current: graph.clone(),
            entities: RTree::new(),
            boxes: HashMap::new(),
            segments: RTree::new(),
            way_segments: HashMap::new(),
        }
    }

    /// Graph the index currently reflects.
    #[must_use]
    pub const fn current(&self) -> &Graph {
        &self.current
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    #[must_use]
    pub fn tracked(&self, id: &EntityId) -> bool {
        self.boxes.contains_key(id)
    }

    fn remove_entity(&mut self, id: &EntityId) {
        if let Some(Some(bbox)) = self.boxes.remove(id) {
            self.entities.remove(&bbox, id);
        }
        if let Some(segments) = self.way_segments.remove(id) {
            for (bbox, segment) in segments {
                self.segments.remove(&bbox, &segment);
            }
        }
    }

    fn load_entities(&mut self, to_update: BTreeMap<EntityId, Rc<Entity>>) {
        for (id, entity) in to_update {
            let extent = self.current.extent(&entity);
            let slot = (!extent.is_empty()).then_some(extent);
            if let Some(bbox) = slot {
                self.entities.insert(bbox, id.clone());
            }
            if entity.kind() == EntityKind::Way {
                let segments = self.segments_of(&entity);
                for (bbox, segment) in &segments {
                    self.segments.insert(*bbox, segment.clone());
                }
                self.way_segments.insert(id.clone(), segments);
            }
            self.boxes.insert(id, slot);
        }
    }

    fn segments_of(&self, way: &Entity) -> Vec<(Extent, Segment)> {
        way.nodes()
            .windows(2)
            .enumerate()
            .filter_map(|(index, pair)| {
                let a = self.current.has_entity(&pair[0])?.loc()?;
                let b = self.current.has_entity(&pair[1])?.loc()?;
                let segment = Segment {
                    way: way.id().clone(),
                    index,
                    nodes: [pair[0].clone(), pair[1].clone()],
                };
                Some((Extent::from_point(a).extend_point(b), segment))
            })
            .collect()
    }

    /// Queue every tracked way/relation above `entity` for recomputation.
    fn include_parents(
        &mut self,
        entity: &Entity,
        to_update: &mut BTreeMap<EntityId, Rc<Entity>>,
        seen: &mut HashSet<EntityId>,
    ) {
        if !seen.insert(entity.id().clone()) {
            return;
        }
        let parents = self
            .current
            .parent_ways(entity)
            .into_iter()
            .chain(self.current.parent_relations(entity));
        for parent in parents {
            if self.tracked(parent.id()) {
                self.remove_entity(parent.id());
                to_update.insert(parent.id().clone(), Rc::clone(&parent));
            }
            self.include_parents(&parent, to_update, seen);
        }
    }

    fn set_current_graph(&mut self, graph: &Graph) {
        if graph.ptr_eq(&self.current) {
            return;
        }
        let diff = Difference::new(&self.current, graph);
        self.current = graph.clone();

        let changed = diff.did_change();
        if !(changed.addition || changed.deletion || changed.geometry) {
            return;
        }

        let mut to_update = BTreeMap::new();
        if changed.deletion {
            for entity in diff.deleted() {
                self.remove_entity(entity.id());
            }
        }
        if changed.geometry {
            for entity in diff.modified() {
                self.remove_entity(entity.id());
                to_update.insert(entity.id().clone(), Rc::clone(&entity));
                self.include_parents(&entity, &mut to_update, &mut HashSet::new());
            }
        }
        if changed.addition {
            for entity in diff.created() {
                to_update.insert(entity.id().clone(), entity);
            }
        }
        trace!(entities = to_update.len(), "patching spatial index");
        self.load_entities(to_update);
    }

    /// Index entities learned from the remote store without changing which
    /// graph is current. Tracked ids are skipped unless `force`.
    #[instrument(level = "debug", skip_all, fields(entities = entities.len(), force))]
    pub fn rebase(&mut self, entities: &[Rc<Entity>], force: bool) {
        let mut to_update = BTreeMap::new();
        for entity in entities {
            if !entity.visible() || self.current.is_deleted_locally(entity.id()) {
                continue;
            }
            if self.tracked(entity.id()) && !force {
                continue;
            }
            self.remove_entity(entity.id());
            to_update.insert(entity.id().clone(), Rc::clone(entity));
            self.include_parents(entity, &mut to_update, &mut HashSet::new());
        }
        trace!(entities = to_update.len(), "rebasing spatial index");
        self.load_entities(to_update);
    }

    /// Entities of `graph` whose boxes intersect `extent`.
    pub fn intersects(&mut self, extent: &Extent, graph: &Graph) -> Vec<Rc<Entity>> {
        self.set_current_graph(graph);
        self.entities
            .search(extent)
            .iter()
            .filter_map(|id| graph.has_entity(id))
            .collect()
    }

    /// Way segments of `graph` whose boxes intersect `extent`.
    pub fn way_segments(&mut self, extent: &Extent, graph: &Graph) -> Vec<Segment> {
        self.set_current_graph(graph);
        self.segments.search(extent)
    }
}
