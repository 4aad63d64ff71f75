//! Cascading deletes.
//!
//! Deleting an entity detaches it from every parent first. A parent left
//! degenerate by the detach (a way with fewer than two distinct nodes, an
//! empty relation) is deleted too. Deleting a way or relation also deletes
//! children that end up orphaned, unless their tags make them worth keeping.

use std::collections::HashSet;

use tracing::trace;

use crate::action::{Action, DisabledReason};
use crate::graph::Graph;
use crate::model::{Entity, EntityId, EntityKind};

fn can_delete(graph: &Graph, entity: &Entity) -> bool {
    graph.parent_way_ids(entity.id()).is_empty()
        && graph.parent_relation_ids(entity.id()).is_empty()
        && !entity.has_interesting_tags()
}

/// Detach `id` from its parent relations, deleting relations left empty.
fn detach_from_relations(graph: &Graph, id: &EntityId, seen: &mut HashSet<EntityId>) -> Graph {
    let mut graph = graph.clone();
    for parent_id in graph.parent_relation_ids(id) {
        let Some(parent) = graph.has_entity(&parent_id) else {
            continue;
        };
        let parent = parent.remove_members_with_id(id);
        let degenerate = parent.is_degenerate();
        graph = graph.replace(parent);
        if degenerate {
            graph = delete_relation(&graph, &parent_id, seen);
        }
    }
    graph
}

fn delete_node(graph: &Graph, id: &EntityId, seen: &mut HashSet<EntityId>) -> Graph {
    if !seen.insert(id.clone()) {
        return graph.clone();
    }
    let mut graph = graph.clone();
    for way_id in graph.parent_way_ids(id) {
        let Some(way) = graph.has_entity(&way_id) else {
            continue;
        };
        let way = way.remove_node(id);
        let degenerate = way.is_degenerate();
        graph = graph.replace(way);
        if degenerate {
            graph = delete_way(&graph, &way_id, seen);
        }
    }
    graph = detach_from_relations(&graph, id, seen);
    match graph.has_entity(id) {
        Some(node) => graph.remove(&node),
        None => graph,
    }
}

fn delete_way(graph: &Graph, id: &EntityId, seen: &mut HashSet<EntityId>) -> Graph {
    if !seen.insert(id.clone()) {
        return graph.clone();
    }
    let mut graph = detach_from_relations(graph, id, seen);
    let Some(mut way) = graph.has_entity(id) else {
        return graph;
    };

    let mut nodes: Vec<EntityId> = Vec::new();
    for node in way.nodes() {
        if !nodes.contains(node) {
            nodes.push(node.clone());
        }
    }
    for node_id in nodes {
        graph = graph.replace(way.remove_node(&node_id));
        if let Some(current) = graph.has_entity(id) {
            way = current;
        }
        let Some(node) = graph.has_entity(&node_id) else {
            continue;
        };
        if can_delete(&graph, &node) && seen.insert(node_id) {
            graph = graph.remove(&node);
        }
    }
    graph.remove(&way)
}

fn delete_relation(graph: &Graph, id: &EntityId, seen: &mut HashSet<EntityId>) -> Graph {
    if !seen.insert(id.clone()) {
        return graph.clone();
    }
    let mut graph = detach_from_relations(graph, id, seen);
    let Some(mut relation) = graph.has_entity(id) else {
        return graph;
    };

    for member_id in relation.member_ids() {
        graph = graph.replace(relation.remove_members_with_id(&member_id));
        if let Some(current) = graph.has_entity(id) {
            relation = current;
        }
        let Some(member) = graph.has_entity(&member_id) else {
            continue;
        };
        if can_delete(&graph, &member) {
            graph = delete_entity(&graph, &member_id, seen);
        }
    }
    graph.remove(&relation)
}

fn delete_entity(graph: &Graph, id: &EntityId, seen: &mut HashSet<EntityId>) -> Graph {
    match id.kind() {
        EntityKind::Node => delete_node(graph, id, seen),
        EntityKind::Way => delete_way(graph, id, seen),
        EntityKind::Relation => delete_relation(graph, id, seen),
    }
}

fn not_loaded(graph: &Graph, id: &EntityId) -> Option<DisabledReason> {
    graph
        .has_entity(id)
        .is_none()
        .then(|| DisabledReason::NotFound(id.clone()))
}

macro_rules! single_delete {
    ($name:ident, $label:literal, $f:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone)]
        pub struct $name {
            id: EntityId,
        }

        impl $name {
            #[must_use]
            pub const fn new(id: EntityId) -> Self {
                Self { id }
            }
        }

        impl Action for $name {
            fn apply(&self, graph: &Graph, _t: f64) -> Graph {
                trace!(id = %self.id, action = $label, "applying delete");
                graph.update(|g| {
                    let _ = $f(g, &self.id, &mut HashSet::new());
                })
            }

            fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
                not_loaded(graph, &self.id)
            }

            fn name(&self) -> &str {
                $label
            }
        }
    };
}

single_delete!(
    DeleteNode,
    "delete_node",
    delete_node,
    "Delete a node, shrinking or deleting the ways and relations that use it."
);
single_delete!(
    DeleteWay,
    "delete_way",
    delete_way,
    "Delete a way and any of its nodes left orphaned and untagged."
);

/// Delete a relation and any members left orphaned and untagged.
#[derive(Debug, Clone)]
pub struct DeleteRelation {
    id: EntityId,
}

impl DeleteRelation {
    #[must_use]
    pub const fn new(id: EntityId) -> Self {
        Self { id }
    }
}

impl Action for DeleteRelation {
    fn apply(&self, graph: &Graph, _t: f64) -> Graph {
        trace!(id = %self.id, action = "delete_relation", "applying delete");
        graph.update(|g| {
            let _ = delete_relation(g, &self.id, &mut HashSet::new());
        })
    }

    /// A relation whose members are not all loaded cannot be deleted safely:
    /// the unloaded members may need to be cleaned up too.
    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let relation = graph.has_entity(&self.id)?;
        relation
            .member_ids()
            .iter()
            .any(|m| graph.has_entity(m).is_none())
            .then(|| DisabledReason::IncompleteRelation(self.id.clone()))
    }

    fn name(&self) -> &str {
        "delete_relation"
    }
}

/// Delete several entities of any kind in one step.
#[derive(Debug, Clone)]
pub struct DeleteMultiple {
    ids: Vec<EntityId>,
}

impl DeleteMultiple {
    #[must_use]
    pub const fn new(ids: Vec<EntityId>) -> Self {
        Self { ids }
    }
}

impl Action for DeleteMultiple {
    fn apply(&self, graph: &Graph, _t: f64) -> Graph {
        graph.update(|g| {
            let mut seen = HashSet::new();
            for id in &self.ids {
                if g.has_entity(id).is_some() {
                    let _ = delete_entity(g, id, &mut seen);
                }
            }
        })
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        self.ids.iter().find_map(|id| match id.kind() {
            EntityKind::Relation => DeleteRelation::new(id.clone()).disabled(graph),
            _ => not_loaded(graph, id),
        })
    }

    fn name(&self) -> &str {
        "delete_multiple"
    }
}
