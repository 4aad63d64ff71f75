use std::collections::BTreeSet;
use std::rc::Rc;

use crate::action::{Action, DisabledReason};
use crate::graph::Graph;
use crate::model::{Entity, EntityId, Loc, Member, Tags};

/// Insert (or overwrite) an entity.
#[derive(Debug, Clone)]
pub struct AddEntity {
    entity: Rc<Entity>,
}

impl AddEntity {
    #[must_use]
    pub fn new(entity: impl Into<Rc<Entity>>) -> Self {
        Self {
            entity: entity.into(),
        }
    }
}

impl Action for AddEntity {
    fn apply(&self, graph: &Graph, _t: f64) -> Graph {
        graph.replace(Rc::clone(&self.entity))
    }

    fn name(&self) -> &str {
        "add_entity"
    }
}

/// Replace the full tag set of an entity.
#[derive(Debug, Clone)]
pub struct ChangeTags {
    id: EntityId,
    tags: Tags,
}

impl ChangeTags {
    #[must_use]
    pub const fn new(id: EntityId, tags: Tags) -> Self {
        Self { id, tags }
    }
}

impl Action for ChangeTags {
    fn apply(&self, graph: &Graph, _t: f64) -> Graph {
        let Some(entity) = graph.has_entity(&self.id) else {
            return graph.clone();
        };
        let tags = self.tags.clone();
        graph.replace(entity.update(|e| e.set_tags(tags)))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        graph
            .has_entity(&self.id)
            .is_none()
            .then(|| DisabledReason::NotFound(self.id.clone()))
    }

    fn name(&self) -> &str {
        "change_tags"
    }
}

/// Move a node, interpolating from its current position during a transition.
#[derive(Debug, Clone)]
pub struct MoveNode {
    id: EntityId,
    to: Loc,
}

impl MoveNode {
    #[must_use]
    pub const fn new(id: EntityId, to: Loc) -> Self {
        Self { id, to }
    }
}

impl Action for MoveNode {
    fn apply(&self, graph: &Graph, t: f64) -> Graph {
        let Some(node) = graph.has_entity(&self.id) else {
            return graph.clone();
        };
        let Some(from) = node.loc() else {
            return graph.clone();
        };
        let t = t.clamp(0.0, 1.0);
        let loc = [
            (self.to[0] - from[0]).mul_add(t, from[0]),
            (self.to[1] - from[1]).mul_add(t, from[1]),
        ];
        graph.replace(node.move_to(loc))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        match graph.has_entity(&self.id) {
            None => Some(DisabledReason::NotFound(self.id.clone())),
            Some(node) if node.move_to(self.to).is_degenerate() => {
                Some(DisabledReason::Degenerate(self.id.clone()))
            }
            Some(_) => None,
        }
    }

    fn transitionable(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "move_node"
    }
}

/// Restore the base value of an entity.
#[derive(Debug, Clone)]
pub struct Revert {
    id: EntityId,
}

impl Revert {
    #[must_use]
    pub const fn new(id: EntityId) -> Self {
        Self { id }
    }
}

impl Action for Revert {
    fn apply(&self, graph: &Graph, _t: f64) -> Graph {
        graph.revert(&self.id)
    }

    fn name(&self) -> &str {
        "revert"
    }
}

/// Add a member to a relation at `index` (or at the end).
#[derive(Debug, Clone)]
pub struct AddMember {
    relation: EntityId,
    member: Member,
    index: Option<usize>,
}

impl AddMember {
    #[must_use]
    pub const fn new(relation: EntityId, member: Member, index: Option<usize>) -> Self {
        Self {
            relation,
            member,
            index,
        }
    }
}

impl Action for AddMember {
    fn apply(&self, graph: &Graph, _t: f64) -> Graph {
        let Some(relation) = graph.has_entity(&self.relation) else {
            return graph.clone();
        };
        graph.replace(relation.add_member(self.member.clone(), self.index))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        if graph.has_entity(&self.relation).is_none() {
            return Some(DisabledReason::NotFound(self.relation.clone()));
        }
        graph
            .has_entity(&self.member.id)
            .is_none()
            .then(|| DisabledReason::NotFound(self.member.id.clone()))
    }

    fn name(&self) -> &str {
        "add_member"
    }
}

/// Strip bookkeeping keys (e.g. `created_by`) from the given entities.
#[derive(Debug, Clone)]
pub struct DiscardTags {
    ids: Vec<EntityId>,
    keys: BTreeSet<String>,
}

impl DiscardTags {
    #[must_use]
    pub fn new(ids: Vec<EntityId>, keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            ids,
            keys: keys.into_iter().collect(),
        }
    }
}

impl Action for DiscardTags {
    fn apply(&self, graph: &Graph, _t: f64) -> Graph {
        graph.update(|g| {
            for id in &self.ids {
                let Some(entity) = g.has_entity(id) else {
                    continue;
                };
                if !entity.tags().keys().any(|k| self.keys.contains(k)) {
                    continue;
                }
                let tags: Tags = entity
                    .tags()
                    .iter()
                    .filter(|(k, _)| !self.keys.contains(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let _ = g.replace(entity.update(|e| e.set_tags(tags)));
            }
        })
    }

    fn name(&self) -> &str {
        "discard_tags"
    }
}
