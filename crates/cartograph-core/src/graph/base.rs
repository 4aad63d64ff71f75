use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::model::{Entity, EntityId, EntityKind};

/// Which parent index a membership belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParentKind {
    Way,
    Relation,
}

/// Child-membership change of one parent entity between two of its values.
#[derive(Debug)]
pub(crate) struct MembershipDelta {
    pub(crate) parent: EntityId,
    pub(crate) kind: ParentKind,
    pub(crate) removed: Vec<EntityId>,
    pub(crate) added: Vec<EntityId>,
}

impl MembershipDelta {
    /// `None` for nodes, which have no children.
    pub(crate) fn between(previous: Option<&Entity>, current: Option<&Entity>) -> Option<Self> {
        let reference = current.or(previous)?;
        let kind = match reference.kind() {
            EntityKind::Node => return None,
            EntityKind::Way => ParentKind::Way,
            EntityKind::Relation => ParentKind::Relation,
        };
        let children = |entity: Option<&Entity>| -> BTreeSet<EntityId> {
            match (entity, kind) {
                (None, _) => BTreeSet::new(),
                (Some(e), ParentKind::Way) => e.nodes().iter().cloned().collect(),
                (Some(e), ParentKind::Relation) => e.members().iter().map(|m| m.id.clone()).collect(),
            }
        };
        let before = children(previous);
        let after = children(current);
        Some(Self {
            parent: reference.id().clone(),
            kind,
            removed: before.difference(&after).cloned().collect(),
            added: after.difference(&before).cloned().collect(),
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Entities and parent indices shared by every graph of a session.
#[derive(Debug, Default)]
pub(crate) struct BaseStore {
    pub(crate) entities: HashMap<EntityId, Rc<Entity>>,
    pub(crate) parent_ways: HashMap<EntityId, BTreeSet<EntityId>>,
    pub(crate) parent_rels: HashMap<EntityId, BTreeSet<EntityId>>,
}

impl BaseStore {
    pub(crate) const fn parents(&self, kind: ParentKind) -> &HashMap<EntityId, BTreeSet<EntityId>> {
        match kind {
            ParentKind::Way => &self.parent_ways,
            ParentKind::Relation => &self.parent_rels,
        }
    }

    pub(crate) fn apply(&mut self, delta: &MembershipDelta) {
        let sets = match delta.kind {
            ParentKind::Way => &mut self.parent_ways,
            ParentKind::Relation => &mut self.parent_rels,
        };
        for child in &delta.removed {
            if let Some(set) = sets.get_mut(child) {
                set.remove(&delta.parent);
            }
        }
        for child in &delta.added {
            sets.entry(child.clone()).or_default().insert(delta.parent.clone());
        }
    }
}

/// Handle to the shared base store.
///
/// Cloning is cheap and yields a handle to the same store; graphs derived
/// from one another all point at one `Base`.
#[derive(Debug, Clone, Default)]
pub struct Base(Rc<RefCell<BaseStore>>);

impl Base {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<Rc<Entity>> {
        self.0.borrow().entities.get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.0.borrow().entities.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().entities.is_empty()
    }

    /// Every base entity, ordered by id.
    #[must_use]
    pub fn entities(&self) -> Vec<Rc<Entity>> {
        let mut out: Vec<Rc<Entity>> = self.0.borrow().entities.values().cloned().collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }

    #[must_use]
    pub fn parent_way_ids(&self, id: &EntityId) -> BTreeSet<EntityId> {
        self.0.borrow().parent_ways.get(id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn parent_relation_ids(&self, id: &EntityId) -> BTreeSet<EntityId> {
        self.0.borrow().parent_rels.get(id).cloned().unwrap_or_default()
    }

    pub(crate) fn store(&self) -> Ref<'_, BaseStore> {
        self.0.borrow()
    }

    pub(crate) fn store_mut(&self) -> RefMut<'_, BaseStore> {
        self.0.borrow_mut()
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
    fn delta_between_way_versions() {
        let before = Entity::way(id("w1"), vec![id("n1"), id("n2")]);
        let after = Entity::way(id("w1"), vec![id("n2"), id("n3"), id("n2")]);
        let delta = MembershipDelta::between(Some(&before), Some(&after)).expect("way delta");
        assert_eq!(delta.kind, ParentKind::Way);
        assert_eq!(delta.removed, vec![id("n1")]);
        assert_eq!(delta.added, vec![id("n3")]);
    }

    #[test]
    fn nodes_have_no_delta() {
        let node = Entity::node(id("n1"), [0.0, 0.0]);
        assert!(MembershipDelta::between(None, Some(&node)).is_none());
    }

    #[test]
    fn relation_delta_applies_to_base() {
        let rel = Entity::relation(id("r1"), vec![Member::new(id("w1"), "outer")]);
        let delta = MembershipDelta::between(None, Some(&rel)).expect("relation delta");
        let mut store = BaseStore::default();
        store.apply(&delta);
        assert!(store.parents(ParentKind::Relation)[&id("w1")].contains(&id("r1")));

        let gone = MembershipDelta::between(Some(&rel), None).expect("removal delta");
        assert!(!gone.is_empty());
        store.apply(&gone);
        assert!(store.parent_rels[&id("w1")].is_empty());
    }
}
