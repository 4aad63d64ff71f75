use std::rc::Rc;

use cartograph_core::ErrorCode;
use cartograph_core::graph::{Graph, GraphError};
use cartograph_core::model::{Entity, EntityId, Member};

fn id(raw: &str) -> EntityId {
    raw.parse().expect("valid id")
}

fn ids(raws: &[&str]) -> Vec<EntityId> {
    raws.iter().map(|r| id(r)).collect()
}

fn parent_ids(graph: &Graph, node: &str) -> Vec<EntityId> {
    let entity = graph.entity(&id(node)).expect("node");
    graph.parent_ways(&entity).iter().map(|w| w.id().clone()).collect()
}

fn square() -> Graph {
    Graph::from_entities([
        Entity::node(id("n1"), [0.0, 0.0]),
        Entity::node(id("n2"), [1.0, 0.0]),
        Entity::node(id("n3"), [1.0, 1.0]),
        Entity::way(id("w1"), ids(&["n1", "n2", "n3"])),
    ])
}

#[test]
fn missing_entity_is_an_error() {
    let graph = Graph::new();
    let err = graph.entity(&id("n404")).expect_err("absent");
    assert_eq!(err, GraphError::EntityNotFound(id("n404")));
    assert_eq!(err.code(), ErrorCode::EntityNotFound);
    assert!(graph.has_entity(&id("n404")).is_none());
}

#[test]
fn replace_with_equal_value_is_a_no_op() {
    let graph = square();
    let n1 = graph.entity(&id("n1")).expect("n1");
    assert!(graph.replace(Rc::clone(&n1)).ptr_eq(&graph));
    assert!(graph.replace((*n1).clone()).ptr_eq(&graph));
}

#[test]
fn frozen_graphs_are_never_mutated() {
    let graph = square();
    let moved = graph.entity(&id("n1")).expect("n1").move_to([5.0, 5.0]);
    let next = graph.replace(moved);
    assert!(!next.ptr_eq(&graph));
    assert_eq!(graph.entity(&id("n1")).expect("n1").loc(), Some([0.0, 0.0]));
    assert_eq!(next.entity(&id("n1")).expect("n1").loc(), Some([5.0, 5.0]));
}

#[test]
fn update_batches_edits_into_one_graph() {
    let graph = square();
    let next = graph.update(|g| {
        let _ = g.replace(Entity::node(id("n-1"), [2.0, 2.0]));
        let w1 = g.entity(&id("w1")).expect("w1");
        let _ = g.replace(w1.add_node(id("n-1"), None));
    });
    assert!(next.is_frozen());
    assert_eq!(parent_ids(&next, "n-1"), ids(&["w1"]));
    assert!(graph.has_entity(&id("n-1")).is_none());
}

#[test]
fn parent_ways_follow_node_list_changes() {
    let graph = square();
    assert_eq!(parent_ids(&graph, "n2"), ids(&["w1"]));

    let w1 = graph.entity(&id("w1")).expect("w1");
    let without = graph.replace(w1.remove_node(&id("n2")));
    assert!(parent_ids(&without, "n2").is_empty());
    assert_eq!(parent_ids(&graph, "n2"), ids(&["w1"]));

    let w2 = Entity::way(id("w2"), ids(&["n2", "n3"]));
    let shared = without.replace(w2);
    assert_eq!(parent_ids(&shared, "n3"), ids(&["w1", "w2"]));
    assert!(shared.is_shared(&shared.entity(&id("n3")).expect("n3")));
}

#[test]
fn parent_relations_follow_member_changes() {
    let graph = square().replace(Entity::relation(
        id("r1"),
        vec![Member::new(id("w1"), "outer")],
    ));
    let w1 = graph.entity(&id("w1")).expect("w1");
    assert_eq!(graph.parent_relations(&w1).len(), 1);

    let r1 = graph.entity(&id("r1")).expect("r1");
    let next = graph.replace(r1.remove_members_with_id(&id("w1")));
    assert!(next.parent_relations(&w1).is_empty());
}

#[test]
fn remove_then_revert_restores_base() {
    let graph = square();
    let n1 = graph.entity(&id("n1")).expect("n1");
    let removed = graph.remove(&n1);
    assert!(removed.has_entity(&id("n1")).is_none());
    assert!(removed.is_deleted_locally(&id("n1")));

    let reverted = removed.revert(&id("n1"));
    assert!(Rc::ptr_eq(&reverted.entity(&id("n1")).expect("n1"), &n1));
    assert!(reverted.local_ids().is_empty());
}

#[test]
fn revert_of_a_created_entity_removes_it() {
    let graph = square().replace(Entity::node(id("n-1"), [3.0, 3.0]));
    let reverted = graph.revert(&id("n-1"));
    assert!(reverted.has_entity(&id("n-1")).is_none());
    assert!(reverted.revert(&id("n-1")).ptr_eq(&reverted));
}

#[test]
fn child_nodes_need_every_node_loaded() {
    let graph = Graph::from_entities([
        Entity::node(id("n1"), [0.0, 0.0]),
        Entity::way(id("w1"), ids(&["n1", "n2"])),
    ]);
    let w1 = graph.entity(&id("w1")).expect("w1");
    assert!(matches!(
        graph.child_nodes(&w1),
        Err(GraphError::EntityNotFound(missing)) if missing == id("n2")
    ));
}

#[test]
fn rebase_reaches_every_graph_in_the_stack() {
    let base = Graph::from_entities([Entity::node(id("n1"), [0.0, 0.0])]);
    let edited = base.replace(Entity::node(id("n-1"), [1.0, 1.0]));

    let w5 = Rc::new(Entity::way(id("w5"), ids(&["n1", "n6"])));
    let n6 = Rc::new(Entity::node(id("n6"), [2.0, 2.0]));
    base.rebase(&[Rc::clone(&w5), n6], &[base.clone(), edited.clone()], false);

    for graph in [&base, &edited] {
        assert!(graph.has_entity(&id("n6")).is_some());
        assert_eq!(parent_ids(graph, "n1"), ids(&["w5"]));
    }
    assert!(edited.has_entity(&id("n-1")).is_some());
}

#[test]
fn rebase_keeps_local_values_unless_forced() {
    let base = square();
    let local = base.replace(
        base.entity(&id("n1"))
            .expect("n1")
            .update(|e| e.set_tags([("name".to_string(), "local".to_string())].into())),
    );
    let remote = Rc::new(Entity::node(id("n1"), [0.0, 0.0]).with_version(2));
    base.rebase(&[Rc::clone(&remote)], std::slice::from_ref(&local), false);
    assert_eq!(base.base().get(&id("n1")).expect("n1").version(), None);

    base.rebase(&[remote], std::slice::from_ref(&local), true);
    assert_eq!(base.base().get(&id("n1")).expect("n1").version(), Some(2));
    assert_eq!(local.entity(&id("n1")).expect("n1").tag("name"), Some("local"));
}

#[test]
fn rebase_restores_nodes_a_new_way_still_uses() {
    let base = square();
    let n3 = base.entity(&id("n3")).expect("n3");
    let head = base.remove(&n3);
    assert!(head.has_entity(&id("n3")).is_none());

    let w9 = Rc::new(Entity::way(id("w9"), ids(&["n3", "n1"])));
    base.rebase(&[w9], &[base.clone(), head.clone()], false);
    assert!(head.has_entity(&id("n3")).is_some());
}

#[test]
fn extents_cover_child_nodes() {
    let graph = square();
    let w1 = graph.entity(&id("w1")).expect("w1");
    let extent = graph.extent(&w1);
    assert_eq!(extent.min, [0.0, 0.0]);
    assert_eq!(extent.max, [1.0, 1.0]);
}
