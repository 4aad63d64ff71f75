use std::rc::Rc;

use cartograph_core::graph::Graph;
use cartograph_core::model::{Entity, EntityId, Extent, Member};
use cartograph_core::tree::Tree;

fn id(raw: &str) -> EntityId {
    raw.parse().expect("valid id")
}

fn hit_ids(hits: &[Rc<Entity>]) -> Vec<String> {
    let mut out: Vec<String> = hits.iter().map(|e| e.id().to_string()).collect();
    out.sort();
    out
}

fn unit_box() -> Extent {
    Extent::new([0.0, 0.0], [2.0, 2.0])
}

#[test]
fn moved_node_leaves_the_query_box() {
    let node = Entity::node(id("n1"), [1.0, 1.0]);
    let graph = Graph::from_entities([node]);
    let mut tree = Tree::new(&graph);
    tree.rebase(&graph.base_entities(), false);
    assert_eq!(hit_ids(&tree.intersects(&unit_box(), &graph)), ["n1"]);

    let moved = graph.entity(&id("n1")).expect("n1").move_to([3.0, 3.0]);
    let next = graph.replace(moved);
    assert!(tree.intersects(&unit_box(), &next).is_empty());
    assert!(tree.current().ptr_eq(&next));
}

#[test]
fn created_entities_are_indexed() {
    let graph = Graph::new();
    let mut tree = Tree::new(&graph);
    let next = graph.replace(Entity::node(id("n-1"), [1.0, 1.0]));
    assert_eq!(hit_ids(&tree.intersects(&unit_box(), &next)), ["n-1"]);
}

#[test]
fn deleted_entities_drop_out() {
    let graph = Graph::from_entities([Entity::node(id("n1"), [1.0, 1.0])]);
    let mut tree = Tree::new(&graph);
    tree.rebase(&graph.base_entities(), false);
    let n1 = graph.entity(&id("n1")).expect("n1");
    let next = graph.remove(&n1);
    assert!(tree.intersects(&unit_box(), &next).is_empty());
}

#[test]
fn way_box_follows_its_nodes() {
    let graph = Graph::from_entities([
        Entity::node(id("n1"), [10.0, 10.0]),
        Entity::node(id("n2"), [11.0, 10.0]),
        Entity::way(id("w1"), vec![id("n1"), id("n2")]),
    ]);
    let mut tree = Tree::new(&graph);
    tree.rebase(&graph.base_entities(), false);
    assert!(tree.intersects(&unit_box(), &graph).is_empty());

    let moved = graph.entity(&id("n1")).expect("n1").move_to([1.0, 1.0]);
    let next = graph.replace(moved);
    assert_eq!(hit_ids(&tree.intersects(&unit_box(), &next)), ["n1", "w1"]);
}

#[test]
fn relation_box_follows_its_members() {
    let graph = Graph::from_entities([
        Entity::node(id("n1"), [10.0, 10.0]),
        Entity::relation(id("r1"), vec![Member::new(id("n1"), "label")]),
    ]);
    let mut tree = Tree::new(&graph);
    tree.rebase(&graph.base_entities(), false);

    let moved = graph.entity(&id("n1")).expect("n1").move_to([1.0, 1.0]);
    let next = graph.replace(moved);
    assert_eq!(hit_ids(&tree.intersects(&unit_box(), &next)), ["n1", "r1"]);
}

#[test]
fn way_loaded_before_its_nodes_is_filled_in() {
    let graph = Graph::from_entities([Entity::way(id("w1"), vec![id("n1"), id("n2")])]);
    let mut tree = Tree::new(&graph);
    tree.rebase(&graph.base_entities(), false);
    assert!(tree.tracked(&id("w1")));
    assert!(tree.intersects(&unit_box(), &graph).is_empty());

    let nodes = vec![
        Rc::new(Entity::node(id("n1"), [1.0, 1.0])),
        Rc::new(Entity::node(id("n2"), [1.5, 1.5])),
    ];
    graph.rebase(&nodes, std::slice::from_ref(&graph), false);
    tree.rebase(&nodes, false);
    assert_eq!(hit_ids(&tree.intersects(&unit_box(), &graph)), ["n1", "n2", "w1"]);
}

#[test]
fn rebase_skips_locally_deleted_entities() {
    let graph = Graph::from_entities([Entity::node(id("n1"), [1.0, 1.0])]);
    let mut tree = Tree::new(&graph);
    tree.rebase(&graph.base_entities(), false);
    let n1 = graph.entity(&id("n1")).expect("n1");
    let head = graph.remove(&n1);
    assert!(tree.intersects(&unit_box(), &head).is_empty());

    tree.rebase(&[n1], true);
    assert!(tree.intersects(&unit_box(), &head).is_empty());
}

#[test]
fn stepping_back_to_an_earlier_graph_restores_hits() {
    let graph = Graph::from_entities([Entity::node(id("n1"), [1.0, 1.0])]);
    let mut tree = Tree::new(&graph);
    tree.rebase(&graph.base_entities(), false);
    let moved = graph.replace(graph.entity(&id("n1")).expect("n1").move_to([5.0, 5.0]));
    assert!(tree.intersects(&unit_box(), &moved).is_empty());
    assert_eq!(hit_ids(&tree.intersects(&unit_box(), &graph)), ["n1"]);
}

#[test]
fn segments_are_split_per_edge() {
    let graph = Graph::from_entities([
        Entity::node(id("n1"), [0.0, 0.0]),
        Entity::node(id("n2"), [4.0, 0.0]),
        Entity::node(id("n3"), [4.0, 4.0]),
        Entity::way(id("w1"), vec![id("n1"), id("n2"), id("n3")]),
    ]);
    let mut tree = Tree::new(&graph);
    tree.rebase(&graph.base_entities(), false);
    let right_edge = Extent::new([3.9, 1.0], [4.1, 3.0]);
    let segments = tree.way_segments(&right_edge, &graph);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].id(), "w1-1");
    assert_eq!(segments[0].nodes, [id("n2"), id("n3")]);
}
