use cartograph_core::difference::{ChangeType, Difference};
use cartograph_core::graph::Graph;
use cartograph_core::model::{Entity, EntityId, Member};

fn id(raw: &str) -> EntityId {
    raw.parse().expect("valid id")
}

fn base() -> Graph {
    Graph::from_entities([
        Entity::node(id("n1"), [0.0, 0.0]),
        Entity::node(id("n2"), [1.0, 0.0]),
        Entity::node(id("n3"), [5.0, 5.0]).with_tag("amenity", "bench"),
        Entity::way(id("w1"), vec![id("n1"), id("n2")]).with_tag("highway", "path"),
        Entity::relation(id("r1"), vec![Member::new(id("w1"), "")]).with_tag("type", "route"),
    ])
}

#[test]
fn identical_graphs_have_no_changes() {
    let graph = base();
    assert!(Difference::new(&graph, &graph).is_empty());
    let touched = graph.replace(graph.entity(&id("n1")).expect("n1").touch());
    assert!(Difference::new(&graph, &touched).is_empty());
}

#[test]
fn created_modified_and_deleted_are_split() {
    let graph = base();
    let n3 = graph.entity(&id("n3")).expect("n3");
    let head = graph.update(|g| {
        let _ = g.replace(Entity::node(id("n-1"), [2.0, 2.0]));
        let _ = g.replace(n3.update(|e| e.set_tags([("amenity".into(), "cafe".into())].into())));
        let n2 = g.entity(&id("n2")).expect("n2");
        let w1 = g.entity(&id("w1")).expect("w1");
        let _ = g.replace(w1.remove_node(&id("n2")));
        let _ = g.remove(&n2);
    });
    let diff = Difference::new(&graph, &head);

    let created: Vec<_> = diff.created().iter().map(|e| e.id().clone()).collect();
    let modified: Vec<_> = diff.modified().iter().map(|e| e.id().clone()).collect();
    let deleted: Vec<_> = diff.deleted().iter().map(|e| e.id().clone()).collect();
    assert_eq!(created, [id("n-1")]);
    assert_eq!(modified, [id("n3"), id("w1")]);
    assert_eq!(deleted, [id("n2")]);

    let flags = diff.did_change();
    assert!(flags.addition && flags.deletion && flags.geometry && flags.properties);
}

#[test]
fn moved_vertex_is_summarized_as_its_way() {
    let graph = base();
    let head = graph.replace(graph.entity(&id("n1")).expect("n1").move_to([0.5, 0.5]));
    let summary = Difference::new(&graph, &head).summary();
    let rows: Vec<(EntityId, ChangeType)> = summary
        .iter()
        .map(|(id, entry)| (id.clone(), entry.change_type))
        .collect();
    assert_eq!(rows, [(id("w1"), ChangeType::Modified)]);
}

#[test]
fn retagged_vertex_is_reported_itself() {
    let graph = base();
    let n1 = graph.entity(&id("n1")).expect("n1");
    let head = graph.replace(n1.update(|e| e.set_tags([("barrier".into(), "gate".into())].into())));
    let summary = Difference::new(&graph, &head).summary();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[&id("n1")].change_type, ChangeType::Modified);
}

#[test]
fn untagged_vertex_deletion_is_folded_away() {
    let graph = base();
    let head = graph.update(|g| {
        let n2 = g.entity(&id("n2")).expect("n2");
        let _ = g.remove(&n2);
    });
    // n2 is still listed by w1 in head, so it counts as a vertex.
    assert!(Difference::new(&graph, &head).summary().is_empty());
}

#[test]
fn deleted_poi_is_reported_from_base() {
    let graph = base();
    let n3 = graph.entity(&id("n3")).expect("n3");
    let head = graph.remove(&n3);
    let summary = Difference::new(&graph, &head).summary();
    let entry = &summary[&id("n3")];
    assert_eq!(entry.change_type, ChangeType::Deleted);
    assert!(entry.graph.ptr_eq(&graph));
}

#[test]
fn complete_includes_children_and_parents() {
    let graph = base();
    let head = graph.replace(graph.entity(&id("n1")).expect("n1").move_to([0.5, 0.5]));
    let complete = Difference::new(&graph, &head).complete();
    let ids: Vec<EntityId> = complete.keys().cloned().collect();
    assert_eq!(ids, [id("n1"), id("r1"), id("w1")]);
    assert!(complete.values().all(Option::is_some));
}

#[test]
fn complete_marks_deletions() {
    let graph = base();
    let n3 = graph.entity(&id("n3")).expect("n3");
    let head = graph.remove(&n3);
    let complete = Difference::new(&graph, &head).complete();
    assert_eq!(complete.get(&id("n3")), Some(&None));
}

#[test]
fn complete_terminates_on_relation_cycles() {
    let graph = Graph::from_entities([
        Entity::node(id("n1"), [0.0, 0.0]),
        Entity::relation(id("r1"), vec![Member::new(id("n1"), ""), Member::new(id("r2"), "")]),
        Entity::relation(id("r2"), vec![Member::new(id("r1"), "")]),
        Entity::relation(id("r3"), vec![Member::new(id("r3"), "")]),
    ]);
    let head = graph.replace(graph.entity(&id("n1")).expect("n1").move_to([0.5, 0.5]));
    let complete = Difference::new(&graph, &head).complete();
    let ids: Vec<EntityId> = complete.keys().cloned().collect();
    assert_eq!(ids, [id("n1"), id("r1"), id("r2")]);

    let r3 = graph.entity(&id("r3")).expect("r3");
    let head = graph.replace(r3.update(|e| e.set_tags([("type".into(), "site".into())].into())));
    let complete = Difference::new(&graph, &head).complete();
    let ids: Vec<EntityId> = complete.keys().cloned().collect();
    assert_eq!(ids, [id("r3")]);
}
