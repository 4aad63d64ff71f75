use std::collections::BTreeSet;
use std::rc::Rc;

use cartograph_core::config::HistoryConfig;
use cartograph_core::difference::Difference;
use cartograph_core::graph::Graph;
use cartograph_core::history::History;
use cartograph_core::model::{Entity, EntityId, EntityKind, Extent, Member};
use cartograph_core::tree::Tree;
use proptest::prelude::*;

use generators::*;

fn ids_in(graph: &Graph, extent: &Extent) -> BTreeSet<EntityId> {
    graph
        .entities()
        .into_iter()
        .filter(|e| {
            let ext = graph.extent(e);
            !ext.is_empty() && ext.intersects(extent)
        })
        .map(|e| e.id().clone())
        .collect()
}

/// Sorted parent way and relation ids of every entity in `graph`.
fn parent_index(graph: &Graph) -> Vec<(EntityId, Vec<EntityId>, Vec<EntityId>)> {
    let mut out: Vec<_> = graph
        .entities()
        .iter()
        .map(|e| {
            let mut ways = graph.parent_way_ids(e.id());
            let mut relations = graph.parent_relation_ids(e.id());
            ways.sort();
            relations.sort();
            (e.id().clone(), ways, relations)
        })
        .collect();
    out.sort();
    out
}

/// The head of `script` plus a relation holding every way and itself.
fn loaded_entities(script: &[Op]) -> Vec<Rc<Entity>> {
    let head = graphs(script).pop().expect("head");
    let mut entities = head.entities();
    let r1: EntityId = "r1".parse().expect("id");
    let mut members: Vec<Member> = entities
        .iter()
        .filter(|e| e.kind() == EntityKind::Way)
        .map(|e| Member::new(e.id().clone(), "outer"))
        .collect();
    members.push(Member::new(r1.clone(), "subarea"));
    entities.push(Rc::new(Entity::relation(r1, members).with_version(1)));
    entities
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn parent_ways_match_node_lists(script in arb_script()) {
        let graphs = graphs(&script);
        let head = graphs.last().expect("head");
        for entity in head.entities() {
            match entity.kind() {
                EntityKind::Way => {
                    for node in entity.nodes() {
                        prop_assert!(head.parent_way_ids(node).contains(entity.id()));
                    }
                }
                EntityKind::Node => {
                    for parent in head.parent_way_ids(entity.id()) {
                        let way = head.has_entity(&parent);
                        prop_assert!(way.is_some_and(|w| w.contains(entity.id())));
                    }
                }
                EntityKind::Relation => {}
            }
        }
    }

    #[test]
    fn edits_never_touch_earlier_graphs(script in arb_script()) {
        let graphs = graphs(&script);
        let base = &graphs[0];
        let fixture: Vec<_> = base_entities().into_iter().map(Rc::new).collect();
        prop_assert_eq!(base.entities(), fixture);
        prop_assert!(Difference::new(base, base).is_empty());
        prop_assert!(base.local_ids().is_empty());
    }

    #[test]
    fn difference_is_symmetric(script in arb_script()) {
        let graphs = graphs(&script);
        let (base, head) = (&graphs[0], graphs.last().expect("head"));
        let forward = Difference::new(base, head);
        let backward = Difference::new(head, base);
        prop_assert_eq!(forward.created().len(), backward.deleted().len());
        prop_assert_eq!(forward.deleted().len(), backward.created().len());
        prop_assert_eq!(forward.modified().len(), backward.modified().len());
        prop_assert!(Difference::new(head, head).is_empty());
    }

    #[test]
    fn replacing_with_an_equal_value_is_free(script in arb_script()) {
        let graphs = graphs(&script);
        let head = graphs.last().expect("head");
        for entity in head.entities() {
            prop_assert!(head.replace((*entity).clone()).ptr_eq(head));
        }
    }

    #[test]
    fn tree_agrees_with_a_full_scan(
        script in arb_script(),
        (x, y, w, h) in (0_u8..10, 0_u8..10, 0_u8..6, 0_u8..6),
    ) {
        let graphs = graphs(&script);
        let query = Extent::new(
            [f64::from(x), f64::from(y)],
            [f64::from(x) + f64::from(w), f64::from(y) + f64::from(h)],
        );
        let mut tree = Tree::new(&graphs[0]);
        tree.rebase(&graphs[0].base_entities(), false);
        // Walk forward through every edit, then jump straight back to base.
        for graph in graphs.iter().chain(std::iter::once(&graphs[0])) {
            let hits: BTreeSet<EntityId> = tree
                .intersects(&query, graph)
                .iter()
                .map(|e| e.id().clone())
                .collect();
            prop_assert_eq!(hits, ids_in(graph, &query));
        }
    }

    #[test]
    fn undo_all_then_redo_all_round_trips(script in arb_script()) {
        let expected = graphs(&script);
        let mut history = History::with_config(&HistoryConfig {
            transition_ms: 0,
            ..HistoryConfig::default()
        });
        let base: Vec<_> = base_entities().into_iter().map(Rc::new).collect();
        history.merge(&base, None);
        for (i, action) in actions(&script).into_iter().enumerate() {
            history.perform(&[action], Some(&format!("edit {i}")));
        }
        prop_assert_eq!(history.graph().entities(), expected.last().expect("head").entities());

        while history.undo().is_some() {}
        prop_assert_eq!(history.index(), 0);
        prop_assert!(!history.has_changes());

        while history.redo().is_some() {}
        prop_assert_eq!(history.index(), script.len());
        prop_assert_eq!(history.graph().entities(), expected.last().expect("head").entities());
    }

    #[test]
    fn rebasing_the_same_entities_again_changes_nothing(
        script in arb_script(),
        force in any::<bool>(),
        (x, y, w, h) in (0_u8..10, 0_u8..10, 0_u8..6, 0_u8..6),
    ) {
        let query = Extent::new(
            [f64::from(x), f64::from(y)],
            [f64::from(x) + f64::from(w), f64::from(y) + f64::from(h)],
        );
        let loaded = loaded_entities(&script);
        let graph = Graph::new();
        let mut tree = Tree::new(&graph);
        graph.rebase(&loaded, std::slice::from_ref(&graph), false);
        tree.rebase(&loaded, false);
        let hits = |tree: &mut Tree| -> BTreeSet<EntityId> {
            tree.intersects(&query, &graph).iter().map(|e| e.id().clone()).collect()
        };
        let first_hits = hits(&mut tree);
        let first_parents = parent_index(&graph);

        graph.rebase(&loaded, std::slice::from_ref(&graph), false);
        tree.rebase(&loaded, false);
        prop_assert_eq!(&hits(&mut tree), &first_hits);
        prop_assert_eq!(&parent_index(&graph), &first_parents);

        // Equal values in fresh instances, so a forced pass really rewrites.
        let copies: Vec<Rc<Entity>> = loaded.iter().map(|e| Rc::new((**e).clone())).collect();
        graph.rebase(&copies, std::slice::from_ref(&graph), force);
        tree.rebase(&copies, force);
        prop_assert_eq!(&hits(&mut tree), &first_hits);
        prop_assert_eq!(&parent_index(&graph), &first_parents);
    }
}
