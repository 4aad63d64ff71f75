use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use cartograph_core::action::{
    ActionRef, AddEntity, ChangeTags, DeleteNode, MoveNode, from_fn, noop,
};
use cartograph_core::config::HistoryConfig;
use cartograph_core::difference::{ChangeType, Difference};
use cartograph_core::history::{History, HistoryEvent};
use cartograph_core::model::{Entity, EntityId, EntityKind, Extent, Member, Tags};

fn id(raw: &str) -> EntityId {
    raw.parse().expect("valid id")
}

fn instant() -> History {
    History::with_config(&HistoryConfig {
        transition_ms: 0,
        ..HistoryConfig::default()
    })
}

fn add(entity: Entity) -> ActionRef {
    Rc::new(AddEntity::new(entity))
}

fn tag(raw: &str, key: &str, value: &str) -> ActionRef {
    let tags: Tags = [(key.to_string(), value.to_string())].into();
    Rc::new(ChangeTags::new(id(raw), tags))
}

fn record_events(history: &mut History) -> Rc<RefCell<Vec<&'static str>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    history.on(move |event| sink.borrow_mut().push(event.name()));
    events
}

fn seeded() -> History {
    let mut history = instant();
    let base = [
        Entity::node(id("n1"), [0.0, 0.0]).with_version(1),
        Entity::node(id("n2"), [1.0, 0.0]).with_version(1),
        Entity::way(id("w1"), vec![id("n1"), id("n2")]).with_version(1),
    ];
    let base: Vec<Rc<Entity>> = base.into_iter().map(Rc::new).collect();
    history.merge(&base, None);
    history
}

#[test]
fn undo_then_perform_discards_the_redo_tail() {
    let mut history = History::new();
    history.perform(&[noop()], Some("a1"));
    history.perform(&[noop()], Some("a2"));
    history.undo();
    // The cursor now sits on a1, so a1 is what the next undo would revert.
    assert_eq!(history.undo_annotation(), Some("a1"));
    assert_eq!(history.redo_annotation(), Some("a2"));

    history.perform(&[noop()], Some("a3"));
    assert_eq!(history.redo_annotation(), None);
    assert!(history.redo().is_none());
    assert_eq!(history.peek_all_annotations(), ["a1", "a3"]);
}

#[test]
fn undo_and_redo_step_over_unannotated_edits() {
    let mut history = instant();
    history.perform(&[add(Entity::node(id("n-1"), [0.0, 0.0]))], Some("add"));
    history.perform(&[tag("n-1", "a", "1")], None);
    history.perform(&[tag("n-1", "a", "2")], None);
    assert_eq!(history.index(), 3);

    history.undo();
    assert_eq!(history.index(), 1);
    assert_eq!(history.graph().entity(&id("n-1")).expect("n-1").tag("a"), None);
    history.undo();
    assert_eq!(history.index(), 0);
    assert!(history.graph().has_entity(&id("n-1")).is_none());

    history.redo();
    assert_eq!(history.index(), 1);
    // The unannotated tail cannot be redone on its own.
    assert!(history.redo().is_none());
}

#[test]
fn undo_reports_the_undone_annotation_before_the_change() {
    let mut history = instant();
    let undone = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&undone);
    history.on(move |event| match event {
        HistoryEvent::Undone { annotation, index } => {
            sink.borrow_mut().push((annotation.clone(), *index));
        }
        HistoryEvent::Change(_) => sink.borrow_mut().push((Some("change".into()), 99)),
        _ => {}
    });
    history.perform(&[noop()], Some("first"));
    undone.borrow_mut().clear();
    history.undo();
    assert_eq!(
        *undone.borrow(),
        [(Some("first".to_string()), 0), (Some("change".to_string()), 99)]
    );
}

#[test]
fn replace_and_overwrite_rewrite_the_top_edit() {
    let mut history = instant();
    history.perform(&[add(Entity::node(id("n-1"), [0.0, 0.0]))], Some("add"));
    history.perform(&[tag("n-1", "k", "a")], Some("tag"));

    history.replace(&[tag("n-1", "k", "b")], Some("tag again"));
    assert_eq!(history.len(), 3);
    assert_eq!(history.peek_annotation(), Some("tag again"));
    assert_eq!(history.graph().entity(&id("n-1")).expect("n-1").tag("k"), Some("b"));

    // Overwrite applies to the edit below the top one.
    history.overwrite(&[tag("n-1", "other", "x")], Some("overwritten"));
    let n = history.graph().entity(&id("n-1")).expect("n-1");
    assert_eq!(n.tag("k"), None);
    assert_eq!(n.tag("other"), Some("x"));
    assert_eq!(history.len(), 3);
}

#[test]
fn transactions_emit_one_coalesced_change() {
    let mut history = instant();
    let events = record_events(&mut history);
    history.begin_transaction();
    history.begin_transaction();
    history.perform(&[add(Entity::node(id("n-1"), [0.0, 0.0]))], Some("a"));
    history.perform(&[add(Entity::node(id("n-2"), [1.0, 1.0]))], Some("b"));
    assert!(history.end_transaction().is_none());
    assert!(events.borrow().is_empty());

    let diff = history.end_transaction().expect("outermost close");
    assert_eq!(diff.len(), 2);
    assert_eq!(*events.borrow(), ["change"]);
    assert!(history.end_transaction().is_none());
}

#[test]
fn transaction_difference_is_the_union_of_its_edits() {
    let edits: Vec<ActionRef> = vec![
        add(Entity::node(id("n-1"), [3.0, 3.0]).with_tag("amenity", "bench")),
        Rc::new(MoveNode::new(id("n1"), [0.0, 1.0])),
        tag("n2", "barrier", "gate"),
        Rc::new(MoveNode::new(id("n-1"), [4.0, 4.0])),
    ];

    let mut stepwise = seeded();
    let mut changed: BTreeSet<EntityId> = BTreeSet::new();
    let mut rows: BTreeMap<EntityId, ChangeType> = BTreeMap::new();
    for edit in &edits {
        let diff = stepwise.perform(&[Rc::clone(edit)], Some("step"));
        changed.extend(diff.changes().keys().cloned());
        for (id, entry) in diff.summary() {
            rows.entry(id).or_insert(entry.change_type);
        }
    }

    let mut batched = seeded();
    let before = batched.graph().clone();
    batched.begin_transaction();
    for edit in &edits {
        batched.perform(&[Rc::clone(edit)], Some("step"));
    }
    let diff = batched.end_transaction().expect("outermost close");
    let direct = Difference::new(&before, batched.graph());

    let coalesced: BTreeSet<EntityId> = diff.changes().keys().cloned().collect();
    let recomputed: BTreeSet<EntityId> = direct.changes().keys().cloned().collect();
    assert_eq!(coalesced, changed);
    assert_eq!(recomputed, changed);
    let summary: BTreeMap<EntityId, ChangeType> = diff
        .summary()
        .into_iter()
        .map(|(id, entry)| (id, entry.change_type))
        .collect();
    assert_eq!(summary, rows);
    assert_eq!(summary[&id("n-1")], ChangeType::Created);
    assert_eq!(batched.graph().entities(), stepwise.graph().entities());
}

#[test]
fn checkpoints_restore_stack_and_cursor() {
    let mut history = instant();
    history.perform(&[add(Entity::node(id("n-1"), [0.0, 0.0]))], Some("add"));
    history.set_checkpoint("drawing");
    history.perform(&[tag("n-1", "k", "v")], Some("tag"));
    history.perform(&[noop()], Some("noop"));

    let diff = history.reset_to_checkpoint("drawing").expect("checkpoint");
    assert_eq!(diff.len(), 1);
    assert_eq!(history.index(), 1);
    assert_eq!(history.len(), 2);
    assert!(history.has_checkpoint("drawing"));
    assert!(history.reset_to_checkpoint("missing").is_none());

    // Resetting twice is fine.
    history.perform(&[noop()], Some("again"));
    assert!(history.reset_to_checkpoint("drawing").is_some());
    assert_eq!(history.peek_annotation(), Some("add"));
}

#[test]
fn merge_reaches_every_edit_and_emits_seen_ids() {
    let mut history = instant();
    history.perform(&[add(Entity::node(id("n-1"), [0.0, 0.0]))], Some("add"));
    let seen = Rc::new(RefCell::new(BTreeSet::new()));
    let sink = Rc::clone(&seen);
    history.on(move |event| {
        if let HistoryEvent::Merge(ids) = event {
            sink.borrow_mut().extend(ids.iter().cloned());
        }
    });

    let remote = Rc::new(Entity::node(id("n5"), [1.0, 1.0]).with_version(3));
    let covered: BTreeSet<EntityId> = [id("n5"), id("n6")].into();
    history.merge(&[remote], Some(covered.clone()));

    assert_eq!(*seen.borrow(), covered);
    for edit in history.edits() {
        assert!(edit.graph.has_entity(&id("n5")).is_some());
    }
    let hits = history.intersects(&Extent::new([0.5, 0.5], [1.5, 1.5]));
    assert_eq!(hits.len(), 1);
    assert!(!history.difference().changes().contains_key(&id("n5")));
}

#[test]
fn relation_box_grows_when_a_member_arrives() {
    let mut history = instant();
    let n1 = Rc::new(Entity::node(id("n1"), [0.0, 0.0]).with_version(1));
    let r1 = Rc::new(
        Entity::relation(id("r1"), vec![Member::new(id("n1"), ""), Member::new(id("n7"), "")])
            .with_version(1)
            .with_tag("type", "route"),
    );
    history.merge(&[n1, Rc::clone(&r1)], None);
    let far = Extent::new([9.0, 9.0], [11.0, 11.0]);
    assert!(history.intersects(&far).is_empty());

    let n7 = Rc::new(Entity::node(id("n7"), [10.0, 10.0]).with_version(1));
    history.merge(&[n7], Some([id("n7"), id("r1")].into()));
    let mut hits: Vec<EntityId> = history
        .intersects(&far)
        .iter()
        .map(|e| e.id().clone())
        .collect();
    hits.sort();
    assert_eq!(hits, [id("n7"), id("r1")]);
    assert!(!history.has_changes());
}

#[test]
fn deleting_a_way_node_is_undoable() {
    let mut history = seeded();
    history.perform(&[Rc::new(DeleteNode::new(id("n2")))], Some("delete"));
    assert!(history.graph().has_entity(&id("n2")).is_none());
    assert!(history.graph().has_entity(&id("w1")).is_none(), "degenerate way goes too");

    history.undo();
    assert!(history.graph().has_entity(&id("w1")).is_some());
    assert!(!history.has_changes());
}

#[test]
fn moves_animate_and_settle() {
    let mut history = History::with_config(&HistoryConfig {
        transition_ms: 200,
        ..HistoryConfig::default()
    });
    history.perform(&[add(Entity::node(id("n-1"), [0.0, 0.0]))], Some("add"));
    history.perform(&[Rc::new(MoveNode::new(id("n-1"), [8.0, 0.0]))], Some("move"));
    assert!(history.in_transition());
    assert_eq!(history.graph().entity(&id("n-1")).expect("n").loc(), Some([0.0, 0.0]));

    history.tick(std::time::Duration::from_millis(50));
    // 50 of 200 ms, eased: a quarter of the way in covers a sixteenth of the distance.
    assert_eq!(history.graph().entity(&id("n-1")).expect("n").loc(), Some([0.5, 0.0]));

    history.undo();
    assert!(!history.in_transition());
    assert_eq!(history.index(), 1);
    assert_eq!(history.redo_annotation(), Some("move"));
    history.redo();
    assert_eq!(history.graph().entity(&id("n-1")).expect("n").loc(), Some([8.0, 0.0]));
}

#[test]
fn changes_can_preview_an_action() {
    let history = seeded();
    let preview = from_fn("retag", |g| {
        let w1 = g.entity(&"w1".parse().expect("id")).expect("w1");
        g.replace(w1.update(|e| e.set_tags([("highway".to_string(), "path".to_string())].into())))
    });
    let changes = history.changes(Some(preview.as_ref()));
    assert_eq!(changes.modified.len(), 1);
    assert!(history.changes(None).is_empty());
}

#[test]
fn sources_are_collected_up_to_the_cursor() {
    let mut history = instant();
    history.set_imagery_used(vec!["Bing".into(), "Custom".into()]);
    history.perform(&[noop()], Some("one"));
    history.set_imagery_used(vec!["Esri".into()]);
    history.set_photos_used(vec!["mapillary".into()]);
    history.perform(&[noop()], Some("two"));
    assert_eq!(history.imagery_used(), ["Bing", "Esri"]);
    assert_eq!(history.photos_used(), ["mapillary"]);
    history.undo();
    assert_eq!(history.imagery_used(), ["Bing"]);
    assert!(history.photos_used().is_empty());
}

#[test]
fn saved_history_round_trips_into_a_fresh_session() {
    let mut history = seeded();
    let new_id = history.next_id(EntityKind::Node);
    history.perform(&[add(Entity::node(new_id.clone(), [3.0, 3.0]))], Some("add"));
    history.perform(&[tag("w1", "highway", "residential")], Some("tag"));
    history.perform(&[Rc::new(DeleteNode::new(id("n1")))], Some("delete"));
    history.undo();
    let json = history.to_json().expect("serialize").expect("has changes");

    let mut restored = instant();
    let events = record_events(&mut restored);
    restored.from_json(&json).expect("restore");

    assert_eq!(restored.len(), 4);
    assert_eq!(restored.index(), 2);
    assert_eq!(restored.peek_all_annotations(), ["add", "tag"]);
    assert_eq!(restored.redo_annotation(), Some("delete"));
    assert_eq!(restored.next_ids(), history.next_ids());
    assert_eq!(*events.borrow(), ["change", "restore"]);

    let graph = restored.graph();
    assert!(graph.has_entity(&new_id).is_some());
    assert_eq!(graph.entity(&id("w1")).expect("w1").tag("highway"), Some("residential"));
    assert_eq!(graph.entity(&id("n1")).expect("n1").version(), Some(1));
    assert!(restored.base().has_entity(&id("n2")).is_some(), "child nodes travel with their way");

    restored.redo();
    assert!(restored.graph().has_entity(&id("n1")).is_none());
}

#[test]
fn empty_history_serializes_to_nothing() {
    let history = History::new();
    assert_eq!(history.to_json().expect("serialize"), None);
}
