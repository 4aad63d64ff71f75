//! Undo/redo stack of graph snapshots.
//!
//! # Overview
//!
//! [`History`] owns a stack of [`Edit`]s and a cursor. Edit 0 is the
//! unannotated base graph; every other edit holds the graph produced by one
//! `perform`. Undo and redo move the cursor between annotated edits, so
//! unannotated intermediate edits (e.g. the frames of a transition) are
//! stepped over.
//!
//! Observers register with [`History::on`] and receive [`HistoryEvent`]s
//! synchronously. A transaction (or [`History::pause_change_dispatch`])
//! buffers `Change` events and emits a single coalesced difference when it
//! closes.
//!
//! # Transitions
//!
//! Performing a single transitionable action starts a [`Transition`]: the
//! action is applied at `t = 0` and every [`History::tick`] overwrites the
//! top edit with the action at the new `t`. When the transition completes,
//! or when any other mutator interrupts it, the edit is overwritten once
//! more at `t = 1` with the annotation.

mod event;
mod persist;
mod storage;

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::action::{Action, ActionRef, Transition};
use crate::config::HistoryConfig;
use crate::difference::Difference;
use crate::graph::Graph;
use crate::model::{Entity, EntityId, EntityKind, Extent, IdGenerator};
use crate::tree::Tree;

pub use event::{HistoryEvent, ListenerId};
pub use persist::{PersistError, SavedEdit, SavedHistory, HISTORY_VERSION};
pub use storage::{HistoryStore, LockError, StorageError};

/// One entry of the undo stack.
#[derive(Debug, Clone)]
pub struct Edit {
    pub graph: Graph,
    pub annotation: Option<String>,
    pub selected_ids: Vec<EntityId>,
    pub imagery_used: Vec<String>,
    pub photos_used: Vec<String>,
}

impl Edit {
    fn base(graph: Graph) -> Self {
        Self {
            graph,
            annotation: None,
            selected_ids: Vec::new(),
            imagery_used: Vec::new(),
            photos_used: Vec::new(),
        }
    }
}

/// Entities touched between the base graph and a head graph.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    pub modified: Vec<Rc<Entity>>,
    pub created: Vec<Rc<Entity>>,
    pub deleted: Vec<Rc<Entity>>,
}

impl Changes {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.created.is_empty() && self.deleted.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modified.len() + self.created.len() + self.deleted.len()
    }
}

#[derive(Debug, Clone)]
struct Checkpoint {
    stack: Vec<Edit>,
    index: usize,
}

type Listener = Box<dyn FnMut(&HistoryEvent)>;

pub struct History {
    stack: Vec<Edit>,
    index: usize,
    tree: Tree,
    ids: IdGenerator,
    checkpoints: HashMap<String, Checkpoint>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    paused: Option<Graph>,
    transaction_depth: usize,
    transition: Option<Transition>,
    transition_duration: Duration,
    selected_ids: Vec<EntityId>,
    imagery_used: Vec<String>,
    photos_used: Vec<String>,
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("index", &self.index)
            .field("len", &self.stack.len())
            .field("transaction_depth", &self.transaction_depth)
            .field("transition", &self.transition)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&HistoryConfig::default())
    }

    #[must_use]
    pub fn with_config(config: &HistoryConfig) -> Self {
        let base = Graph::new();
        Self {
            tree: Tree::new(&base),
            stack: vec![Edit::base(base)],
            index: 0,
            ids: IdGenerator::default(),
            checkpoints: HashMap::new(),
            listeners: Vec::new(),
            next_listener: 0,
            paused: None,
            transaction_depth: 0,
            transition: None,
            transition_duration: Duration::from_millis(config.transition_ms),
            selected_ids: Vec::new(),
            imagery_used: Vec::new(),
            photos_used: Vec::new(),
        }
    }

    /// Drop every edit, checkpoint and pending transition and start over
    /// from an empty base. Listeners and id counters are kept.
    pub fn reset(&mut self) {
        self.transition = None;
        let base = Graph::new();
        self.tree = Tree::new(&base);
        self.stack = vec![Edit::base(base)];
        self.index = 0;
        self.checkpoints.clear();
        self.paused = None;
        self.transaction_depth = 0;
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register `listener`; it is called for every event until [`History::off`].
    pub fn on(&mut self, listener: impl FnMut(&HistoryEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: &HistoryEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    /// Difference from `previous` to the current graph, emitted unless
    /// change dispatch is paused.
    fn change(&mut self, previous: &Graph) -> Difference {
        let difference = Difference::new(previous, self.graph());
        if self.paused.is_none() {
            self.emit(&HistoryEvent::Change(difference.clone()));
        }
        difference
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Graph at the cursor.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.stack[self.index].graph
    }

    /// Graph of edit 0.
    #[must_use]
    pub fn base(&self) -> &Graph {
        &self.stack[0].graph
    }

    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Number of edits on the stack, including the base.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Always `false`: the base edit cannot be popped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    #[must_use]
    pub fn edits(&self) -> &[Edit] {
        &self.stack
    }

    #[must_use]
    pub fn peek_annotation(&self) -> Option<&str> {
        self.stack[self.index].annotation.as_deref()
    }

    /// Annotations of every edit up to the cursor, oldest first.
    #[must_use]
    pub fn peek_all_annotations(&self) -> Vec<&str> {
        self.stack[..=self.index]
            .iter()
            .filter_map(|e| e.annotation.as_deref())
            .collect()
    }

    /// Annotation of the edit `undo` would revert: the nearest annotated
    /// edit at or below the cursor. After performing `a1`, `a2` and undoing
    /// once this is `a1`, not `None`.
    #[must_use]
    pub fn undo_annotation(&self) -> Option<&str> {
        self.stack[..=self.index]
            .iter()
            .rev()
            .find_map(|e| e.annotation.as_deref())
    }

    /// Annotation of the edit `redo` would reapply.
    #[must_use]
    pub fn redo_annotation(&self) -> Option<&str> {
        self.stack[self.index + 1..]
            .iter()
            .find_map(|e| e.annotation.as_deref())
    }

    /// Difference between the base graph and the current graph.
    #[must_use]
    pub fn difference(&self) -> Difference {
        Difference::new(self.base(), self.graph())
    }

    /// Entities modified, created and deleted relative to base, optionally
    /// after applying `action` to the current graph.
    #[must_use]
    pub fn changes(&self, action: Option<&dyn Action>) -> Changes {
        let head = action.map_or_else(|| self.graph().clone(), |a| a.apply(self.graph(), 1.0));
        let difference = Difference::new(self.base(), &head);
        Changes {
            modified: difference.modified(),
            created: difference.created(),
            deleted: difference.deleted(),
        }
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.difference().is_empty()
    }

    /// Entities of the current graph whose boxes intersect `extent`.
    pub fn intersects(&mut self, extent: &Extent) -> Vec<Rc<Entity>> {
        let graph = self.stack[self.index].graph.clone();
        self.tree.intersects(extent, &graph)
    }

    /// Imagery sources recorded by the edits up to the cursor, without
    /// the catch-all `Custom` source.
    #[must_use]
    pub fn imagery_used(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for source in self.stack[1..=self.index].iter().flat_map(|e| &e.imagery_used) {
            if source != "Custom" && !out.contains(source) {
                out.push(source.clone());
            }
        }
        out
    }

    /// Sources attached to the next edits.
    pub fn set_imagery_used(&mut self, sources: Vec<String>) {
        self.imagery_used = sources;
    }

    #[must_use]
    pub fn photos_used(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for source in self.stack[1..=self.index].iter().flat_map(|e| &e.photos_used) {
            if !out.contains(source) {
                out.push(source.clone());
            }
        }
        out
    }

    pub fn set_photos_used(&mut self, sources: Vec<String>) {
        self.photos_used = sources;
    }

    /// Selection recorded with the next edits.
    pub fn set_selected_ids(&mut self, ids: Vec<EntityId>) {
        self.selected_ids = ids;
    }

    /// Generator for placeholder ids of new entities.
    pub const fn ids(&mut self) -> &mut IdGenerator {
        &mut self.ids
    }

    #[must_use]
    pub const fn next_ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Convenience for `ids().next(kind)`.
    pub fn next_id(&mut self, kind: EntityKind) -> EntityId {
        self.ids.next(kind)
    }

    #[must_use]
    pub const fn in_transition(&self) -> bool {
        self.transition.is_some()
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    fn act(&self, actions: &[ActionRef], annotation: Option<&str>, t: f64) -> Edit {
        let mut graph = self.graph().clone();
        for action in actions {
            graph = action.apply(&graph, t);
        }
        Edit {
            graph,
            annotation: annotation.map(str::to_owned),
            selected_ids: self.selected_ids.clone(),
            imagery_used: self.imagery_used.clone(),
            photos_used: self.photos_used.clone(),
        }
    }

    fn perform_at(&mut self, actions: &[ActionRef], annotation: Option<&str>, t: f64) -> Difference {
        let previous = self.graph().clone();
        self.stack.truncate(self.index + 1);
        let edit = self.act(actions, annotation, t);
        self.stack.push(edit);
        self.index += 1;
        self.change(&previous)
    }

    fn replace_at(&mut self, actions: &[ActionRef], annotation: Option<&str>, t: f64) -> Difference {
        let previous = self.graph().clone();
        let edit = self.act(actions, annotation, t);
        self.stack[self.index] = edit;
        self.change(&previous)
    }

    fn overwrite_at(&mut self, actions: &[ActionRef], annotation: Option<&str>, t: f64) -> Difference {
        let previous = self.graph().clone();
        if self.index > 0 {
            self.index -= 1;
        }
        self.stack.truncate(self.index + 1);
        let edit = self.act(actions, annotation, t);
        self.stack.push(edit);
        self.index += 1;
        self.change(&previous)
    }

    /// Apply `actions` to the current graph and push the result, discarding
    /// any redo tail.
    ///
    /// A single transitionable action starts a transition instead; the
    /// returned difference is then that of the `t = 0` frame.
    pub fn perform(&mut self, actions: &[ActionRef], annotation: Option<&str>) -> Difference {
        self.interrupt();
        if let [action] = actions {
            if action.transitionable() && !self.transition_duration.is_zero() {
                let difference = self.perform_at(std::slice::from_ref(action), None, 0.0);
                self.transition = Some(Transition::new(
                    Rc::clone(action),
                    annotation.map(str::to_owned),
                    self.transition_duration,
                ));
                return difference;
            }
        }
        self.perform_at(actions, annotation, 1.0)
    }

    /// Replace the top edit with `actions` applied to it (continuous
    /// gestures such as dragging).
    pub fn replace(&mut self, actions: &[ActionRef], annotation: Option<&str>) -> Difference {
        self.interrupt();
        self.replace_at(actions, annotation, 1.0)
    }

    /// Pop the top edit, then perform `actions`.
    pub fn overwrite(&mut self, actions: &[ActionRef], annotation: Option<&str>) -> Difference {
        self.interrupt();
        self.overwrite_at(actions, annotation, 1.0)
    }

    /// Drop the top `n` edits (default 1) and the redo tail. The base edit
    /// is never dropped.
    pub fn pop(&mut self, n: Option<usize>) -> Difference {
        self.interrupt();
        let previous = self.graph().clone();
        self.stack.truncate(self.index + 1);
        let n = n.unwrap_or(1).min(self.index);
        self.index -= n;
        self.stack.truncate(self.index + 1);
        self.change(&previous)
    }

    /// Step back to the previous annotated edit (or the base). `None` at the
    /// bottom of the stack.
    pub fn undo(&mut self) -> Option<Difference> {
        self.interrupt();
        if self.index == 0 {
            return None;
        }
        let previous = self.graph().clone();
        let undone = self.stack[self.index].annotation.clone();
        while self.index > 0 {
            self.index -= 1;
            if self.stack[self.index].annotation.is_some() {
                break;
            }
        }
        debug!(index = self.index, "undo");
        self.emit(&HistoryEvent::Undone {
            annotation: undone,
            index: self.index,
        });
        Some(self.change(&previous))
    }

    /// Step forward to the next annotated edit. `None` when there is none.
    pub fn redo(&mut self) -> Option<Difference> {
        self.interrupt();
        let target = (self.index + 1..self.stack.len()).find(|&i| self.stack[i].annotation.is_some())?;
        let previous = self.graph().clone();
        self.index = target;
        debug!(index = self.index, "redo");
        self.emit(&HistoryEvent::Redone {
            annotation: self.stack[target].annotation.clone(),
            index: target,
        });
        Some(self.change(&previous))
    }

    // -----------------------------------------------------------------------
    // Change dispatch and transactions
    // -----------------------------------------------------------------------

    /// Stop emitting `Change` until [`History::resume_change_dispatch`].
    /// Pausing twice keeps the first starting graph.
    pub fn pause_change_dispatch(&mut self) {
        if self.paused.is_none() {
            self.paused = Some(self.graph().clone());
        }
    }

    /// Emit one `Change` covering everything since the pause.
    pub fn resume_change_dispatch(&mut self) -> Option<Difference> {
        let previous = self.paused.take()?;
        Some(self.change(&previous))
    }

    pub fn begin_transaction(&mut self) {
        if self.transaction_depth == 0 {
            self.pause_change_dispatch();
        }
        self.transaction_depth += 1;
    }

    /// Close a transaction. Only the outermost close emits; an unmatched
    /// close does nothing.
    pub fn end_transaction(&mut self) -> Option<Difference> {
        if self.transaction_depth == 0 {
            return None;
        }
        self.transaction_depth -= 1;
        if self.transaction_depth == 0 {
            self.resume_change_dispatch()
        } else {
            None
        }
    }

    #[must_use]
    pub const fn transaction_depth(&self) -> usize {
        self.transaction_depth
    }

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    pub fn set_checkpoint(&mut self, name: impl Into<String>) {
        self.interrupt();
        self.checkpoints.insert(
            name.into(),
            Checkpoint {
                stack: self.stack.clone(),
                index: self.index,
            },
        );
    }

    /// Restore the stack and cursor saved under `name`. Unknown names are
    /// ignored. A checkpoint can be reset to any number of times.
    pub fn reset_to_checkpoint(&mut self, name: &str) -> Option<Difference> {
        self.interrupt();
        let checkpoint = self.checkpoints.get(name)?.clone();
        let previous = self.graph().clone();
        self.stack = checkpoint.stack;
        self.index = checkpoint.index;
        Some(self.change(&previous))
    }

    #[must_use]
    pub fn has_checkpoint(&self, name: &str) -> bool {
        self.checkpoints.contains_key(name)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Advance the in-flight transition by `dt`. Returns the difference of
    /// the frame, or `None` when nothing is animating.
    pub fn tick(&mut self, dt: Duration) -> Option<Difference> {
        let transition = self.transition.as_mut()?;
        let t = transition.advance(dt);
        if transition.is_complete() {
            return self.finish_transition();
        }
        let action = Rc::clone(transition.action());
        Some(self.overwrite_at(&[action], None, t))
    }

    /// Finish any in-flight transition at `t = 1` with its annotation.
    pub fn interrupt(&mut self) -> Option<Difference> {
        self.finish_transition()
    }

    fn finish_transition(&mut self) -> Option<Difference> {
        let (action, annotation) = self.transition.take()?.finish();
        Some(self.overwrite_at(&[action], annotation.as_deref(), 1.0))
    }

    // -----------------------------------------------------------------------
    // Remote data
    // -----------------------------------------------------------------------

    /// Merge freshly loaded entities into every graph on the stack and into
    /// the spatial index. `seen_ids` lists every id the load covered
    /// (defaults to the ids of `entities`). Seen relations that gain
    /// members from this load are re-indexed so their boxes grow.
    #[instrument(level = "debug", skip_all, fields(entities = entities.len()))]
    pub fn merge(&mut self, entities: &[Rc<Entity>], seen_ids: Option<BTreeSet<EntityId>>) {
        let seen = seen_ids.unwrap_or_else(|| entities.iter().map(|e| e.id().clone()).collect());
        let touched = self.relations_gaining_members(entities, &seen);
        let graphs: Vec<Graph> = self.stack.iter().map(|e| e.graph.clone()).collect();
        self.base().rebase(entities, &graphs, false);
        self.tree.rebase(entities, false);
        if !touched.is_empty() {
            self.tree.rebase(&touched, true);
        }
        debug!(seen = seen.len(), touched = touched.len(), "merged remote entities");
        self.emit(&HistoryEvent::Merge(seen));
    }

    /// Relations of the current graph listed in `seen` with a member that
    /// `entities` brings into base for the first time.
    fn relations_gaining_members(&self, entities: &[Rc<Entity>], seen: &BTreeSet<EntityId>) -> Vec<Rc<Entity>> {
        let base = self.base();
        let new_ids: BTreeSet<&EntityId> = entities
            .iter()
            .map(|e| e.id())
            .filter(|id| base.has_entity(id).is_none())
            .collect();
        if new_ids.is_empty() {
            return Vec::new();
        }
        let head = self.graph();
        seen.iter()
            .filter_map(|id| head.has_entity(id))
            .filter(|e| e.kind() == EntityKind::Relation && e.member_ids().iter().any(|m| new_ids.contains(m)))
            .collect()
    }

    /// Replace the stack wholesale (used by restore). Caller guarantees
    /// `index < stack.len()` and that every graph shares the current base.
    fn install(&mut self, stack: Vec<Edit>, index: usize) {
        self.stack = stack;
        self.index = index;
    }

    /// Rebase `entities` into the base, overwriting what is there.
    fn force_rebase(&mut self, entities: &[Rc<Entity>]) {
        let graphs: Vec<Graph> = self.stack.iter().map(|e| e.graph.clone()).collect();
        self.base().rebase(entities, &graphs, true);
        self.tree.rebase(entities, true);
    }
}
