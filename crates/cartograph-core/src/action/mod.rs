//! Graph-to-graph edit operations.
//!
//! An [`Action`] is a pure function from a graph to a new graph, plus an
//! optional eligibility check. Actions that can be animated report
//! `transitionable() == true` and honour the `t` argument: `t = 0` is the
//! start of the animation and `t = 1` is the final state. History drives
//! such actions through a [`Transition`].

mod basic;
mod delete;
mod transition;

use std::fmt;
use std::rc::Rc;

use crate::graph::Graph;
use crate::model::EntityId;

pub use basic::{AddEntity, AddMember, ChangeTags, DiscardTags, MoveNode, Revert};
pub use delete::{DeleteMultiple, DeleteNode, DeleteRelation, DeleteWay};
pub use transition::Transition;

/// Why an action cannot run against a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisabledReason {
    NotFound(EntityId),
    IncompleteRelation(EntityId),
    Degenerate(EntityId),
}

impl DisabledReason {
    /// Short stable reason code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::IncompleteRelation(_) => "incomplete_relation",
            Self::Degenerate(_) => "degenerate",
        }
    }
}

impl fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "{id} is not loaded"),
            Self::IncompleteRelation(id) => write!(f, "relation {id} is not fully loaded"),
            Self::Degenerate(id) => write!(f, "{id} would become degenerate"),
        }
    }
}

pub trait Action {
    /// Produce the graph after this action at animation time `t` in `[0, 1]`.
    /// Non-transitionable actions ignore `t`.
    fn apply(&self, graph: &Graph, t: f64) -> Graph;

    fn disabled(&self, _graph: &Graph) -> Option<DisabledReason> {
        None
    }

    fn transitionable(&self) -> bool {
        false
    }

    fn name(&self) -> &str;
}

/// Shared handle to an action, as stored by history and transitions.
pub type ActionRef = Rc<dyn Action>;

/// Adapter turning a closure into an [`Action`].
pub struct ActionFn<F> {
    name: &'static str,
    f: F,
}

impl<F> fmt::Debug for ActionFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionFn").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<F: Fn(&Graph) -> Graph> Action for ActionFn<F> {
    fn apply(&self, graph: &Graph, _t: f64) -> Graph {
        (self.f)(graph)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Wrap `f` as a shareable action.
pub fn from_fn<F>(name: &'static str, f: F) -> ActionRef
where
    F: Fn(&Graph) -> Graph + 'static,
{
    Rc::new(ActionFn { name, f })
}

/// Action returning its input unchanged.
#[must_use]
pub fn noop() -> ActionRef {
    from_fn("noop", Graph::clone)
}
