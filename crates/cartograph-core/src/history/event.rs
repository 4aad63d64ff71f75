use std::collections::BTreeSet;

use crate::difference::Difference;
use crate::model::EntityId;

/// Handle returned by [`super::History::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(super) u64);

/// Notification delivered to history listeners.
#[derive(Debug, Clone)]
pub enum HistoryEvent {
    /// The current graph changed; carries the difference from the previous
    /// current graph (or from the graph at the start of a transaction).
    Change(Difference),
    /// Emitted before the `Change` of an undo. `annotation` names the edit
    /// that was undone; `index` is the new cursor.
    Undone {
        annotation: Option<String>,
        index: usize,
    },
    Redone {
        annotation: Option<String>,
        index: usize,
    },
    /// Remote entities were merged; carries every id the load covered.
    Merge(BTreeSet<EntityId>),
    /// A saved history was restored.
    Restore,
}

impl HistoryEvent {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Change(_) => "change",
            Self::Undone { .. } => "undone",
            Self::Redone { .. } => "redone",
            Self::Merge(_) => "merge",
            Self::Restore => "restore",
        }
    }
}
