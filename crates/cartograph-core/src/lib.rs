//! cartograph-core: a versioned graph of map features.
//!
//! - [`model`]: nodes, ways and relations, immutable and shared as `Rc<Entity>`.
//! - [`graph`]: copy-on-write overlays over one shared base, with parent
//!   indices kept in step with every mutation.
//! - [`tree`]: a spatial index that follows the current graph incrementally.
//! - [`difference`]: what changed between two graphs of the same session.
//! - [`action`]: graph-to-graph edits, including cascading deletes.
//! - [`history`]: the undo stack, transactions, checkpoints, transitions and
//!   the saved-history format.
//! - [`merge`]: three-way merge of local edits with remote versions.
//! - [`save`]: conflict check and upload against a [`save::RemoteService`].
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums, each mapping to an
//!   [`error::ErrorCode`]; config loading uses `anyhow::Result`.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//! - **Threading**: single-threaded; graphs are `Rc` handles, not `Send`.

pub mod action;
pub mod config;
pub mod difference;
pub mod error;
pub mod graph;
pub mod history;
pub mod merge;
pub mod model;
pub mod save;
pub mod tree;

pub use action::{Action, ActionRef};
pub use difference::Difference;
pub use error::ErrorCode;
pub use graph::{Graph, GraphError};
pub use history::{History, HistoryEvent};
pub use merge::{Conflict, MergeRemoteChanges, Strategy};
pub use model::{Entity, EntityId, EntityKind, Extent, Loc, Member};
pub use tree::Tree;
