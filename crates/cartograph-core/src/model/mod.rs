//! Entity model: ids, immutable entities, extents and their serde records.

pub mod entity;
pub mod extent;
pub mod id;
pub mod record;

pub use entity::{Affix, Entity, Geometry, Member, Tags, is_interesting_key};
pub use extent::{Extent, Loc};
pub use id::{EntityId, EntityKind, IdError, IdGenerator};
pub use record::{EntityRecord, RecordError};
