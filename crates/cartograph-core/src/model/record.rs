//! Serde form of an [`Entity`], used by saved histories and the CLI.
//!
//! The kind is inferred from the id prefix; exactly one of `loc`, `nodes`
//! and `members` must agree with it. Versions are accepted as numbers or
//! numeric strings because older saved histories wrote them as strings.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ErrorCode;
use crate::model::entity::{Entity, Geometry, Member, Tags};
use crate::model::extent::Loc;
use crate::model::id::{EntityId, EntityKind};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("{kind} record '{id}' is missing its {field}")]
    MissingGeometry {
        id: EntityId,
        kind: EntityKind,
        field: &'static str,
    },
}

impl RecordError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidEntityRecord
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<Loc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<Member>>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(
        default,
        deserialize_with = "lenient_version",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<u64>,
    #[serde(default)]
    pub v: u64,
    #[serde(default = "visible_default", skip_serializing_if = "is_visible")]
    pub visible: bool,
}

impl From<&Entity> for EntityRecord {
    fn from(entity: &Entity) -> Self {
        let (loc, nodes, members) = match entity.geometry() {
            Geometry::Node { loc } => (Some(*loc), None, None),
            Geometry::Way { nodes } => (None, Some(nodes.clone()), None),
            Geometry::Relation { members } => (None, None, Some(members.clone())),
        };
        Self {
            id: entity.id().clone(),
            loc,
            nodes,
            members,
            tags: entity.tags().clone(),
            version: entity.version(),
            v: entity.v(),
            visible: entity.visible(),
        }
    }
}

impl TryFrom<EntityRecord> for Entity {
    type Error = RecordError;

    fn try_from(record: EntityRecord) -> Result<Self, Self::Error> {
        let kind = record.id.kind();
        let missing = |field| RecordError::MissingGeometry {
            id: record.id.clone(),
            kind,
            field,
        };
        let geometry = match kind {
            EntityKind::Node => Geometry::Node {
                loc: record.loc.ok_or_else(|| missing("loc"))?,
            },
            EntityKind::Way => Geometry::Way {
                nodes: record.nodes.clone().ok_or_else(|| missing("nodes"))?,
            },
            EntityKind::Relation => Geometry::Relation {
                members: record.members.clone().unwrap_or_default(),
            },
        };
        let mut entity = Self::from_geometry(record.id, geometry)
            .with_tags(record.tags)
            .with_v(record.v)
            .with_visible(record.visible);
        entity.set_version(record.version);
        Ok(entity)
    }
}

const fn visible_default() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_visible(visible: &bool) -> bool {
    *visible
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Number(u64),
    Text(String),
}

fn lenient_version<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawVersion>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawVersion::Number(n)) => Ok(Some(n)),
        Some(RawVersion::Text(text)) => text
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid version '{text}'"))),
    }
}
