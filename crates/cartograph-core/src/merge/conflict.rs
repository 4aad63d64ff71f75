use std::fmt;

use serde::Serialize;

use crate::model::EntityId;

/// Which part of an entity both sides changed incompatibly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum ConflictField {
    Location,
    Nodelist,
    Memberlist,
    Tags { key: String },
    /// Deleted remotely while edited locally.
    Deleted,
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location => f.write_str("location"),
            Self::Nodelist => f.write_str("nodelist"),
            Self::Memberlist => f.write_str("memberlist"),
            Self::Tags { key } => write!(f, "tag '{key}'"),
            Self::Deleted => f.write_str("deleted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub id: EntityId,
    #[serde(flatten)]
    pub field: ConflictField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_value: Option<String>,
    pub message: String,
}

impl Conflict {
    pub(super) fn new(
        id: &EntityId,
        field: ConflictField,
        local_value: Option<String>,
        remote_value: Option<String>,
    ) -> Self {
        let message = match &field {
            ConflictField::Location => format!("{id} was moved both locally and remotely"),
            ConflictField::Nodelist => format!("nodes of {id} were changed both locally and remotely"),
            ConflictField::Memberlist => {
                format!("members of {id} were changed both locally and remotely")
            }
            ConflictField::Tags { key } => format!(
                "tag '{key}' of {id} was set to '{}' locally and '{}' remotely",
                local_value.as_deref().unwrap_or(""),
                remote_value.as_deref().unwrap_or(""),
            ),
            ConflictField::Deleted => format!("{id} was edited locally but deleted remotely"),
        };
        Self {
            id: id.clone(),
            field,
            local_value,
            remote_value,
            message,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
