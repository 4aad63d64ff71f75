//! Entity identifiers and the per-session id generator.
//!
//! An id is a one-letter kind prefix (`n`, `w`, `r`) followed by a body,
//! normally a signed integer. Negative numbers are placeholders for entities
//! created locally; positive numbers have been confirmed by the remote store.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// The three entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Way,
    Relation,
}

impl EntityKind {
    /// One-letter id prefix.
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Node => 'n',
            Self::Way => 'w',
            Self::Relation => 'r',
        }
    }

    #[must_use]
    pub const fn from_prefix(c: char) -> Option<Self> {
        match c {
            'n' => Some(Self::Node),
            'w' => Some(Self::Way),
            'r' => Some(Self::Relation),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a string is not a valid entity id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("entity id is empty")]
    Empty,
    #[error("entity id '{0}' does not start with n, w or r")]
    UnknownKind(String),
}

impl IdError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidEntityId
    }
}

/// Validated entity id.
///
/// Equality, ordering and hashing follow the raw string, so an `EntityId`
/// can be looked up by `&str` in hashed and ordered collections.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    kind: EntityKind,
    raw: String,
}

impl EntityId {
    /// Parse and validate an id.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] when the id is empty or has no known kind prefix.
    pub fn new(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        let Some(first) = raw.chars().next() else {
            return Err(IdError::Empty);
        };
        let kind = EntityKind::from_prefix(first).ok_or_else(|| IdError::UnknownKind(raw.clone()))?;
        Ok(Self { kind, raw })
    }

    /// Build an id from a kind and a number, e.g. `(Way, -3)` => `w-3`.
    #[must_use]
    pub fn from_parts(kind: EntityKind, number: i64) -> Self {
        Self {
            kind,
            raw: format!("{}{number}", kind.prefix()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Numeric part of the id, if the body is an integer.
    #[must_use]
    pub fn number(&self) -> Option<i64> {
        self.raw[1..].parse().ok()
    }

    /// `true` for placeholder ids minted locally (negative number).
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.number().is_some_and(|n| n < 0)
    }

    /// Persistence key of this id at local revision `v`: `"<id>v<v>"`.
    #[must_use]
    pub fn key(&self, v: u64) -> String {
        format!("{}v{v}", self.raw)
    }
}

impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for EntityId {}

impl Hash for EntityId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for EntityId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.raw
    }
}

// ---------------------------------------------------------------------------
// IdGenerator
// ---------------------------------------------------------------------------

/// Per-kind counters for locally created entities.
///
/// Serialized as the `nextIDs` object of a saved history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGenerator {
    #[serde(default = "first_placeholder")]
    pub node: i64,
    #[serde(default = "first_placeholder")]
    pub way: i64,
    #[serde(default = "first_placeholder")]
    pub relation: i64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            node: first_placeholder(),
            way: first_placeholder(),
            relation: first_placeholder(),
        }
    }
}

impl IdGenerator {
    /// Mint the next placeholder id for `kind`.
    pub fn next(&mut self, kind: EntityKind) -> EntityId {
        let slot = match kind {
            EntityKind::Node => &mut self.node,
            EntityKind::Way => &mut self.way,
            EntityKind::Relation => &mut self.relation,
        };
        let id = EntityId::from_parts(kind, *slot);
        *slot -= 1;
        id
    }

    /// Reset every counter to `-1`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

const fn first_placeholder() -> i64 {
    -1
}
