//! Immutable map features.
//!
//! An [`Entity`] is never mutated once it is shared: graphs hold entities as
//! `Rc<Entity>`, and every edit goes through [`Entity::update`], which clones,
//! applies the change and bumps the local revision `v`. Two graphs "agree" on
//! an entity when they hold the same `Rc` (pointer identity), which is what
//! [`crate::difference::Difference`] checks before comparing values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::extent::Loc;
use crate::model::id::{EntityId, EntityKind};

pub type Tags = BTreeMap<String, String>;

/// Keys that do not make an entity worth keeping on their own.
const UNINTERESTING_KEYS: [&str; 4] = ["attribution", "created_by", "source", "odbl"];

/// `true` if `key` carries meaning beyond provenance bookkeeping.
#[must_use]
pub fn is_interesting_key(key: &str) -> bool {
    !(UNINTERESTING_KEYS.contains(&key)
        || key.starts_with("source:")
        || key.starts_with("source_ref")
        || key.starts_with("tiger:"))
}

/// A relation member: an entity id and its role in the relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Member {
    pub id: EntityId,
    #[serde(default)]
    pub role: String,
}

impl Member {
    #[must_use]
    pub fn new(id: EntityId, role: impl Into<String>) -> Self {
        Self {
            id,
            role: role.into(),
        }
    }
}

/// Kind-specific shape of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Node { loc: Loc },
    Way { nodes: Vec<EntityId> },
    Relation { members: Vec<Member> },
}

impl Geometry {
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Node { .. } => EntityKind::Node,
            Self::Way { .. } => EntityKind::Way,
            Self::Relation { .. } => EntityKind::Relation,
        }
    }
}

/// Position of a node at either end of a way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affix {
    Prefix,
    Suffix,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: EntityId,
    tags: Tags,
    version: Option<u64>,
    v: u64,
    visible: bool,
    geometry: Geometry,
}

impl Entity {
    fn with_geometry(id: EntityId, geometry: Geometry) -> Self {
        debug_assert_eq!(id.kind(), geometry.kind(), "id prefix must match geometry");
        Self {
            id,
            tags: Tags::new(),
            version: None,
            v: 0,
            visible: true,
            geometry,
        }
    }

    #[must_use]
    pub fn node(id: EntityId, loc: Loc) -> Self {
        Self::with_geometry(id, Geometry::Node { loc })
    }

    #[must_use]
    pub fn way(id: EntityId, nodes: Vec<EntityId>) -> Self {
        Self::with_geometry(id, Geometry::Way { nodes })
    }

    #[must_use]
    pub fn relation(id: EntityId, members: Vec<Member>) -> Self {
        Self::with_geometry(id, Geometry::Relation { members })
    }

    /// Build an entity from an already-validated geometry.
    #[must_use]
    pub fn from_geometry(id: EntityId, geometry: Geometry) -> Self {
        Self::with_geometry(id, geometry)
    }

    // -----------------------------------------------------------------------
    // Builders (no revision bump; used before an entity is shared)
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    #[must_use]
    pub const fn with_v(mut self, v: u64) -> Self {
        self.v = v;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub const fn id(&self) -> &EntityId {
        &self.id
    }

    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.geometry.kind()
    }

    #[must_use]
    pub const fn tags(&self) -> &Tags {
        &self.tags
    }

    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Remote version, `None` for entities that were never uploaded.
    #[must_use]
    pub const fn version(&self) -> Option<u64> {
        self.version
    }

    /// Local revision counter.
    #[must_use]
    pub const fn v(&self) -> u64 {
        self.v
    }

    #[must_use]
    pub const fn visible(&self) -> bool {
        self.visible
    }

    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[must_use]
    pub const fn loc(&self) -> Option<Loc> {
        match &self.geometry {
            Geometry::Node { loc } => Some(*loc),
            _ => None,
        }
    }

    /// Node list of a way; empty for other kinds.
    #[must_use]
    pub fn nodes(&self) -> &[EntityId] {
        match &self.geometry {
            Geometry::Way { nodes } => nodes,
            _ => &[],
        }
    }

    /// Member list of a relation; empty for other kinds.
    #[must_use]
    pub fn members(&self) -> &[Member] {
        match &self.geometry {
            Geometry::Relation { members } => members,
            _ => &[],
        }
    }

    /// Persistence key `"<id>v<v>"`.
    #[must_use]
    pub fn key(&self) -> String {
        self.id.key(self.v)
    }

    #[must_use]
    pub fn has_interesting_tags(&self) -> bool {
        self.tags.keys().any(|k| is_interesting_key(k))
    }

    #[must_use]
    pub fn geometry_equals(&self, other: &Self) -> bool {
        self.geometry == other.geometry
    }

    /// `true` when the entity cannot be drawn: a node outside lon/lat bounds,
    /// a way with fewer than two distinct nodes, or an empty relation.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        match &self.geometry {
            Geometry::Node { loc } => {
                !(loc[0].is_finite()
                    && loc[1].is_finite()
                    && (-180.0..=180.0).contains(&loc[0])
                    && (-90.0..=90.0).contains(&loc[1]))
            }
            Geometry::Way { nodes } => {
                let mut distinct: Vec<&EntityId> = nodes.iter().collect();
                distinct.sort();
                distinct.dedup();
                let needed = if self.is_closed() { 3 } else { 2 };
                distinct.len() < needed
            }
            Geometry::Relation { members } => members.is_empty(),
        }
    }

    // -----------------------------------------------------------------------
    // Revisions
    // -----------------------------------------------------------------------

    /// Clone, apply `f` and bump the local revision.
    #[must_use]
    pub fn update(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        f(&mut next);
        next.v = self.v + 1;
        next
    }

    /// Clone and apply `f`, keeping the local revision. Used where the
    /// change is not a local edit, such as stamping a remote version.
    #[must_use]
    pub fn rebuild(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        f(&mut next);
        next.v = self.v;
        next
    }

    /// New revision with identical content.
    #[must_use]
    pub fn touch(&self) -> Self {
        self.update(|_| {})
    }

    pub fn set_tags(&mut self, tags: Tags) {
        self.tags = tags;
    }

    pub const fn set_version(&mut self, version: Option<u64>) {
        self.version = version;
    }

    pub const fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// No effect on ways and relations.
    pub const fn set_loc(&mut self, to: Loc) {
        if let Geometry::Node { loc } = &mut self.geometry {
            *loc = to;
        }
    }

    /// No effect on nodes and relations.
    pub fn set_nodes(&mut self, to: Vec<EntityId>) {
        if let Geometry::Way { nodes } = &mut self.geometry {
            *nodes = to;
        }
    }

    /// No effect on nodes and ways.
    pub fn set_members(&mut self, to: Vec<Member>) {
        if let Geometry::Relation { members } = &mut self.geometry {
            *members = to;
        }
    }

    // -----------------------------------------------------------------------
    // Node operations
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn move_to(&self, loc: Loc) -> Self {
        self.update(|e| e.set_loc(loc))
    }

    // -----------------------------------------------------------------------
    // Way operations
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn first(&self) -> Option<&EntityId> {
        self.nodes().first()
    }

    #[must_use]
    pub fn last(&self) -> Option<&EntityId> {
        self.nodes().last()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        let nodes = self.nodes();
        nodes.len() > 1 && nodes.first() == nodes.last()
    }

    #[must_use]
    pub fn contains(&self, node: &EntityId) -> bool {
        self.nodes().contains(node)
    }

    #[must_use]
    pub fn affix(&self, node: &EntityId) -> Option<Affix> {
        if self.first() == Some(node) {
            Some(Affix::Prefix)
        } else if self.last() == Some(node) {
            Some(Affix::Suffix)
        } else {
            None
        }
    }

    /// Closed way tagged as something with an inside.
    #[must_use]
    pub fn is_area(&self) -> bool {
        self.kind() == EntityKind::Way
            && self.is_closed()
            && self.tag("area") != Some("no")
            && self.has_interesting_tags()
    }

    /// Insert `node` at `index`, or append. Appending to a closed way inserts
    /// before the closing node so the way stays closed.
    #[must_use]
    pub fn add_node(&self, node: EntityId, index: Option<usize>) -> Self {
        let closed = self.is_closed();
        let mut nodes = self.nodes().to_vec();
        let at = match index {
            Some(i) => i.min(nodes.len()),
            None if closed => nodes.len() - 1,
            None => nodes.len(),
        };
        nodes.insert(at, node);
        self.update(|e| e.set_nodes(nodes))
    }

    /// Remove every occurrence of `node`, collapsing consecutive duplicates.
    /// A closed way stays closed.
    #[must_use]
    pub fn remove_node(&self, node: &EntityId) -> Self {
        let closed = self.is_closed();
        let mut nodes: Vec<EntityId> = self.nodes().iter().filter(|n| *n != node).cloned().collect();
        nodes.dedup();
        if closed
            && nodes.len() > 1
            && nodes.first() != nodes.last()
            && let Some(first) = nodes.first().cloned()
        {
            nodes.push(first);
        }
        self.update(|e| e.set_nodes(nodes))
    }

    /// Replace every occurrence of `needle` with `replacement`.
    #[must_use]
    pub fn replace_node(&self, needle: &EntityId, replacement: &EntityId) -> Self {
        let mut nodes: Vec<EntityId> = self
            .nodes()
            .iter()
            .map(|n| if n == needle { replacement.clone() } else { n.clone() })
            .collect();
        nodes.dedup();
        self.update(|e| e.set_nodes(nodes))
    }

    // -----------------------------------------------------------------------
    // Relation operations
    // -----------------------------------------------------------------------

    /// Distinct member ids in first-seen order.
    #[must_use]
    pub fn member_ids(&self) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = Vec::new();
        for m in self.members() {
            if !out.contains(&m.id) {
                out.push(m.id.clone());
            }
        }
        out
    }

    #[must_use]
    pub fn has_member(&self, id: &EntityId) -> bool {
        self.members().iter().any(|m| &m.id == id)
    }

    #[must_use]
    pub fn is_multipolygon(&self) -> bool {
        self.kind() == EntityKind::Relation && self.tag("type") == Some("multipolygon")
    }

    #[must_use]
    pub fn add_member(&self, member: Member, index: Option<usize>) -> Self {
        let mut members = self.members().to_vec();
        let at = index.map_or(members.len(), |i| i.min(members.len()));
        members.insert(at, member);
        self.update(|e| e.set_members(members))
    }

    #[must_use]
    pub fn remove_members_with_id(&self, id: &EntityId) -> Self {
        let members = self.members().iter().filter(|m| &m.id != id).cloned().collect();
        self.update(|e| e.set_members(members))
    }

    /// Point every membership of `needle` at `replacement`, keeping roles.
    #[must_use]
    pub fn replace_member(&self, needle: &EntityId, replacement: &EntityId) -> Self {
        let members = self
            .members()
            .iter()
            .map(|m| {
                if &m.id == needle {
                    Member::new(replacement.clone(), m.role.clone())
                } else {
                    m.clone()
                }
            })
            .collect();
        self.update(|e| e.set_members(members))
    }
}
