//! In-memory stand-in for the remote map store.
//!
//! Versions work like the real thing: every accepted write bumps the
//! entity's version, an upload carrying a stale version is rejected with
//! [`RemoteError::VersionConflict`], and deletions leave an invisible
//! tombstone. Placeholder ids of created entities are swapped for real ones
//! on upload, including inside node lists and member lists.

use std::collections::BTreeMap;

use cartograph_core::history::Changes;
use cartograph_core::model::{Entity, EntityId, EntityKind, Loc};
use cartograph_core::save::{RemoteError, RemoteService};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::rng::DeterministicRng;

/// Fault injection for the simulated remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Percentage of loads and uploads failing as unavailable.
    pub unavailable_percent: u8,
    /// Percentage of uploads preceded by a concurrent edit to one of the
    /// uploaded entities.
    pub race_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            unavailable_percent: 5,
            race_percent: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStats {
    pub loads: usize,
    pub uploads_accepted: usize,
    pub uploads_stale: usize,
    pub outages: usize,
    pub races: usize,
}

/// A write accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedUpload {
    pub modified: Vec<EntityId>,
    /// Placeholder id to assigned id.
    pub created: BTreeMap<EntityId, EntityId>,
    pub deleted: Vec<EntityId>,
}

#[derive(Debug, Clone)]
pub struct SimulatedRemote {
    entities: BTreeMap<EntityId, Entity>,
    last_ids: BTreeMap<EntityKind, i64>,
    rng: DeterministicRng,
    fault: FaultConfig,
    stats: RemoteStats,
    accepted: Vec<AcceptedUpload>,
}

impl SimulatedRemote {
    #[must_use]
    pub fn new(rng: DeterministicRng, fault: FaultConfig, entities: impl IntoIterator<Item = Entity>) -> Self {
        let entities: BTreeMap<EntityId, Entity> =
            entities.into_iter().map(|e| (e.id().clone(), e)).collect();
        let mut last_ids = BTreeMap::new();
        for id in entities.keys() {
            let slot = last_ids.entry(id.kind()).or_insert(0_i64);
            *slot = (*slot).max(id.number().unwrap_or(0));
        }
        Self {
            entities,
            last_ids,
            rng,
            fault,
            stats: RemoteStats::default(),
            accepted: Vec::new(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> RemoteStats {
        self.stats
    }

    #[must_use]
    pub fn accepted(&self) -> &[AcceptedUpload] {
        &self.accepted
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Every visible entity, as a fresh session would load it.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Entity> {
        self.entities.values().filter(|e| e.visible()).cloned().collect()
    }

    /// Visible ids of `kind`.
    #[must_use]
    pub fn ids_of(&self, kind: EntityKind) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.visible() && e.kind() == kind)
            .map(|e| e.id().clone())
            .collect()
    }

    fn bump(&mut self, id: &EntityId, f: impl FnOnce(&mut Entity)) -> bool {
        let Some(current) = self.entities.get(id).filter(|e| e.visible()) else {
            return false;
        };
        let version = current.version().unwrap_or(0) + 1;
        let next = current.update(|e| {
            f(e);
            e.set_version(Some(version));
        });
        self.entities.insert(id.clone(), next);
        true
    }

    /// Another mapper sets `key` on `id`.
    pub fn edit_tag(&mut self, id: &EntityId, key: &str, value: &str) -> bool {
        self.bump(id, |e| {
            let mut tags = e.tags().clone();
            tags.insert(key.to_string(), value.to_string());
            e.set_tags(tags);
        })
    }

    /// Another mapper moves node `id`.
    pub fn move_node(&mut self, id: &EntityId, to: Loc) -> bool {
        id.kind() == EntityKind::Node && self.bump(id, |e| e.set_loc(to))
    }

    fn outage(&mut self) -> bool {
        let hit = self.rng.hit_rate_percent(self.fault.unavailable_percent);
        if hit {
            self.stats.outages += 1;
        }
        hit
    }

    fn assign_id(&mut self, kind: EntityKind) -> EntityId {
        let slot = self.last_ids.entry(kind).or_insert(0);
        *slot += 1;
        EntityId::from_parts(kind, *slot)
    }

    fn is_stale(&self, entity: &Entity) -> bool {
        self.entities
            .get(entity.id())
            .is_none_or(|stored| stored.version() != entity.version())
    }
}

fn remap(entity: &Entity, ids: &BTreeMap<EntityId, EntityId>) -> Entity {
    let mut out = entity.clone();
    for (from, to) in ids {
        match out.kind() {
            EntityKind::Way if out.contains(from) => out = out.replace_node(from, to),
            EntityKind::Relation if out.has_member(from) => out = out.replace_member(from, to),
            _ => {}
        }
    }
    out
}

impl RemoteService for SimulatedRemote {
    fn load_entities(&mut self, ids: &[EntityId]) -> Result<Vec<Entity>, RemoteError> {
        if self.outage() {
            return Err(RemoteError::Unavailable("simulated outage".into()));
        }
        self.stats.loads += 1;
        Ok(ids.iter().filter_map(|id| self.entities.get(id).cloned()).collect())
    }

    fn upload(&mut self, changes: &Changes) -> Result<(), RemoteError> {
        if self.outage() {
            return Err(RemoteError::Unavailable("simulated outage".into()));
        }
        if self.rng.hit_rate_percent(self.fault.race_percent) {
            if let Some(target) = self.rng.pick(&changes.modified).map(|e| e.id().clone()) {
                let stamp = format!("r{}", self.rng.next_bounded(1000));
                if self.edit_tag(&target, "check_date", &stamp) {
                    self.stats.races += 1;
                    trace!(id = %target, "concurrent edit before upload");
                }
            }
        }
        if changes.modified.iter().chain(&changes.deleted).any(|e| self.is_stale(e)) {
            self.stats.uploads_stale += 1;
            return Err(RemoteError::VersionConflict);
        }

        let mut created = BTreeMap::new();
        for entity in &changes.created {
            let assigned = self.assign_id(entity.kind());
            created.insert(entity.id().clone(), assigned);
        }
        for entity in &changes.created {
            let Some(assigned) = created.get(entity.id()) else {
                continue;
            };
            let fresh = Entity::from_geometry(assigned.clone(), entity.geometry().clone())
                .with_tags(entity.tags().clone())
                .with_version(1);
            self.entities.insert(assigned.clone(), remap(&fresh, &created));
        }
        for entity in &changes.modified {
            let version = entity.version().unwrap_or(0) + 1;
            let stored = remap(entity, &created).update(|e| e.set_version(Some(version)));
            self.entities.insert(entity.id().clone(), stored);
        }
        for entity in &changes.deleted {
            let _ = self.bump(entity.id(), |e| e.set_visible(false));
        }

        self.stats.uploads_accepted += 1;
        debug!(
            modified = changes.modified.len(),
            created = created.len(),
            deleted = changes.deleted.len(),
            "upload accepted"
        );
        self.accepted.push(AcceptedUpload {
            modified: changes.modified.iter().map(|e| e.id().clone()).collect(),
            created,
            deleted: changes.deleted.iter().map(|e| e.id().clone()).collect(),
        });
        Ok(())
    }
}
