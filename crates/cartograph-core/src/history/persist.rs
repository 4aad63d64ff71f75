//! Saved-history JSON.
//!
//! Only per-edit deltas are stored: for each edit the keys (`<id>v<v>`) of
//! the overlay entities and the ids it deletes, plus one shared table of
//! entity values. Base values of every touched id, their child nodes and
//! their parent ways travel along so a restore can rebuild the same graphs
//! before any remote data has been loaded.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::ErrorCode;
use crate::graph::Graph;
use crate::history::{Edit, History, HistoryEvent};
use crate::model::{Entity, EntityId, EntityRecord, IdGenerator, RecordError};

/// Version written by [`History::to_json`].
pub const HISTORY_VERSION: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("saved history is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("saved history version {0} is not supported")]
    UnsupportedVersion(u32),
    #[error("saved history has no edits")]
    EmptyStack,
    #[error("saved history cursor {index} is past the end of {len} edits")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("saved history references unknown entity key '{0}'")]
    MissingEntity(String),
    #[error(transparent)]
    Record(#[from] RecordError),
}

impl PersistError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Json(_) | Self::EmptyStack | Self::IndexOutOfRange { .. } => {
                ErrorCode::CorruptHistory
            }
            Self::UnsupportedVersion(_) => ErrorCode::UnsupportedHistoryVersion,
            Self::MissingEntity(_) => ErrorCode::HistoryEntityMissing,
            Self::Record(e) => e.code(),
        }
    }
}

/// One stack entry of a saved history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedEdit {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(rename = "selectedIDs", default, skip_serializing_if = "Vec::is_empty")]
    pub selected_ids: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imagery_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedHistory {
    pub version: u32,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub base_entities: Vec<EntityRecord>,
    pub stack: Vec<SavedEdit>,
    #[serde(rename = "nextIDs", default)]
    pub next_ids: IdGenerator,
    pub index: usize,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl SavedHistory {
    /// Parse and check the envelope without touching any history.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] for malformed JSON, unsupported versions, an
    /// empty stack or an out-of-range cursor.
    pub fn parse(json: &str) -> Result<Self, PersistError> {
        let saved: Self = serde_json::from_str(json)?;
        if saved.version != 2 && saved.version != 3 {
            return Err(PersistError::UnsupportedVersion(saved.version));
        }
        if saved.stack.is_empty() {
            return Err(PersistError::EmptyStack);
        }
        if saved.index >= saved.stack.len() {
            return Err(PersistError::IndexOutOfRange {
                index: saved.index,
                len: saved.stack.len(),
            });
        }
        Ok(saved)
    }

    /// Save time, if recorded.
    #[must_use]
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Annotations of the edits up to the cursor.
    #[must_use]
    pub fn annotations(&self) -> Vec<&str> {
        self.stack[..=self.index.min(self.stack.len().saturating_sub(1))]
            .iter()
            .filter_map(|e| e.annotation.as_deref())
            .collect()
    }

    /// Entity table keyed by `<id>v<v>`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Record`] for a record whose geometry does not
    /// match its kind.
    pub fn entity_table(&self) -> Result<HashMap<String, Rc<Entity>>, PersistError> {
        self.entities
            .iter()
            .map(|record| -> Result<(String, Rc<Entity>), PersistError> {
                let entity = Entity::try_from(record.clone())?;
                Ok((entity.key(), Rc::new(entity)))
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns [`PersistError::Record`] for a malformed base record.
    pub fn base_table(&self) -> Result<Vec<Rc<Entity>>, PersistError> {
        self.base_entities
            .iter()
            .map(|record| -> Result<Rc<Entity>, PersistError> {
                Ok(Rc::new(Entity::try_from(record.clone())?))
            })
            .collect()
    }
}

/// Store `entity` in the table and return its key. When another value
/// already holds the same `<id>v<v>` key, this revision is renumbered.
fn table_key(table: &mut BTreeMap<String, EntityRecord>, entity: &Entity) -> String {
    let mut record = EntityRecord::from(entity);
    loop {
        let key = record.id.key(record.v);
        match table.get(&key) {
            Some(existing) if *existing != record => record.v += 1,
            Some(_) => return key,
            None => {
                table.insert(key.clone(), record);
                return key;
            }
        }
    }
}

impl History {
    /// Snapshot of the stack as per-edit deltas. `None` when nothing differs
    /// from base.
    #[must_use]
    pub fn to_saved(&self) -> Option<SavedHistory> {
        if !self.has_changes() {
            return None;
        }

        let mut table: BTreeMap<String, EntityRecord> = BTreeMap::new();
        let mut touched: BTreeSet<EntityId> = BTreeSet::new();
        let mut stack = Vec::with_capacity(self.stack.len());

        for edit in &self.stack {
            let mut saved = SavedEdit {
                annotation: edit.annotation.clone(),
                selected_ids: edit.selected_ids.clone(),
                imagery_used: edit.imagery_used.clone(),
                photos_used: edit.photos_used.clone(),
                ..SavedEdit::default()
            };
            for (id, entity) in edit.graph.local_entities() {
                touched.insert(id.clone());
                match entity {
                    Some(entity) => saved.modified.push(table_key(&mut table, &entity)),
                    None => saved.deleted.push(id),
                }
            }
            stack.push(saved);
        }

        let base = self.base();
        let mut originals: BTreeMap<EntityId, Rc<Entity>> = BTreeMap::new();
        for id in &touched {
            let Some(original) = base.has_entity(id) else {
                continue;
            };
            if originals.contains_key(id) {
                continue;
            }
            for child in original.nodes() {
                if let Some(node) = base.has_entity(child) {
                    originals.insert(child.clone(), node);
                }
            }
            for parent in base.parent_ways(&original) {
                originals.insert(parent.id().clone(), parent);
            }
            originals.insert(id.clone(), original);
        }

        Some(SavedHistory {
            version: HISTORY_VERSION,
            entities: table.into_values().collect(),
            base_entities: originals.values().map(|e| EntityRecord::from(&**e)).collect(),
            stack,
            next_ids: self.ids.clone(),
            index: self.index,
            timestamp: Some(Utc::now().timestamp_millis()),
        })
    }

    /// Serialize the stack; `Ok(None)` when there is nothing to save.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<Option<String>, PersistError> {
        self.to_saved()
            .map(|saved| serde_json::to_string(&saved))
            .transpose()
            .map_err(PersistError::from)
    }

    /// Replace the stack with a saved one.
    ///
    /// Version 3 base entities are force-rebased into the base graph and the
    /// spatial index first. Every edit is then rebuilt as a fresh graph over
    /// the shared base. Nothing is changed if the input is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] for malformed or unsupported input, or an
    /// edit referencing a key missing from the entity table.
    #[instrument(level = "debug", skip_all, fields(bytes = json.len()))]
    pub fn from_json(&mut self, json: &str) -> Result<(), PersistError> {
        let saved = SavedHistory::parse(json)?;
        self.restore_saved(saved)
    }

    /// [`History::from_json`] for an already parsed history.
    ///
    /// # Errors
    ///
    /// See [`History::from_json`].
    pub fn restore_saved(&mut self, saved: SavedHistory) -> Result<(), PersistError> {
        let table = saved.entity_table()?;
        let originals = if saved.version >= 3 {
            saved.base_table()?
        } else {
            Vec::new()
        };

        let mut overlays: Vec<Vec<(EntityId, Option<Rc<Entity>>)>> = Vec::new();
        for edit in saved.stack.iter().skip(1) {
            let mut overlay = Vec::with_capacity(edit.modified.len() + edit.deleted.len());
            for key in &edit.modified {
                let entity = table
                    .get(key)
                    .ok_or_else(|| PersistError::MissingEntity(key.clone()))?;
                overlay.push((entity.id().clone(), Some(Rc::clone(entity))));
            }
            overlay.extend(edit.deleted.iter().map(|id| (id.clone(), None)));
            overlays.push(overlay);
        }

        self.interrupt();
        let previous = self.graph().clone();
        if !originals.is_empty() {
            self.force_rebase(&originals);
        }

        let base_edit = self.stack[0].clone();
        let mut stack = vec![base_edit];
        for (edit, overlay) in saved.stack.iter().skip(1).zip(overlays) {
            let graph = Graph::derive(self.base(), true);
            graph.load(overlay);
            stack.push(Edit {
                graph: graph.freeze(),
                annotation: edit.annotation.clone(),
                selected_ids: edit.selected_ids.clone(),
                imagery_used: edit.imagery_used.clone(),
                photos_used: edit.photos_used.clone(),
            });
        }

        self.ids = saved.next_ids;
        self.install(stack, saved.index);
        info!(
            edits = self.stack.len(),
            index = self.index,
            version = saved.version,
            "restored saved history"
        );
        let _ = self.change(&previous);
        self.emit(&HistoryEvent::Restore);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_versions() {
        let json = r#"{"version":1,"entities":[],"stack":[{}],"nextIDs":{},"index":0}"#;
        let err = SavedHistory::parse(json).expect_err("version 1");
        assert_eq!(err.code(), ErrorCode::UnsupportedHistoryVersion);
    }

    #[test]
    fn rejects_cursor_past_end() {
        let json = r#"{"version":3,"stack":[{}],"index":4}"#;
        assert!(matches!(
            SavedHistory::parse(json),
            Err(PersistError::IndexOutOfRange { index: 4, len: 1 })
        ));
    }

    #[test]
    fn missing_entity_key_leaves_history_untouched() {
        let json = r#"{"version":3,"entities":[],"baseEntities":[],
            "stack":[{},{"modified":["n1v1"],"annotation":"x"}],"index":1}"#;
        let mut history = History::new();
        let err = history.from_json(json).expect_err("missing key");
        assert_eq!(err.code(), ErrorCode::HistoryEntityMissing);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn colliding_revisions_get_distinct_keys() {
        let mut table = BTreeMap::new();
        let id = EntityId::new("n1").expect("valid");
        let a = Entity::node(id.clone(), [0.0, 0.0]).with_v(1);
        let b = Entity::node(id, [5.0, 5.0]).with_v(1);
        assert_eq!(table_key(&mut table, &a), "n1v1");
        assert_eq!(table_key(&mut table, &b), "n1v2");
        assert_eq!(table_key(&mut table, &a), "n1v1");
        assert_eq!(table_key(&mut table, &b), "n1v2");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn timestamp_is_exposed_as_utc() {
        let json = r#"{"version":2,"stack":[{}],"index":0,"timestamp":1700000000000}"#;
        let saved = SavedHistory::parse(json).expect("valid");
        let at = saved.saved_at().expect("timestamp");
        assert_eq!(at.timestamp(), 1_700_000_000);
    }
}
