pub mod completions;
pub mod inspect;
pub mod merge_check;
pub mod sim;
pub mod summary;
pub mod undo_log;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use cartograph_core::History;
use cartograph_core::config::EffectiveConfig;
use cartograph_core::history::{HistoryStore, SavedHistory};
use clap::Args;
use tracing::debug;

/// Where to read a saved history from.
#[derive(Args, Debug, Clone, Default)]
pub struct HistorySource {
    /// Saved-history JSON file. Defaults to the history store directory.
    pub file: Option<PathBuf>,

    /// History store directory (default: user `history_dir`, else
    /// `.cartograph/history` in the project).
    #[arg(long, conflicts_with = "file")]
    pub dir: Option<PathBuf>,
}

/// A restored history together with the envelope it came from.
pub struct Loaded {
    pub path: PathBuf,
    pub saved: SavedHistory,
    pub history: History,
}

impl HistorySource {
    /// Path the saved history is read from.
    pub fn resolve_path(&self, project_root: &Path, config: &EffectiveConfig) -> PathBuf {
        if let Some(file) = &self.file {
            return file.clone();
        }
        let dir = self
            .dir
            .clone()
            .or_else(|| config.user.history_dir.clone())
            .unwrap_or_else(|| project_root.join(".cartograph/history"));
        store_path(&dir, &config.editor.history.storage_key_prefix)
    }

    /// Read, check and restore the saved history.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable, or the saved
    /// history is malformed (downcastable to `PersistError`).
    pub fn load(&self, project_root: &Path, config: &EffectiveConfig) -> Result<Loaded> {
        let path = self.resolve_path(project_root, config);
        if !path.exists() {
            bail!("no saved history at {}", path.display());
        }
        let json = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let saved = SavedHistory::parse(&json)?;
        let mut history = History::with_config(&config.editor.history);
        history.restore_saved(saved.clone())?;
        debug!(path = %path.display(), edits = history.len(), "loaded saved history");
        Ok(Loaded { path, saved, history })
    }
}

/// Saved-history file of a store directory, without creating the directory.
fn store_path(dir: &Path, prefix: &str) -> PathBuf {
    if dir.is_dir()
        && let Ok(store) = HistoryStore::open(dir, prefix)
    {
        return store.history_path();
    }
    dir.join(format!("{prefix}saved_history.json"))
}
