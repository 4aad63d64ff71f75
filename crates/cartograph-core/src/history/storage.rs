//! File-backed saved-history slot guarded by an advisory session lock.
//!
//! Only one editing session may own the slot at a time: [`HistoryStore::lock`]
//! takes a non-blocking exclusive lock on `<dir>/<prefix>session.lock`, and
//! every write is skipped when the lock is not held. A saved history found
//! when the lock is first taken is reported as restorable, and the store
//! refuses to overwrite it until it has been restored or cleared.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{info, warn};

use crate::error::ErrorCode;
use crate::history::{History, PersistError};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("session lock {} is held by another process", path.display())]
    Held { path: PathBuf },
    #[error("session lock I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LockError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Held { .. } => ErrorCode::LockContention,
            Self::Io(_) => ErrorCode::StorageWriteFailed,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl StorageError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Lock(e) => e.code(),
            Self::Io { .. } => ErrorCode::StorageWriteFailed,
            Self::Persist(e) => e.code(),
        }
    }

    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug)]
struct SessionLock {
    file: File,
}

impl SessionLock {
    fn try_acquire(path: &Path) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(LockError::Held {
                path: path.to_path_buf(),
            });
        }
        Ok(Self { file })
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[derive(Debug)]
pub struct HistoryStore {
    dir: PathBuf,
    prefix: String,
    lock: Option<SessionLock>,
    has_restorable: bool,
}

impl HistoryStore {
    /// Open (creating if needed) the store directory. No lock is taken.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(StorageError::io(&dir))?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            lock: None,
            has_restorable: false,
        })
    }

    /// Path of the saved-history file.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.dir.join(format!("{}saved_history.json", self.prefix))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}session.lock", self.prefix))
    }

    /// Try to become the owning session. Returns `Ok(false)` when another
    /// session holds the lock; taking a lock already held here is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Lock`] on I/O failure opening the lock file.
    pub fn lock(&mut self) -> Result<bool, StorageError> {
        if self.lock.is_some() {
            return Ok(true);
        }
        match SessionLock::try_acquire(&self.lock_path()) {
            Ok(lock) => {
                self.lock = Some(lock);
                self.has_restorable = self.history_path().exists();
                Ok(true)
            }
            Err(LockError::Held { path }) => {
                warn!(path = %path.display(), "history session lock is held elsewhere");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn unlock(&mut self) {
        self.lock = None;
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// A saved history existed when the lock was taken and has not been
    /// restored or cleared yet.
    #[must_use]
    pub const fn has_restorable_changes(&self) -> bool {
        self.has_restorable
    }

    /// Write `history` to the slot, or remove the slot when it has no
    /// changes. Returns `false` when the write was skipped because the lock
    /// is not held or a restorable history is pending.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if serialization or the write fails.
    pub fn save(&self, history: &History) -> Result<bool, StorageError> {
        if !self.is_locked() || self.has_restorable {
            return Ok(false);
        }
        let path = self.history_path();
        match history.to_json()? {
            Some(json) => write_atomic(&path, json.as_bytes())?,
            None => remove_if_exists(&path)?,
        }
        Ok(true)
    }

    /// Raw saved JSON, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the file exists but cannot be read.
    pub fn saved_json(&self) -> Result<Option<String>, StorageError> {
        let path = self.history_path();
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path)(e)),
        }
    }

    /// Load the saved history into `history`. Returns `false` when not
    /// locked or nothing was saved.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if reading or parsing fails.
    pub fn restore(&mut self, history: &mut History) -> Result<bool, StorageError> {
        if !self.is_locked() {
            return Ok(false);
        }
        self.has_restorable = false;
        let Some(json) = self.saved_json()? else {
            return Ok(false);
        };
        history.from_json(&json)?;
        info!(path = %self.history_path().display(), "restored history from storage");
        Ok(true)
    }

    /// Delete the saved history.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the file cannot be removed.
    pub fn clear_saved(&mut self) -> Result<(), StorageError> {
        if !self.is_locked() {
            return Ok(());
        }
        self.has_restorable = false;
        remove_if_exists(&self.history_path())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension("json.tmp");
    let mut file = File::create(&tmp).map_err(StorageError::io(&tmp))?;
    file.write_all(bytes).map_err(StorageError::io(&tmp))?;
    file.sync_all().map_err(StorageError::io(&tmp))?;
    fs::rename(&tmp, path).map_err(StorageError::io(path))
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path)(e)),
    }
}
