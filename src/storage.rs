//! Durable session record that survives restarts.
//!
//! DESIGN
//! ======
//! Storage is a plain key-value style seam (`SessionStorage`) with a JSON
//! file implementation for the CLI and an in-memory one for tests. The
//! session store itself never touches storage: `persist_on_change` subscribes
//! to it and mirrors each settled session to disk. Storage failures are
//! logged and dropped so they can never disturb gating.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::auth::session::{Session, SessionStore, Subscription, Tokens, User};

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session storage I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("stored session is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// =============================================================================
// RECORD
// =============================================================================

/// What gets written to disk: the user and their tokens, nothing transient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub user: User,
    pub tokens: Tokens,
}

impl PersistedSession {
    /// Record for an established session, `None` while loading or signed out.
    #[must_use]
    pub fn from_session(session: &Session) -> Option<Self> {
        if session.is_loading || !session.is_authenticated {
            return None;
        }
        Some(Self { user: session.user.clone()?, tokens: session.tokens.clone()? })
    }
}

/// Persistent home for at most one session record.
pub trait SessionStorage: Send + Sync {
    /// Read the stored record. `Ok(None)` means nothing stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or parsed.
    fn load(&self) -> Result<Option<PersistedSession>, StorageError>;

    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn save(&self, record: &PersistedSession) -> Result<(), StorageError>;

    /// Remove the stored record. Removing nothing succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing record cannot be removed.
    fn remove(&self) -> Result<(), StorageError>;
}

// =============================================================================
// FILE STORAGE
// =============================================================================

/// JSON file on disk.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io { path: self.path.clone(), source }
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<PersistedSession>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, record: &PersistedSession) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&self.path, json).map_err(|e| self.io_error(e))
    }

    fn remove(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

// =============================================================================
// MEMORY STORAGE
// =============================================================================

/// In-process storage; clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<PersistedSession>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_record(record: PersistedSession) -> Self {
        Self { slot: Arc::new(Mutex::new(Some(record))) }
    }

    #[must_use]
    pub fn current(&self) -> Option<PersistedSession> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<PersistedSession>, StorageError> {
        Ok(self.current())
    }

    fn save(&self, record: &PersistedSession) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// =============================================================================
// SYNC
// =============================================================================

/// Mirror every settled session into `storage` until the subscription drops.
///
/// Loading snapshots are skipped; signed-in sessions are saved; anything else
/// removes the stored record.
#[must_use = "dropping the subscription stops persistence"]
pub fn persist_on_change(store: &SessionStore, storage: Arc<dyn SessionStorage>) -> Subscription {
    store.subscribe(move |session| {
        if session.is_loading {
            return;
        }
        let result = match PersistedSession::from_session(session) {
            Some(record) => storage.save(&record),
            None => storage.remove(),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist session");
        }
    })
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
