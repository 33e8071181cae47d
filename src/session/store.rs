//! Durable session store
//!
//! The store is authoritative: the engine loads a session at the start of a
//! request and writes it back once at the end. Every save carries the
//! version the caller loaded, and a save against a stale version fails with
//! `StoreError::VersionConflict` instead of overwriting a concurrent write.
//! `expected: None` means create-only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use trip_types::Session;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stale write for session {id}: expected version {expected:?}, found {actual:?}")]
    VersionConflict {
        id: Uuid,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("session {0} already exists")]
    AlreadyExists(Uuid),

    #[error("session store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session document is malformed: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session and its version. `None` for unknown ids.
    async fn load(&self, id: Uuid) -> Result<Option<(Session, u64)>, StoreError>;

    /// Write `session`, returning the new version.
    ///
    /// `expected` must equal the stored version; `None` only succeeds when
    /// no session with this id exists yet.
    async fn save(&self, session: &Session, expected: Option<u64>) -> Result<u64, StoreError>;
}

/// Version check shared by the implementations
fn next_version(id: Uuid, stored: Option<u64>, expected: Option<u64>) -> Result<u64, StoreError> {
    match (stored, expected) {
        (None, None) => Ok(1),
        (Some(_), None) => Err(StoreError::AlreadyExists(id)),
        (Some(stored), Some(expected)) if stored == expected => Ok(stored + 1),
        (actual, expected) => Err(StoreError::VersionConflict {
            id,
            expected,
            actual,
        }),
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, (Session, u64)>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: Uuid) -> Result<Option<(Session, u64)>, StoreError> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn save(&self, session: &Session, expected: Option<u64>) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions.get(&session.id).map(|(_, v)| *v);
        let version = next_version(session.id, stored, expected)?;
        sessions.insert(session.id, (session.clone(), version));
        Ok(version)
    }
}

// ============================================================================
// JSON files
// ============================================================================

/// On-disk document: the session plus its version
#[derive(Serialize, Deserialize)]
struct StoredSession {
    version: u64,
    session: Session,
}

/// One `<id>.json` file per session.
///
/// Writes go to a temporary file and are renamed into place, so a reader
/// never observes a half-written session. The version check is serialized
/// within this process.
pub struct JsonFileSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileSessionStore {
    /// Open (and create if needed) a store directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::debug!(dir = %dir.display(), "opened session store");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn read(&self, id: Uuid) -> Result<Option<StoredSession>, StoreError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn load(&self, id: Uuid) -> Result<Option<(Session, u64)>, StoreError> {
        Ok(self.read(id).await?.map(|s| (s.session, s.version)))
    }

    async fn save(&self, session: &Session, expected: Option<u64>) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;

        let stored = self.read(session.id).await?.map(|s| s.version);
        let version = next_version(session.id, stored, expected)?;

        let doc = StoredSession {
            version,
            session: session.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        let tmp = self.dir.join(format!("{}.json.tmp", session.id));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.path_for(session.id)).await?;

        Ok(version)
    }
}
