//! "Last session" pointer
//!
//! The pointer is consulted once, when a client asks to start a chat
//! without forcing a new one. Nothing else reads it: every other operation
//! takes an explicit session id.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait LastSessionCache: Send + Sync {
    async fn get(&self) -> Option<Uuid>;
    async fn set(&self, id: Uuid);
}

#[derive(Default)]
pub struct InMemoryLastSessionCache {
    last: RwLock<Option<Uuid>>,
}

impl InMemoryLastSessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LastSessionCache for InMemoryLastSessionCache {
    async fn get(&self) -> Option<Uuid> {
        *self.last.read().await
    }

    async fn set(&self, id: Uuid) {
        *self.last.write().await = Some(id);
    }
}

/// Pointer kept in a small text file, so a CLI can resume across runs.
/// Read and write failures degrade to "no last session".
pub struct FileLastSessionCache {
    path: PathBuf,
}

impl FileLastSessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LastSessionCache for FileLastSessionCache {
    async fn get(&self) -> Option<Uuid> {
        let text = tokio::fs::read_to_string(&self.path).await.ok()?;
        Uuid::parse_str(text.trim()).ok()
    }

    async fn set(&self, id: Uuid) {
        if let Err(e) = tokio::fs::write(&self.path, id.to_string()).await {
            tracing::warn!(path = %self.path.display(), error = %e, "could not record last session");
        }
    }
}
