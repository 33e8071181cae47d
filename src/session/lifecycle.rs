//! Session Lifecycle Manager
//!
//! Owns session identity: creation (fresh or resumed), resumption by id, and
//! every write to a session.
//!
//! Writes go through [`SessionLifecycle::update`]:
//! 1. take the per-session async mutex, so sends to one session queue
//! 2. load the session and its version
//! 3. apply the change in memory
//! 4. save against the loaded version, reloading and re-applying on a stale
//!    write up to `max_save_retries` times
//!
//! Nothing is written before step 4, so a cancelled update leaves the stored
//! session exactly as it was.
//!
//! A per-session mutex lives in the lock map only while some update holds or
//! waits for it; the last one out removes the entry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use trip_types::{Message, Session};
use uuid::Uuid;

use super::cache::LastSessionCache;
use super::store::{SessionStore, StoreError};
use crate::config::DEFAULT_MAX_SAVE_RETRIES;
use crate::error::{Result, TripError};

/// Attempts at finding an unused id before giving up
const MAX_ID_ATTEMPTS: u32 = 8;

/// Result of `create_session`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: Uuid,
    /// True when the last-session pointer was reused
    pub resumed: bool,
}

type SessionLocks = Mutex<HashMap<Uuid, Arc<Mutex<()>>>>;

pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    last_session: Arc<dyn LastSessionCache>,
    locks: SessionLocks,
    max_save_retries: u32,
}

impl SessionLifecycle {
    pub fn new(store: Arc<dyn SessionStore>, last_session: Arc<dyn LastSessionCache>) -> Self {
        Self {
            store,
            last_session,
            locks: Mutex::new(HashMap::new()),
            max_save_retries: DEFAULT_MAX_SAVE_RETRIES,
        }
    }

    pub fn with_max_save_retries(mut self, retries: u32) -> Self {
        self.max_save_retries = retries;
        self
    }

    /// Start a chat.
    ///
    /// With `force_new` a fresh id is minted unconditionally and becomes the
    /// last-session pointer. Without it, the pointer is reused when it names
    /// an active session.
    pub async fn create_session(&self, force_new: bool) -> Result<SessionHandle> {
        if !force_new {
            if let Some(id) = self.last_session.get().await {
                match self.store.load(id).await? {
                    Some((session, _)) if session.is_active() => {
                        tracing::debug!(session_id = %id, "resuming last session");
                        return Ok(SessionHandle { id, resumed: true });
                    }
                    _ => tracing::debug!(session_id = %id, "last session unusable, starting fresh"),
                }
            }
        }

        for _ in 0..MAX_ID_ATTEMPTS {
            let session = Session::new(Uuid::new_v4());
            match self.store.save(&session, None).await {
                Ok(_) => {
                    self.last_session.set(session.id).await;
                    tracing::info!(session_id = %session.id, force_new, "created session");
                    return Ok(SessionHandle {
                        id: session.id,
                        resumed: false,
                    });
                }
                // Create-only save refused an id that is already taken.
                Err(StoreError::AlreadyExists(id)) => {
                    tracing::warn!(session_id = %id, "session id collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(TripError::WriteContention {
            session_id: Uuid::nil(),
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Exactly the session named, or `SessionNotFound`. Never creates.
    pub async fn resume_session(&self, id: Uuid) -> Result<Session> {
        self.store
            .load(id)
            .await?
            .map(|(session, _)| session)
            .ok_or(TripError::SessionNotFound(id))
    }

    /// Append to an active session's history
    pub async fn append_message(&self, id: Uuid, message: Message) -> Result<Session> {
        let (session, ()) = self
            .update(id, |session| {
                ensure_active(session)?;
                session.append(message.clone());
                Ok(())
            })
            .await?;
        Ok(session)
    }

    /// Load, apply, save with a version check; see the module docs.
    ///
    /// `apply` may run more than once and must derive everything it writes
    /// from the session it is given.
    pub async fn update<T, F>(&self, id: Uuid, mut apply: F) -> Result<(Session, T)>
    where
        F: FnMut(&mut Session) -> Result<T> + Send,
        T: Send,
    {
        let _guard = self.lock_for(id).await;

        let attempts = self.max_save_retries + 1;
        for attempt in 1..=attempts {
            let (mut session, version) = self
                .store
                .load(id)
                .await?
                .ok_or(TripError::SessionNotFound(id))?;

            let out = apply(&mut session)?;

            match self.store.save(&session, Some(version)).await {
                Ok(_) => return Ok((session, out)),
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::warn!(session_id = %id, attempt, "stale session write, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(TripError::WriteContention {
            session_id: id,
            attempts,
        })
    }

    async fn lock_for(&self, id: Uuid) -> SessionGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(id).or_default().clone()
        };
        let mut guard = SessionGuard {
            locks: &self.locks,
            id,
            lock: lock.clone(),
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }
}

/// Holds one session's mutex and drops its lock-map entry when no other
/// update is holding or waiting for it. Runs on cancellation too.
struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    id: Uuid,
    lock: Arc<Mutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        // Clones are only made under the map lock, so the count is stable
        // while it is held. If the map is busy the next update cleans up.
        if let Ok(mut locks) = self.locks.try_lock() {
            // One reference in the map, one here.
            if Arc::strong_count(&self.lock) == 2 {
                locks.remove(&self.id);
            }
        }
    }
}

/// Refuse writes to archived sessions
pub fn ensure_active(session: &Session) -> Result<()> {
    if session.is_active() {
        Ok(())
    } else {
        Err(TripError::SessionArchived(session.id))
    }
}
