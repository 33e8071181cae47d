//! Engine errors
//!
//! Only identity and store operations fail. Classification, extraction and
//! merging never do: conflicts and rejected entities come back as data.

use thiserror::Error;
use uuid::Uuid;

use crate::config::SettingError;
use crate::provider::ProviderError;
use crate::session::StoreError;

#[derive(Debug, Error)]
pub enum TripError {
    /// Unknown session id. Callers should offer to start a new session.
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("session {0} is archived")]
    SessionArchived(Uuid),

    #[error("message {message_id} not found in session {session_id}")]
    MessageNotFound { session_id: Uuid, message_id: Uuid },

    #[error("message {0} was already edited or deleted")]
    MessageSuperseded(Uuid),

    #[error("message {0} is not a user message and cannot be changed")]
    MessageNotEditable(Uuid),

    #[error("session {session_id} is being written concurrently; gave up after {attempts} attempts")]
    WriteContention { session_id: Uuid, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Patterns(#[from] trip_agentic::ConfigError),

    #[error(transparent)]
    Setting(#[from] SettingError),
}

impl TripError {
    /// Errors the caller can act on without treating the engine as broken
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SessionNotFound(_)
            | Self::SessionArchived(_)
            | Self::MessageNotFound { .. }
            | Self::MessageSuperseded(_)
            | Self::MessageNotEditable(_)
            | Self::WriteContention { .. }
            | Self::Provider(_) => true,
            Self::Store(_) | Self::Patterns(_) | Self::Setting(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TripError>;
