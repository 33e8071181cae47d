//! Session and message types
//!
//! Messages are append-only. An edit or delete never rewrites history: it
//! appends a new message whose `status` is terminal and whose `supersedes`
//! points at the original. `Session::visible_messages` folds that history
//! into what a client should render.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::context::{Conflict, TripContext};
use crate::conversation::ConversationState;
use crate::entity::Entity;
use crate::intent::Intent;

// ============================================================================
// Messages
// ============================================================================

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Lifecycle of a message entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Active,
    /// Replacement content for the message named in `supersedes`
    Edited,
    /// Tombstone for the message named in `supersedes`
    Deleted,
}

/// Analysis attached to a processed user message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<String>>,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<Uuid>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            status: MessageStatus::Active,
            supersedes: None,
            metadata: MessageMetadata::default(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replacement entry for `original`, keeping its role
    pub fn edit_of(original: &Message, content: impl Into<String>) -> Self {
        let mut msg = Self::new(original.role, content);
        msg.status = MessageStatus::Edited;
        msg.supersedes = Some(original.id);
        msg
    }

    /// Tombstone entry for `original`
    pub fn deletion_of(original: &Message) -> Self {
        let mut msg = Self::new(original.role, String::new());
        msg.status = MessageStatus::Deleted;
        msg.supersedes = Some(original.id);
        msg
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Archived,
}

/// The durable conversation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    pub messages: Vec<Message>,
    pub context: TripContext,
    pub state: ConversationState,
    /// Conflicts detected by the last merges and not yet resolved
    #[serde(default)]
    pub pending_conflicts: Vec<Conflict>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: SessionStatus::Active,
            messages: Vec::new(),
            context: TripContext::default(),
            state: ConversationState::Greeting,
            pending_conflicts: Vec::new(),
            created_at: now,
            updated_at: now,
            last_activity_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Append a message and bump activity timestamps
    pub fn append(&mut self, message: Message) {
        let now = Utc::now();
        self.messages.push(message);
        self.updated_at = now;
        self.last_activity_at = now;
    }

    pub fn find_message(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// True when a later entry edits or deletes `id`
    pub fn is_superseded(&self, id: Uuid) -> bool {
        self.messages.iter().any(|m| m.supersedes == Some(id))
    }

    /// Messages a client should render: superseded entries and tombstones
    /// are hidden, edits stand in place of what they replaced.
    pub fn visible_messages(&self) -> Vec<&Message> {
        let superseded: HashSet<Uuid> = self.messages.iter().filter_map(|m| m.supersedes).collect();
        self.messages
            .iter()
            .filter(|m| m.status != MessageStatus::Deleted && !superseded.contains(&m.id))
            .collect()
    }

    /// Replace pending conflicts for the same fields, keep the others
    pub fn queue_conflicts(&mut self, conflicts: &[Conflict]) {
        for conflict in conflicts {
            self.pending_conflicts
                .retain(|pending| pending.field() != conflict.field());
            self.pending_conflicts.push(conflict.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FieldValue;

    #[test]
    fn test_edit_and_delete_keep_history() {
        let mut session = Session::new(Uuid::new_v4());
        let first = Message::user("Trip to Rome");
        let second = Message::user("For 2 people");
        session.append(first.clone());
        session.append(second.clone());

        session.append(Message::edit_of(&first, "Trip to Milan"));
        session.append(Message::deletion_of(&second));

        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.messages[0].content, "Trip to Rome");

        let visible: Vec<&str> = session
            .visible_messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(visible, vec!["Trip to Milan"]);
        assert!(session.is_superseded(first.id));
    }

    #[test]
    fn test_queue_conflicts_replaces_same_field() {
        let mut session = Session::new(Uuid::new_v4());
        let conflict = |new: &str| Conflict {
            existing: FieldValue::Destination("Paris".into()),
            incoming: FieldValue::Destination(new.into()),
            incoming_confidence: 0.9,
        };
        session.queue_conflicts(&[conflict("Tokyo")]);
        session.queue_conflicts(&[conflict("Osaka")]);
        assert_eq!(session.pending_conflicts.len(), 1);
        assert_eq!(
            session.pending_conflicts[0].description(),
            "destination: Paris vs Osaka"
        );
    }
}
