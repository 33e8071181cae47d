//! Shared Domain Types for the Trip Planner
//!
//! This crate is the single source of truth for the values that cross the
//! classifier, the context tracker and the session layer.
//!
//! ## Layout
//!
//! ```text
//! intent        IntentType (closed set, priority ordered) + Intent
//! entity        Entity / EntityValue with character spans
//! context       TripContext, FieldValue, Conflict, ResolutionStrategy
//! conversation  ConversationState machine
//! session       Session, Message, MessageMetadata
//! ```
//!
//! No IO lives here. Everything is `Serialize + Deserialize` so the durable
//! store can persist a `Session` as a single JSON document.

pub mod context;
pub mod conversation;
pub mod entity;
pub mod intent;
pub mod session;

pub use context::{
    Budget, Conflict, ContextField, FieldValue, ResolutionStrategy, TripContext,
    DEFAULT_TRAVELERS,
};
pub use conversation::ConversationState;
pub use entity::{DateRole, Entity, EntityType, EntityValue, Span};
pub use intent::{Intent, IntentType};
pub use session::{Message, MessageMetadata, MessageRole, MessageStatus, Session, SessionStatus};
