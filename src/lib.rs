//! Conversational trip planning engine
//!
//! Turns free-text travel messages into a structured, session-scoped trip
//! context:
//!
//! - message understanding (intent classification and entity extraction)
//!   lives in the `trip-agentic` crate
//! - [`context`] folds extracted facts into the trip context and resolves
//!   conflicts between old and new facts
//! - [`session`] owns session identity and durable, versioned storage
//! - [`engine`] is the facade a transport calls

pub mod assistant;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod provider;
pub mod session;

pub use config::EngineConfig;
pub use engine::{
    ResolutionResult, SearchOutcome, SessionStart, SessionView, TripEngine, TripEngineBuilder,
    TurnResult,
};
pub use error::{Result, TripError};

pub use trip_agentic::{EntityExtractor, IntentClassifier};
pub use trip_types::{
    Conflict, ConversationState, Entity, EntityValue, Intent, IntentType, Message,
    ResolutionStrategy, Session, TripContext,
};
