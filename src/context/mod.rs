//! Trip context tracking and conflict resolution

pub mod resolver;
pub mod tracker;

pub use resolver::{resolve, RejectedResolution, Resolution};
pub use tracker::{ContextTracker, InvalidEntity, MergeOutcome};
