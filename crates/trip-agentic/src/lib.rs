//! Deterministic message understanding for the trip planner
//!
//! - [`matcher`]: compiled phrase/regex matchers per intent type
//! - [`classifier`]: priority-ordered reduction of matcher hits to one `Intent`
//! - [`extractor`]: destinations, dates, travelers, budgets and preferences
//! - [`config`]: YAML matcher sets and extraction vocabularies
//!
//! Nothing here performs IO beyond optional config file loading, and
//! nothing here can fail on user text.

pub mod classifier;
pub mod config;
pub mod extractor;
pub mod matcher;

pub use classifier::IntentClassifier;
pub use config::{ConfigError, ExtractionVocabulary, PatternConfig};
pub use extractor::EntityExtractor;
pub use matcher::{PatternMatch, PatternMatcher};
