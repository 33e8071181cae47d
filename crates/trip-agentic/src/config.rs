//! Matcher and vocabulary configuration
//!
//! Both the intent matchers and the extraction vocabulary are YAML documents.
//! Built-in defaults are embedded at compile time; a deployment can replace
//! either with its own file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trip_types::IntentType;

const BUILTIN_PATTERNS: &str = include_str!("../config/intent_patterns.yaml");
const BUILTIN_VOCABULARY: &str = include_str!("../config/extraction.yaml");

/// Default tolerance for the `...` gap token
pub const DEFAULT_MAX_GAP_WORDS: usize = 3;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("matcher '{matcher}' for {intent}: {reason}")]
    InvalidMatcher {
        intent: IntentType,
        matcher: String,
        reason: String,
    },

    #[error("matcher '{matcher}' for {intent} does not compile: {source}")]
    InvalidPattern {
        intent: IntentType,
        matcher: String,
        #[source]
        source: regex::Error,
    },

    #[error("vocabulary entry '{entry}' does not compile: {source}")]
    InvalidVocabulary {
        entry: String,
        #[source]
        source: regex::Error,
    },
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

// ============================================================================
// Intent patterns
// ============================================================================

/// Root of `intent_patterns.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_max_gap_words")]
    pub max_gap_words: usize,
    /// Words that trigger the low-confidence travel fallback
    #[serde(default)]
    pub travel_keywords: Vec<String>,
    pub intents: BTreeMap<IntentType, Vec<MatcherDefinition>>,
}

fn default_max_gap_words() -> usize {
    DEFAULT_MAX_GAP_WORDS
}

/// One matcher: exactly one of `phrase` or `regex`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherDefinition {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub phrase: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
}

impl PatternConfig {
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::load_from_str(BUILTIN_PATTERNS)
    }

    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_from_str(&read_file(path.as_ref())?)
    }

    pub fn with_max_gap_words(mut self, max_gap_words: usize) -> Self {
        self.max_gap_words = max_gap_words;
        self
    }

    /// Matchers for one intent, in declaration order
    pub fn matchers_for(&self, intent: IntentType) -> &[MatcherDefinition] {
        self.intents.get(&intent).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ============================================================================
// Extraction vocabulary
// ============================================================================

/// Root of `extraction.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionVocabulary {
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default)]
    pub destinations: Vec<DestinationEntry>,
    /// Capitalised words never taken as place names
    #[serde(default)]
    pub stopwords: Vec<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, Vec<String>>,
    /// Symbol or word (lower case) to ISO code
    #[serde(default)]
    pub currencies: HashMap<String, String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ExtractionVocabulary {
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::load_from_str(BUILTIN_VOCABULARY)
    }

    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_from_str(&read_file(path.as_ref())?)
    }

    /// Currency code for a symbol or word, case-insensitive
    pub fn currency_for(&self, token: &str) -> Option<&str> {
        self.currencies
            .get(&token.to_lowercase())
            .map(String::as_str)
    }
}
