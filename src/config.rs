//! Engine configuration
//!
//! Defaults, overridden by environment variables:
//!
//! | Variable                   | Meaning                                   | Default  |
//! |----------------------------|-------------------------------------------|----------|
//! | `TRIP_PATTERNS_PATH`       | intent matcher YAML                       | embedded |
//! | `TRIP_VOCABULARY_PATH`     | extraction vocabulary YAML                | embedded |
//! | `TRIP_MAX_GAP_WORDS`       | words a `...` gap may skip                | from YAML|
//! | `TRIP_MAX_TRAVELERS`       | largest accepted party size               | 20       |
//! | `TRIP_MAX_SAVE_RETRIES`    | reloads after a stale write               | 3        |
//! | `TRIP_PROVIDER_TIMEOUT_MS` | travel data provider timeout              | 10000    |
//! | `TRIP_STORE_DIR`           | directory for the JSON session store      | memory   |
//!
//! Binaries load `.env` with `dotenvy` before calling [`EngineConfig::from_env`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use trip_agentic::{ConfigError, ExtractionVocabulary, PatternConfig};

pub const DEFAULT_MAX_TRAVELERS: u32 = 20;
pub const DEFAULT_MAX_SAVE_RETRIES: u32 = 3;
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct SettingError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub patterns_path: Option<PathBuf>,
    pub vocabulary_path: Option<PathBuf>,
    /// Overrides `max_gap_words` from the matcher YAML
    pub max_gap_words: Option<usize>,
    pub max_travelers: u32,
    pub max_save_retries: u32,
    pub provider_timeout: Duration,
    /// JSON file store location; `None` keeps sessions in memory
    pub store_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            patterns_path: None,
            vocabulary_path: None,
            max_gap_words: None,
            max_travelers: DEFAULT_MAX_TRAVELERS,
            max_save_retries: DEFAULT_MAX_SAVE_RETRIES,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            store_dir: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TRIP_*` environment variables
    pub fn from_env() -> Result<Self, SettingError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an explicit variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingError> {
        let mut config = Self::default();

        if let Some(path) = lookup("TRIP_PATTERNS_PATH") {
            config.patterns_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("TRIP_VOCABULARY_PATH") {
            config.vocabulary_path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup("TRIP_MAX_GAP_WORDS") {
            config.max_gap_words = Some(parse_setting("TRIP_MAX_GAP_WORDS", &value)?);
        }
        if let Some(value) = lookup("TRIP_MAX_TRAVELERS") {
            config.max_travelers = parse_setting("TRIP_MAX_TRAVELERS", &value)?;
            if config.max_travelers == 0 {
                return Err(SettingError {
                    key: "TRIP_MAX_TRAVELERS".into(),
                    value,
                    reason: "must be at least 1".into(),
                });
            }
        }
        if let Some(value) = lookup("TRIP_MAX_SAVE_RETRIES") {
            config.max_save_retries = parse_setting("TRIP_MAX_SAVE_RETRIES", &value)?;
        }
        if let Some(value) = lookup("TRIP_PROVIDER_TIMEOUT_MS") {
            let millis: u64 = parse_setting("TRIP_PROVIDER_TIMEOUT_MS", &value)?;
            config.provider_timeout = Duration::from_millis(millis);
        }
        if let Some(dir) = lookup("TRIP_STORE_DIR") {
            config.store_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Matcher set from `patterns_path` or the embedded default
    pub fn load_patterns(&self) -> Result<PatternConfig, ConfigError> {
        let config = match &self.patterns_path {
            Some(path) => PatternConfig::load_from_file(path)?,
            None => PatternConfig::builtin()?,
        };
        Ok(match self.max_gap_words {
            Some(gap) => config.with_max_gap_words(gap),
            None => config,
        })
    }

    /// Vocabulary from `vocabulary_path` or the embedded default
    pub fn load_vocabulary(&self) -> Result<ExtractionVocabulary, ConfigError> {
        match &self.vocabulary_path {
            Some(path) => ExtractionVocabulary::load_from_file(path),
            None => ExtractionVocabulary::builtin(),
        }
    }
}

fn parse_setting<T>(key: &str, value: &str) -> Result<T, SettingError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| SettingError {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_travelers, DEFAULT_MAX_TRAVELERS);
        assert_eq!(config.provider_timeout, DEFAULT_PROVIDER_TIMEOUT);
        assert!(config.store_dir.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("TRIP_MAX_GAP_WORDS", "1"),
            ("TRIP_PROVIDER_TIMEOUT_MS", "250"),
            ("TRIP_STORE_DIR", "/tmp/trips"),
        ]))
        .unwrap();
        assert_eq!(config.provider_timeout, Duration::from_millis(250));
        assert_eq!(config.store_dir, Some(PathBuf::from("/tmp/trips")));
        assert_eq!(config.load_patterns().unwrap().max_gap_words, 1);
    }

    #[test]
    fn test_bad_values_are_reported() {
        let err = EngineConfig::from_lookup(lookup(&[("TRIP_MAX_SAVE_RETRIES", "lots")]))
            .unwrap_err();
        assert_eq!(err.key, "TRIP_MAX_SAVE_RETRIES");

        let err =
            EngineConfig::from_lookup(lookup(&[("TRIP_MAX_TRAVELERS", "0")])).unwrap_err();
        assert_eq!(err.reason, "must be at least 1");
    }
}
