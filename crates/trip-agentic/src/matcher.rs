//! Pattern Matcher
//!
//! Holds, per intent type, an ordered list of compiled matchers and reports
//! every matcher that fires on a message. Matching runs on a normalized
//! (trimmed, lower-cased) copy; `match_index` is a character offset into that
//! copy.
//!
//! Phrases compile to regexes. Words are joined by flexible whitespace, and
//! the `...` gap token admits a bounded number of interposed words, so
//! `save ... for later` matches "save this for later" as well as
//! "save for later".

use std::collections::BTreeMap;

use regex::Regex;
use trip_types::IntentType;

use crate::config::{ConfigError, MatcherDefinition, PatternConfig};

/// One firing matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub intent_type: IntentType,
    pub matcher_id: String,
    /// Character offset of the match start in the normalized message
    pub match_index: usize,
    /// Named slot captures, lower-cased
    pub captures: BTreeMap<String, String>,
}

/// A compiled matcher
#[derive(Debug, Clone)]
struct CompiledMatcher {
    id: String,
    regex: Regex,
    slot_names: Vec<String>,
}

/// Trim and lower-case a message
pub fn normalize(message: &str) -> String {
    message.trim().to_lowercase()
}

/// Pure, reusable matcher set
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    matchers: Vec<(IntentType, Vec<CompiledMatcher>)>,
}

impl PatternMatcher {
    /// Compile every matcher in `config`. Intent types are stored in
    /// priority order regardless of their order in the file.
    pub fn from_config(config: &PatternConfig) -> Result<Self, ConfigError> {
        let mut matchers = Vec::with_capacity(IntentType::PRIORITY_ORDER.len());

        for intent in IntentType::PRIORITY_ORDER {
            let compiled = config
                .matchers_for(intent)
                .iter()
                .enumerate()
                .map(|(index, def)| compile_matcher(intent, index, def, config.max_gap_words))
                .collect::<Result<Vec<_>, _>>()?;
            matchers.push((intent, compiled));
        }

        let matcher = Self { matchers };
        tracing::debug!(matchers = matcher.total_matchers(), "compiled intent matchers");

        Ok(matcher)
    }

    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_config(&PatternConfig::builtin()?)
    }

    /// Every firing matcher, in priority order then declaration order
    pub fn find_matches(&self, message: &str) -> Vec<PatternMatch> {
        self.find_matches_normalized(&normalize(message))
    }

    /// As `find_matches`, for a message that is already normalized
    pub fn find_matches_normalized(&self, normalized: &str) -> Vec<PatternMatch> {
        let mut hits = Vec::new();

        for (intent, compiled) in &self.matchers {
            for matcher in compiled {
                let Some(caps) = matcher.regex.captures(normalized) else {
                    continue;
                };
                let Some(whole) = caps.get(0) else {
                    continue;
                };

                let captures = matcher
                    .slot_names
                    .iter()
                    .filter_map(|name| {
                        caps.name(name)
                            .map(|m| (name.clone(), m.as_str().to_string()))
                    })
                    .collect();

                hits.push(PatternMatch {
                    intent_type: *intent,
                    matcher_id: matcher.id.clone(),
                    match_index: normalized[..whole.start()].chars().count(),
                    captures,
                });
            }
        }

        hits
    }

    /// Number of matchers registered for an intent
    pub fn matcher_count(&self, intent: IntentType) -> usize {
        self.matchers
            .iter()
            .find(|(t, _)| *t == intent)
            .map(|(_, m)| m.len())
            .unwrap_or(0)
    }

    /// Number of matchers across every intent
    pub fn total_matchers(&self) -> usize {
        self.matchers.iter().map(|(_, m)| m.len()).sum()
    }
}

// ============================================================================
// Compilation
// ============================================================================

fn compile_matcher(
    intent: IntentType,
    index: usize,
    def: &MatcherDefinition,
    max_gap_words: usize,
) -> Result<CompiledMatcher, ConfigError> {
    let id = def
        .id
        .clone()
        .unwrap_or_else(|| format!("{}.{}", intent, index));

    let (pattern, slot_names) = match (&def.phrase, &def.regex) {
        (Some(phrase), None) => compile_phrase(phrase, max_gap_words),
        (None, Some(raw)) => (format!("(?i){}", raw), Vec::new()),
        _ => {
            return Err(ConfigError::InvalidMatcher {
                intent,
                matcher: id,
                reason: "exactly one of `phrase` or `regex` is required".to_string(),
            })
        }
    };

    if pattern.is_empty() {
        return Err(ConfigError::InvalidMatcher {
            intent,
            matcher: id,
            reason: "phrase has no words".to_string(),
        });
    }

    let regex = Regex::new(&pattern).map_err(|source| ConfigError::InvalidPattern {
        intent,
        matcher: id.clone(),
        source,
    })?;

    Ok(CompiledMatcher {
        id,
        regex,
        slot_names,
    })
}

enum Token {
    Gap,
    Slot(String),
    Word { alternatives: Vec<String>, optional: bool },
}

fn tokenize(phrase: &str) -> Vec<Token> {
    phrase
        .split_whitespace()
        .map(|raw| {
            if raw == "..." {
                Token::Gap
            } else if let Some(name) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
                Token::Slot(name.to_string())
            } else {
                let (body, optional) = match raw.strip_suffix('?') {
                    Some(body) if !body.is_empty() => (body, true),
                    _ => (raw, false),
                };
                Token::Word {
                    alternatives: body
                        .split('|')
                        .filter(|a| !a.is_empty())
                        .map(str::to_lowercase)
                        .collect(),
                    optional,
                }
            }
        })
        .collect()
}

/// Compile a phrase into a regex pattern and its slot names.
///
/// The first word is never optional; an optional word absorbed by a
/// preceding gap keeps the gap open for the next word.
fn compile_phrase(phrase: &str, max_gap_words: usize) -> (String, Vec<String>) {
    let tokens = tokenize(phrase);
    let gap_sep = format!(r"(?:\s+\S+){{0,{}}}\s+", max_gap_words);
    let last_emitted = tokens.iter().rposition(|t| !matches!(t, Token::Gap));

    let mut body = String::new();
    let mut slot_names = Vec::new();
    let mut pending_gap = false;
    let mut first = true;

    for (position, token) in tokens.iter().enumerate() {
        let (piece, optional) = match token {
            Token::Gap => {
                pending_gap = true;
                continue;
            }
            Token::Slot(name) => {
                slot_names.push(name.clone());
                (format!(r"(?P<{}>[^\s.,!?;]+)", name), false)
            }
            Token::Word {
                alternatives,
                optional,
            } => {
                if alternatives.is_empty() {
                    continue;
                }
                let escaped: Vec<String> = alternatives.iter().map(|a| regex::escape(a)).collect();
                let mut piece = format!("(?:{})", escaped.join("|"));
                if Some(position) == last_emitted {
                    piece.push_str(r"\b");
                }
                (piece, *optional)
            }
        };

        if first {
            body.push_str(&piece);
            first = false;
            continue;
        }

        let sep = if pending_gap { gap_sep.as_str() } else { r"\s+" };
        if optional {
            body.push_str(&format!("(?:{}{})?", sep, piece));
        } else {
            body.push_str(sep);
            body.push_str(&piece);
            pending_gap = false;
        }
    }

    if body.is_empty() {
        return (String::new(), slot_names);
    }
    (format!(r"(?i)\b{}", body), slot_names)
}
