//! Intent Classifier
//!
//! Reduces the Pattern Matcher's hits to a single best `Intent`:
//!
//! 1. Every intent type is evaluated, in priority order, with no short-circuit
//! 2. Each firing matcher scores by position: 0.9 at offset 0, 0.75 before the
//!    midpoint, 0.6 after it
//! 3. `add_to_plan` and `book_item` get +0.1, clamped to 1.0
//! 4. A running best is replaced only by a strictly greater score, so the
//!    earlier priority wins ties
//! 5. With no hits, a travel keyword yields `search_flight` at 0.3, anything
//!    else `search_flight` at 0.6
//!
//! Classification never fails; empty and adversarial input take the default.

use regex::Regex;
use serde_json::Value;
use trip_types::{Intent, IntentType};

use crate::config::{ConfigError, PatternConfig};
use crate::matcher::{normalize, PatternMatch, PatternMatcher};

pub const CONFIDENCE_AT_START: f32 = 0.9;
pub const CONFIDENCE_FIRST_HALF: f32 = 0.75;
pub const CONFIDENCE_SECOND_HALF: f32 = 0.6;
pub const PRIORITY_BOOST: f32 = 0.1;
pub const TRAVEL_KEYWORD_CONFIDENCE: f32 = 0.3;
pub const DEFAULT_CONFIDENCE: f32 = 0.6;

/// Intent used when nothing matches
pub const FALLBACK_INTENT: IntentType = IntentType::SearchFlight;

/// Confidence from where a match starts in the normalized message
pub fn positional_confidence(match_index: usize, message_len: usize) -> f32 {
    if match_index == 0 {
        CONFIDENCE_AT_START
    } else if (match_index as f32) < message_len as f32 / 2.0 {
        CONFIDENCE_FIRST_HALF
    } else {
        CONFIDENCE_SECOND_HALF
    }
}

/// Positional confidence plus the priority boost, clamped
pub fn adjusted_confidence(intent: IntentType, positional: f32) -> f32 {
    let boosted = if intent.has_priority_boost() {
        positional + PRIORITY_BOOST
    } else {
        positional
    };
    boosted.min(1.0)
}

/// A scored hit
#[derive(Debug, Clone)]
struct Candidate<'a> {
    hit: &'a PatternMatch,
    confidence: f32,
}

pub struct IntentClassifier {
    matcher: PatternMatcher,
    travel_keywords: Option<Regex>,
}

impl IntentClassifier {
    pub fn new(config: &PatternConfig) -> Result<Self, ConfigError> {
        let matcher = PatternMatcher::from_config(config)?;
        let travel_keywords = compile_keywords(&config.travel_keywords)?;
        Ok(Self {
            matcher,
            travel_keywords,
        })
    }

    /// Classifier over the embedded matcher set
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::new(&PatternConfig::builtin()?)
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Classify a message into exactly one intent
    pub fn classify(&self, message: &str) -> Intent {
        let normalized = normalize(message);
        let message_len = normalized.chars().count();
        let hits = self.matcher.find_matches_normalized(&normalized);

        // Hits arrive in priority order; strict `>` keeps the earlier one.
        let mut best: Option<Candidate<'_>> = None;
        for hit in &hits {
            let positional = positional_confidence(hit.match_index, message_len);
            let confidence = adjusted_confidence(hit.intent_type, positional);
            if best.as_ref().map_or(true, |b| confidence > b.confidence) {
                best = Some(Candidate { hit, confidence });
            }
        }

        let intent = match best {
            Some(Candidate { hit, confidence }) => {
                let mut intent = Intent::new(hit.intent_type, confidence)
                    .with_parameter("matcher", Value::String(hit.matcher_id.clone()));
                for (slot, value) in &hit.captures {
                    intent = intent.with_parameter(slot.clone(), Value::String(value.clone()));
                }
                intent
            }
            None if self.mentions_travel(&normalized) => {
                Intent::new(FALLBACK_INTENT, TRAVEL_KEYWORD_CONFIDENCE)
            }
            None => Intent::new(FALLBACK_INTENT, DEFAULT_CONFIDENCE),
        };

        tracing::debug!(
            intent = %intent.intent_type,
            confidence = intent.confidence,
            hits = hits.len(),
            "classified message"
        );

        intent
    }

    fn mentions_travel(&self, normalized: &str) -> bool {
        self.travel_keywords
            .as_ref()
            .is_some_and(|re| re.is_match(normalized))
    }
}

fn compile_keywords(keywords: &[String]) -> Result<Option<Regex>, ConfigError> {
    let words: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .map(|k| regex::escape(&k))
        .collect();
    if words.is_empty() {
        return Ok(None);
    }

    let pattern = format!(r"(?i)\b(?:{})\b", words.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|source| ConfigError::InvalidPattern {
            intent: FALLBACK_INTENT,
            matcher: "travel_keywords".to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::builtin().unwrap()
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_positional_confidence_bands() {
        assert!(approx(positional_confidence(0, 20), 0.9));
        assert!(approx(positional_confidence(9, 20), 0.75));
        assert!(approx(positional_confidence(10, 20), 0.6));
        assert!(approx(positional_confidence(15, 20), 0.6));
    }

    #[test]
    fn test_boost_applies_to_plan_and_booking_only() {
        assert!(approx(adjusted_confidence(IntentType::BookItem, 0.9), 1.0));
        assert!(approx(adjusted_confidence(IntentType::AddToPlan, 0.6), 0.7));
        assert!(approx(adjusted_confidence(IntentType::ViewPlan, 0.6), 0.6));
    }

    #[test]
    fn test_reference_messages() {
        let c = classifier();
        assert_eq!(
            c.classify("Find flights to Tokyo for 2 people").intent_type,
            IntentType::SearchFlight
        );
        assert_eq!(
            c.classify("What should I do in Tokyo?").intent_type,
            IntentType::GetRecommendations
        );
        assert_eq!(
            c.classify("How much will this cost?").intent_type,
            IntentType::CheckBudget
        );
    }

    #[test]
    fn test_empty_input_takes_default() {
        let intent = classifier().classify("");
        assert_eq!(intent.intent_type, IntentType::SearchFlight);
        assert!(approx(intent.confidence, 0.6));
        assert!(intent.parameters.is_empty());
    }

    #[test]
    fn test_travel_keyword_fallback() {
        let intent = classifier().classify("thinking about a vacation");
        assert_eq!(intent.intent_type, IntentType::SearchFlight);
        assert!(approx(intent.confidence, 0.3));
    }

    #[test]
    fn test_tolerant_save_for_later() {
        let c = classifier();
        let intent = c.classify("Save this for later");
        assert_eq!(intent.intent_type, IntentType::AddToPlan);
        assert!(approx(intent.confidence, 1.0));
        assert_eq!(
            intent.parameters.get("matcher"),
            Some(&Value::String("add_to_plan.save_for_later".into()))
        );
    }

    #[test]
    fn test_tie_goes_to_higher_priority() {
        // Both check_budget and search_hotel fire mid-message at 0.75.
        let intent = classifier().classify("what is the hotel price in rome for our group");
        assert_eq!(intent.intent_type, IntentType::CheckBudget);
        assert!(approx(intent.confidence, 0.75));
    }

    #[test]
    fn test_later_intent_wins_when_strictly_higher() {
        // search_hotel at offset 0 (0.9) beats check_budget late in the message.
        let intent = classifier().classify("hotels near the station within budget");
        assert_eq!(intent.intent_type, IntentType::SearchHotel);
    }

    #[test]
    fn test_slot_captures_become_parameters() {
        let intent = classifier().classify("Flying to Lisbon next week");
        assert_eq!(intent.intent_type, IntentType::SearchFlight);
        assert_eq!(
            intent.parameters.get("destination"),
            Some(&Value::String("lisbon".into()))
        );
    }

    proptest! {
        #[test]
        fn prop_classify_never_leaves_unit_interval(message in "\\PC{0,120}") {
            let intent = classifier().classify(&message);
            prop_assert!((0.0..=1.0).contains(&intent.confidence));
        }

        #[test]
        fn prop_booking_at_start_is_confident(tail in "[a-z ]{0,40}") {
            let intent = classifier().classify(&format!("book {}", tail));
            prop_assert!(intent.intent_type.has_priority_boost());
            prop_assert!(intent.confidence >= 0.9);
        }
    }
}
