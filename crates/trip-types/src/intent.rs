//! Intent types
//!
//! `IntentType` is a closed set. Its declaration order IS the classifier's
//! priority order - the classifier walks `IntentType::PRIORITY_ORDER` and the
//! first-evaluated type wins confidence ties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The action a user message is asking the assistant to perform
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentType {
    AddToPlan,
    BookItem,
    ModifyPlan,
    ViewPlan,
    CheckBudget,
    GetRecommendations,
    SearchHotel,
    SearchFlight,
}

impl IntentType {
    /// Evaluation order for classification, highest priority first
    pub const PRIORITY_ORDER: [IntentType; 8] = [
        IntentType::AddToPlan,
        IntentType::BookItem,
        IntentType::ModifyPlan,
        IntentType::ViewPlan,
        IntentType::CheckBudget,
        IntentType::GetRecommendations,
        IntentType::SearchHotel,
        IntentType::SearchFlight,
    ];

    /// Intents that receive the +0.1 priority boost
    pub fn has_priority_boost(self) -> bool {
        matches!(self, Self::AddToPlan | Self::BookItem)
    }

    /// Whether this intent asks for travel inventory
    pub fn is_search(self) -> bool {
        matches!(self, Self::SearchFlight | Self::SearchHotel)
    }
}

/// A classified intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    /// Always within [0, 1]
    pub confidence: f32,
    /// Slot captures of the winning matcher, plus its id under `matcher`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Intent {
    /// Create an intent, clamping confidence into [0, 1].
    ///
    /// NaN collapses to 0.0.
    pub fn new(intent_type: IntentType, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            intent_type,
            confidence,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}
