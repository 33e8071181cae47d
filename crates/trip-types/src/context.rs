//! Trip Context
//!
//! `TripContext` is the cumulative record of what the user has told us about
//! the trip. A known field is never replaced through `set_if_unset`; the only
//! way to replace one is `overwrite`, which demands an audit note and appends
//! it to `conflicts_resolved`.
//!
//! `destination` and `destinations` are one logical fact: at most one of them
//! is set, and writing either clears the other.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Traveler count assumed until the user states one
pub const DEFAULT_TRAVELERS: u32 = 1;

// ============================================================================
// Budget
// ============================================================================

/// Trip budget. `min` is present only for stated ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    pub max: Decimal,
    /// ISO 4217 code, upper case
    pub currency: String,
}

impl Budget {
    pub fn up_to(max: Decimal, currency: impl Into<String>) -> Self {
        Self {
            min: None,
            max,
            currency: currency.into(),
        }
    }

    pub fn range(min: Decimal, max: Decimal, currency: impl Into<String>) -> Self {
        Self {
            min: Some(min),
            max,
            currency: currency.into(),
        }
    }

    /// Value equality: decimal scale and currency case are ignored
    pub fn same_as(&self, other: &Budget) -> bool {
        self.min.map(|m| m.normalize()) == other.min.map(|m| m.normalize())
            && self.max.normalize() == other.max.normalize()
            && self.currency.eq_ignore_ascii_case(&other.currency)
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.min {
            Some(min) => write!(
                f,
                "{} {}-{}",
                self.currency,
                min.normalize(),
                self.max.normalize()
            ),
            None => write!(f, "{} {}", self.currency, self.max.normalize()),
        }
    }
}

// ============================================================================
// Fields and values
// ============================================================================

/// Conflict-tracked context fields
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContextField {
    Destination,
    Destinations,
    DepartureDate,
    ReturnDate,
    Travelers,
    Budget,
}

impl ContextField {
    /// List-valued fields can be unioned by the `merge` strategy
    pub fn is_list(self) -> bool {
        matches!(self, Self::Destinations)
    }

    /// Both destination fields
    pub fn is_destination(self) -> bool {
        matches!(self, Self::Destination | Self::Destinations)
    }
}

/// A value for one context field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Destination(String),
    Destinations(Vec<String>),
    DepartureDate(NaiveDate),
    ReturnDate(NaiveDate),
    Travelers(u32),
    Budget(Budget),
}

impl FieldValue {
    pub fn field(&self) -> ContextField {
        match self {
            Self::Destination(_) => ContextField::Destination,
            Self::Destinations(_) => ContextField::Destinations,
            Self::DepartureDate(_) => ContextField::DepartureDate,
            Self::ReturnDate(_) => ContextField::ReturnDate,
            Self::Travelers(_) => ContextField::Travelers,
            Self::Budget(_) => ContextField::Budget,
        }
    }

    /// Value equality, not textual equality.
    ///
    /// Place names compare case-insensitively and destination lists compare
    /// as sets.
    pub fn same_as(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (Self::Destination(a), Self::Destination(b)) => place_key(a) == place_key(b),
            (Self::Destinations(a), Self::Destinations(b)) => {
                let mut a: Vec<String> = a.iter().map(|p| place_key(p)).collect();
                let mut b: Vec<String> = b.iter().map(|p| place_key(p)).collect();
                a.sort();
                a.dedup();
                b.sort();
                b.dedup();
                a == b
            }
            (Self::Destination(one), Self::Destinations(list))
            | (Self::Destinations(list), Self::Destination(one)) => {
                !list.is_empty() && list.iter().all(|p| place_key(p) == place_key(one))
            }
            (Self::DepartureDate(a), Self::DepartureDate(b)) => a == b,
            (Self::ReturnDate(a), Self::ReturnDate(b)) => a == b,
            (Self::Travelers(a), Self::Travelers(b)) => a == b,
            (Self::Budget(a), Self::Budget(b)) => a.same_as(b),
            _ => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destination(name) => write!(f, "{}", name),
            Self::Destinations(names) => write!(f, "[{}]", names.join(", ")),
            Self::DepartureDate(date) | Self::ReturnDate(date) => write!(f, "{}", date),
            Self::Travelers(count) => write!(f, "{}", count),
            Self::Budget(budget) => write!(f, "{}", budget),
        }
    }
}

/// Normalized comparison key for place names
pub fn place_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ============================================================================
// Conflicts
// ============================================================================

/// A disagreement between a known field and a newly extracted value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub existing: FieldValue,
    pub incoming: FieldValue,
    /// Confidence of the entity that produced `incoming`
    pub incoming_confidence: f32,
}

impl Conflict {
    pub fn field(&self) -> ContextField {
        self.existing.field()
    }

    /// `"<field>: <old> vs <new>"`
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} vs {}", self.field(), self.existing, self.incoming)
    }
}

/// How to reconcile conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep what the context already holds
    #[strum(to_string = "keep_existing", serialize = "keep")]
    KeepExisting,
    /// Replace with the most recently parsed value
    #[strum(to_string = "use_new", serialize = "new")]
    UseNew,
    /// Union list fields; scalars behave like `UseNew`
    Merge,
}

// ============================================================================
// TripContext
// ============================================================================

/// Cumulative, session-scoped trip facts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destinations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<NaiveDate>,
    /// Unset means "not stated"; read through `travelers()`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travelers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(default)]
    pub preferences: Vec<String>,
    /// Audit trail of every overwrite and every kept value
    #[serde(default)]
    pub conflicts_resolved: Vec<String>,
    /// Confidence of the entity that set each known field
    #[serde(default)]
    pub field_confidence: BTreeMap<ContextField, f32>,
    /// Mean of `field_confidence`, 0.0 when nothing is known
    #[serde(default)]
    pub confidence: f32,
}

impl TripContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stated traveler count, or the default of one
    pub fn travelers(&self) -> u32 {
        self.travelers.unwrap_or(DEFAULT_TRAVELERS)
    }

    /// Current value of a field, if known
    pub fn get(&self, field: ContextField) -> Option<FieldValue> {
        match field {
            ContextField::Destination => self.destination.clone().map(FieldValue::Destination),
            ContextField::Destinations => {
                self.destinations.clone().map(FieldValue::Destinations)
            }
            ContextField::DepartureDate => self.departure_date.map(FieldValue::DepartureDate),
            ContextField::ReturnDate => self.return_date.map(FieldValue::ReturnDate),
            ContextField::Travelers => self.travelers.map(FieldValue::Travelers),
            ContextField::Budget => self.budget.clone().map(FieldValue::Budget),
        }
    }

    pub fn is_known(&self, field: ContextField) -> bool {
        self.get(field).is_some()
    }

    /// Value a new entry for `field` is compared against. For either
    /// destination field this is whichever destination form is set.
    pub fn known(&self, field: ContextField) -> Option<FieldValue> {
        if field.is_destination() {
            self.get(ContextField::Destination)
                .or_else(|| self.get(ContextField::Destinations))
        } else {
            self.get(field)
        }
    }

    /// Set a field that is not yet known. Returns false (and changes
    /// nothing) when the field already holds a value; a single destination
    /// and a destination list count as the same field.
    pub fn set_if_unset(&mut self, value: FieldValue, confidence: f32) -> bool {
        if self.known(value.field()).is_some() {
            return false;
        }
        self.write(value, confidence);
        true
    }

    /// Replace a field's value. The audit note is always recorded.
    pub fn overwrite(&mut self, value: FieldValue, confidence: f32, note: impl Into<String>) {
        self.write(value, confidence);
        self.conflicts_resolved.push(note.into());
    }

    /// Record a resolution that did not change any value
    pub fn record_resolution(&mut self, note: impl Into<String>) {
        self.conflicts_resolved.push(note.into());
    }

    /// Add a preference label; duplicates (case-insensitive) are ignored
    pub fn add_preference(&mut self, label: &str) -> bool {
        let key = label.to_lowercase();
        if self.preferences.iter().any(|p| p.to_lowercase() == key) {
            return false;
        }
        self.preferences.push(label.to_string());
        true
    }

    fn write(&mut self, value: FieldValue, confidence: f32) {
        let field = value.field();
        match value {
            FieldValue::Destination(name) => {
                self.destination = Some(name);
                self.destinations = None;
                self.field_confidence.remove(&ContextField::Destinations);
            }
            FieldValue::Destinations(names) => {
                self.destinations = Some(names);
                self.destination = None;
                self.field_confidence.remove(&ContextField::Destination);
            }
            FieldValue::DepartureDate(date) => self.departure_date = Some(date),
            FieldValue::ReturnDate(date) => self.return_date = Some(date),
            FieldValue::Travelers(count) => self.travelers = Some(count),
            FieldValue::Budget(budget) => self.budget = Some(budget),
        }
        self.field_confidence
            .insert(field, confidence.clamp(0.0, 1.0));
        self.recompute_confidence();
    }

    fn recompute_confidence(&mut self) {
        self.confidence = if self.field_confidence.is_empty() {
            0.0
        } else {
            self.field_confidence.values().sum::<f32>() / self.field_confidence.len() as f32
        };
    }

    /// Single destination, or the first of a multi-stop list
    pub fn primary_destination(&self) -> Option<&str> {
        self.destination
            .as_deref()
            .or_else(|| self.destinations.as_ref().and_then(|d| d.first()).map(String::as_str))
    }

    /// False only when both dates are known and the return precedes the
    /// departure
    pub fn dates_in_order(&self) -> bool {
        match (self.departure_date, self.return_date) {
            (Some(departure), Some(back)) => back >= departure,
            _ => true,
        }
    }

    /// Destination plus at least one date: enough for a provider search
    pub fn is_search_ready(&self) -> bool {
        self.primary_destination().is_some()
            && (self.departure_date.is_some() || self.return_date.is_some())
    }

    /// Fields the assistant should still ask about, in asking order
    pub fn missing_fields(&self) -> Vec<ContextField> {
        let mut missing = Vec::new();
        if self.primary_destination().is_none() {
            missing.push(ContextField::Destination);
        }
        if self.departure_date.is_none() {
            missing.push(ContextField::DepartureDate);
        }
        if self.travelers.is_none() {
            missing.push(ContextField::Travelers);
        }
        if self.budget.is_none() {
            missing.push(ContextField::Budget);
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_set_if_unset_never_replaces() {
        let mut ctx = TripContext::new();
        assert!(ctx.set_if_unset(FieldValue::Destination("Paris".into()), 0.9));
        assert!(!ctx.set_if_unset(FieldValue::Destination("Tokyo".into()), 0.9));
        assert_eq!(ctx.destination.as_deref(), Some("Paris"));
        assert!(ctx.conflicts_resolved.is_empty());
    }

    #[test]
    fn test_overwrite_records_note() {
        let mut ctx = TripContext::new();
        ctx.set_if_unset(FieldValue::Travelers(2), 0.9);
        ctx.overwrite(FieldValue::Travelers(4), 0.8, "travelers: 2 vs 4 (used 4)");
        assert_eq!(ctx.travelers(), 4);
        assert_eq!(ctx.conflicts_resolved.len(), 1);
    }

    #[test]
    fn test_travelers_default() {
        let ctx = TripContext::new();
        assert_eq!(ctx.travelers(), DEFAULT_TRAVELERS);
        assert!(!ctx.is_known(ContextField::Travelers));
    }

    #[test]
    fn test_value_equality() {
        assert!(FieldValue::Destination("New  York".into())
            .same_as(&FieldValue::Destination("new york".into())));
        assert!(FieldValue::Destinations(vec!["Rome".into(), "Paris".into()])
            .same_as(&FieldValue::Destinations(vec!["paris".into(), "rome".into()])));
        assert!(!FieldValue::DepartureDate(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
            .same_as(&FieldValue::ReturnDate(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())));
        let a = Budget::up_to(Decimal::new(200000, 2), "usd");
        let b = Budget::up_to(Decimal::from(2000), "USD");
        assert!(a.same_as(&b));
    }

    #[test]
    fn test_conflict_description() {
        let conflict = Conflict {
            existing: FieldValue::Destination("Paris".into()),
            incoming: FieldValue::Destination("Tokyo".into()),
            incoming_confidence: 0.9,
        };
        assert_eq!(conflict.description(), "destination: Paris vs Tokyo");
    }

    #[test]
    fn test_confidence_is_mean_of_fields() {
        let mut ctx = TripContext::new();
        assert_eq!(ctx.confidence, 0.0);
        ctx.set_if_unset(FieldValue::Destination("Lisbon".into()), 0.9);
        ctx.set_if_unset(FieldValue::Travelers(3), 0.7);
        assert!((ctx.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_search_ready() {
        let mut ctx = TripContext::new();
        ctx.set_if_unset(FieldValue::Destination("Lisbon".into()), 0.9);
        assert!(!ctx.is_search_ready());
        ctx.set_if_unset(
            FieldValue::DepartureDate(NaiveDate::from_ymd_opt(2025, 9, 3).unwrap()),
            0.9,
        );
        assert!(ctx.is_search_ready());
    }

    #[test]
    fn test_destination_forms_are_exclusive() {
        let mut ctx = TripContext::new();
        ctx.set_if_unset(
            FieldValue::Destinations(vec!["Rome".into(), "Florence".into()]),
            0.9,
        );
        assert!(!ctx.set_if_unset(FieldValue::Destination("Tokyo".into()), 0.9));
        assert_eq!(
            ctx.known(ContextField::Destination),
            Some(FieldValue::Destinations(vec!["Rome".into(), "Florence".into()]))
        );

        ctx.overwrite(FieldValue::Destination("Tokyo".into()), 0.8, "used Tokyo");
        assert_eq!(ctx.destination.as_deref(), Some("Tokyo"));
        assert!(ctx.destinations.is_none());
        assert_eq!(ctx.primary_destination(), Some("Tokyo"));
        assert!(!ctx.field_confidence.contains_key(&ContextField::Destinations));
        assert!((ctx.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_single_place_list_matches_single_destination() {
        assert!(FieldValue::Destination("Rome".into())
            .same_as(&FieldValue::Destinations(vec!["rome".into()])));
        assert!(!FieldValue::Destination("Rome".into())
            .same_as(&FieldValue::Destinations(vec!["Rome".into(), "Florence".into()])));
    }

    #[test]
    fn test_dates_in_order() {
        let mut ctx = TripContext::new();
        assert!(ctx.dates_in_order());
        ctx.departure_date = NaiveDate::from_ymd_opt(2026, 6, 10);
        ctx.return_date = NaiveDate::from_ymd_opt(2026, 6, 10);
        assert!(ctx.dates_in_order());
        ctx.return_date = NaiveDate::from_ymd_opt(2026, 6, 9);
        assert!(!ctx.dates_in_order());
    }

    #[test]
    fn test_strategy_parse_aliases() {
        assert_eq!(
            ResolutionStrategy::from_str("keep").unwrap(),
            ResolutionStrategy::KeepExisting
        );
        assert_eq!(
            ResolutionStrategy::from_str("use_new").unwrap(),
            ResolutionStrategy::UseNew
        );
        assert_eq!(
            ResolutionStrategy::from_str("merge").unwrap(),
            ResolutionStrategy::Merge
        );
    }
}
