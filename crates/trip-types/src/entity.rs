//! Extracted entities
//!
//! An `Entity` is a typed fact found in a single message. Spans are
//! half-open ranges measured in characters (not bytes) of the source message.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::context::Budget;

/// Entity categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
    Destination,
    Date,
    Budget,
    Travelers,
    Preference,
}

/// Which end of the trip a date refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DateRole {
    Departure,
    Return,
}

/// Typed entity payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityValue {
    Destination { name: String },
    Date { role: DateRole, date: NaiveDate },
    Budget(Budget),
    Travelers { count: u32 },
    Preference { label: String },
}

impl EntityValue {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Destination { .. } => EntityType::Destination,
            Self::Date { .. } => EntityType::Date,
            Self::Budget(_) => EntityType::Budget,
            Self::Travelers { .. } => EntityType::Travelers,
            Self::Preference { .. } => EntityType::Preference,
        }
    }
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destination { name } => write!(f, "{}", name),
            Self::Date { role, date } => write!(f, "{} {}", role, date),
            Self::Budget(budget) => write!(f, "{}", budget),
            Self::Travelers { count } => write!(f, "{}", count),
            Self::Preference { label } => write!(f, "{}", label),
        }
    }
}

/// Half-open character range `[start, end)` into the source message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {} after end {}", start, end);
        Self { start, end }
    }

    /// Build a character span from a byte range of `text`.
    ///
    /// Byte offsets must lie on char boundaries (regex match offsets do).
    pub fn from_byte_range(text: &str, start: usize, end: usize) -> Self {
        let start_chars = text[..start].chars().count();
        let len_chars = text[start..end].chars().count();
        Self::new(start_chars, start_chars + len_chars)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when the span fits inside a message of `char_len` characters
    pub fn fits(&self, char_len: usize) -> bool {
        self.start <= self.end && self.end <= char_len
    }
}

/// A typed, extracted fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(flatten)]
    pub value: EntityValue,
    pub confidence: f32,
    pub span: Span,
}

impl Entity {
    pub fn new(value: EntityValue, confidence: f32, span: Span) -> Self {
        Self {
            value,
            confidence: confidence.clamp(0.0, 1.0),
            span,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.value.entity_type()
    }
}
