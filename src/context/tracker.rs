//! Trip Context Tracker
//!
//! Folds a message's entities into the session's `TripContext`:
//! - unset field: set directly
//! - set field, equal value: no-op
//! - set field, different value: a `Conflict` is returned and the field is
//!   left alone until the Conflict Resolver runs
//!
//! A single destination and a destination list are compared against each
//! other, so changing a multi-stop trip to one place is a conflict too.
//!
//! Values that break a domain constraint are rejected as `InvalidEntity` and
//! never reach the context. Applying the same entities twice is a no-op the
//! second time.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use trip_types::context::place_key;
use trip_types::{Conflict, DateRole, Entity, EntityValue, FieldValue, TripContext};

use crate::config::DEFAULT_MAX_TRAVELERS;

/// An extracted value that failed a domain constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidEntity {
    pub entity: Entity,
    pub reason: String,
}

impl fmt::Display for InvalidEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.entity.value, self.reason)
    }
}

/// Result of one merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Context with every non-conflicting value applied
    pub context: TripContext,
    /// Fields whose known value differs from the incoming one
    pub conflicts: Vec<Conflict>,
    pub rejected: Vec<InvalidEntity>,
}

impl MergeOutcome {
    /// `"<field>: <old> vs <new>"` for every conflict
    pub fn conflict_descriptions(&self) -> Vec<String> {
        self.conflicts.iter().map(Conflict::description).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ContextTracker {
    max_travelers: u32,
}

impl Default for ContextTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRAVELERS)
    }
}

impl ContextTracker {
    pub fn new(max_travelers: u32) -> Self {
        Self { max_travelers }
    }

    /// Merge `entities` into a copy of `context`
    pub fn merge(&self, context: &TripContext, entities: &[Entity]) -> MergeOutcome {
        let mut context = context.clone();
        let mut conflicts = Vec::new();
        let mut rejected = Vec::new();

        let mut candidates: Vec<(FieldValue, f32)> = Vec::new();
        if let Some(candidate) = destination_candidate(entities) {
            candidates.push(candidate);
        }

        let departure = dated(entities, DateRole::Departure);
        let ret = dated(entities, DateRole::Return);
        let effective_departure = departure.map(|(d, _)| d).or(context.departure_date);
        let effective_return = ret.map(|(d, _)| d).or(context.return_date);

        // Blame whichever side this message supplied, the return date first.
        let blamed = ret.or(departure).map(|(_, entity)| entity);
        if let (Some(dep), Some(back), Some(entity)) = (effective_departure, effective_return, blamed) {
            if back < dep {
                let reason = if ret.is_some() {
                    format!("return date {} is before departure {}", back, dep)
                } else {
                    format!("departure date {} is after return {}", dep, back)
                };
                rejected.push(InvalidEntity {
                    entity: entity.clone(),
                    reason,
                });
            }
        }

        for (role, slot) in [(DateRole::Departure, departure), (DateRole::Return, ret)] {
            let Some((date, entity)) = slot else {
                continue;
            };
            if rejected.iter().any(|r| r.entity == *entity) {
                continue;
            }
            let value = match role {
                DateRole::Departure => FieldValue::DepartureDate(date),
                DateRole::Return => FieldValue::ReturnDate(date),
            };
            candidates.push((value, entity.confidence));
        }

        for entity in entities {
            match &entity.value {
                EntityValue::Travelers { count } => {
                    if *count == 0 || *count > self.max_travelers {
                        rejected.push(InvalidEntity {
                            entity: entity.clone(),
                            reason: format!(
                                "traveler count must be between 1 and {}",
                                self.max_travelers
                            ),
                        });
                    } else {
                        candidates.push((FieldValue::Travelers(*count), entity.confidence));
                    }
                }
                EntityValue::Budget(budget) => {
                    let reason = if budget.max.is_sign_negative() || budget.max.is_zero() {
                        Some("budget must be positive".to_string())
                    } else if budget.min.is_some_and(|min| min > budget.max) {
                        Some("budget minimum exceeds maximum".to_string())
                    } else {
                        None
                    };
                    match reason {
                        Some(reason) => rejected.push(InvalidEntity {
                            entity: entity.clone(),
                            reason,
                        }),
                        None => candidates.push((FieldValue::Budget(budget.clone()), entity.confidence)),
                    }
                }
                EntityValue::Preference { label } => {
                    context.add_preference(label);
                }
                EntityValue::Destination { .. } | EntityValue::Date { .. } => {}
            }
        }

        for (value, confidence) in candidates {
            match context.known(value.field()) {
                None => {
                    context.set_if_unset(value, confidence);
                }
                Some(existing) if existing.same_as(&value) => {}
                Some(existing) => conflicts.push(Conflict {
                    existing,
                    incoming: value,
                    incoming_confidence: confidence,
                }),
            }
        }

        if !conflicts.is_empty() || !rejected.is_empty() {
            tracing::debug!(
                conflicts = conflicts.len(),
                rejected = rejected.len(),
                "merge left fields unchanged"
            );
        }

        MergeOutcome {
            context,
            conflicts,
            rejected,
        }
    }
}

/// One place sets `destination`; several set `destinations`
fn destination_candidate(entities: &[Entity]) -> Option<(FieldValue, f32)> {
    let mut names: Vec<String> = Vec::new();
    let mut confidence = 1.0_f32;
    for entity in entities {
        if let EntityValue::Destination { name } = &entity.value {
            if names.iter().all(|n| place_key(n) != place_key(name)) {
                names.push(name.clone());
                confidence = confidence.min(entity.confidence);
            }
        }
    }

    match names.len() {
        0 => None,
        1 => Some((FieldValue::Destination(names.remove(0)), confidence)),
        _ => Some((FieldValue::Destinations(names), confidence)),
    }
}

/// First date entity with `role`
fn dated(entities: &[Entity], role: DateRole) -> Option<(NaiveDate, &Entity)> {
    entities.iter().find_map(|e| match &e.value {
        EntityValue::Date { role: r, date } if *r == role => Some((*date, e)),
        _ => None,
    })
}
