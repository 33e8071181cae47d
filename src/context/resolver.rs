//! Conflict Resolver
//!
//! Stateless. Every resolved conflict leaves one entry in
//! `TripContext::conflicts_resolved`, whatever the strategy.
//!
//! `merge` unions destination lists, including a list against a single
//! place. Two single values have no meaningful union, so for scalars `merge`
//! does exactly what `use_new` does.
//!
//! A resolution never leaves the return date before the departure date. When
//! the chosen values would, the latest date conflict is kept at its existing
//! value instead and reported in `Resolution::rejected`.

use std::fmt;

use serde::{Deserialize, Serialize};
use trip_types::context::place_key;
use trip_types::{Conflict, ContextField, FieldValue, ResolutionStrategy, TripContext};

/// A conflict whose chosen value was refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedResolution {
    pub conflict: Conflict,
    pub reason: String,
}

impl fmt::Display for RejectedResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (kept {}: {})",
            self.conflict, self.conflict.existing, self.reason
        )
    }
}

/// Result of one resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub context: TripContext,
    /// Conflicts left at their existing value because the new one was invalid
    pub rejected: Vec<RejectedResolution>,
}

/// Apply `strategy` to every conflict
pub fn resolve(
    context: &TripContext,
    conflicts: &[Conflict],
    strategy: ResolutionStrategy,
) -> Resolution {
    // Some(reason) marks a conflict held at its existing value.
    let mut vetoes: Vec<Option<String>> = vec![None; conflicts.len()];

    let resolved = loop {
        let candidate = apply(context, conflicts, strategy, &vetoes);
        if candidate.dates_in_order() || strategy == ResolutionStrategy::KeepExisting {
            break candidate;
        }
        let latest_date = (0..conflicts.len())
            .rev()
            .find(|&i| vetoes[i].is_none() && is_date(conflicts[i].field()));
        let (Some(index), Some(departure), Some(back)) =
            (latest_date, candidate.departure_date, candidate.return_date)
        else {
            break candidate;
        };
        vetoes[index] = Some(format!(
            "return date {} would be before departure {}",
            back, departure
        ));
    };

    let rejected: Vec<RejectedResolution> = conflicts
        .iter()
        .zip(&vetoes)
        .filter_map(|(conflict, veto)| {
            veto.as_ref().map(|reason| RejectedResolution {
                conflict: conflict.clone(),
                reason: reason.clone(),
            })
        })
        .collect();

    tracing::debug!(
        strategy = %strategy,
        resolved = conflicts.len(),
        rejected = rejected.len(),
        "resolved conflicts"
    );

    Resolution {
        context: resolved,
        rejected,
    }
}

fn apply(
    context: &TripContext,
    conflicts: &[Conflict],
    strategy: ResolutionStrategy,
    vetoes: &[Option<String>],
) -> TripContext {
    let mut context = context.clone();

    for (conflict, veto) in conflicts.iter().zip(vetoes) {
        let description = conflict.description();
        if let Some(reason) = veto {
            context.record_resolution(format!(
                "{} (kept {}: {})",
                description, conflict.existing, reason
            ));
            continue;
        }
        match strategy {
            ResolutionStrategy::KeepExisting => {
                context.record_resolution(format!(
                    "{} (kept {})",
                    description, conflict.existing
                ));
            }
            ResolutionStrategy::UseNew => use_new(&mut context, conflict, &description),
            ResolutionStrategy::Merge => match union(&conflict.existing, &conflict.incoming) {
                Some(merged) => {
                    let note = format!("{} (merged {})", description, merged);
                    context.overwrite(merged, conflict.incoming_confidence, note);
                }
                None => use_new(&mut context, conflict, &description),
            },
        }
    }

    context
}

fn use_new(context: &mut TripContext, conflict: &Conflict, description: &str) {
    let note = format!("{} (used {})", description, conflict.incoming);
    context.overwrite(
        conflict.incoming.clone(),
        conflict.incoming_confidence,
        note,
    );
}

fn is_date(field: ContextField) -> bool {
    matches!(field, ContextField::DepartureDate | ContextField::ReturnDate)
}

/// Union of destination values, existing order first. `None` when neither
/// side is a list.
fn union(existing: &FieldValue, incoming: &FieldValue) -> Option<FieldValue> {
    let places = |value: &FieldValue| -> Option<Vec<String>> {
        match value {
            FieldValue::Destination(name) => Some(vec![name.clone()]),
            FieldValue::Destinations(names) => Some(names.clone()),
            _ => None,
        }
    };
    if !matches!(existing, FieldValue::Destinations(_))
        && !matches!(incoming, FieldValue::Destinations(_))
    {
        return None;
    }

    let mut merged = places(existing)?;
    for place in places(incoming)? {
        if merged.iter().all(|p| place_key(p) != place_key(&place)) {
            merged.push(place);
        }
    }
    Some(FieldValue::Destinations(merged))
}
