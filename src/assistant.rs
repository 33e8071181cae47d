//! Assistant-side text: suggestions and turn replies.
//!
//! Suggestions are typed so a client can render buttons for conflict
//! resolution; `Display` gives the plain prompt for text clients.

use std::fmt;

use serde::{Deserialize, Serialize};
use trip_types::{
    Conflict, ContextField, ConversationState, FieldValue, Intent, IntentType,
    ResolutionStrategy, TripContext,
};

use crate::context::{InvalidEntity, RejectedResolution};

/// Missing-field prompts offered per turn
const MAX_DETAIL_PROMPTS: usize = 2;

// ---------------------------------------------------------------------------
// Suggestion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Suggestion {
    /// A field needs a keep/replace/merge decision
    ResolveConflict {
        field: ContextField,
        description: String,
        options: Vec<ResolutionStrategy>,
    },
    /// A value was rejected and left unset
    InvalidValue { message: String },
    /// A field the trip still needs
    ProvideDetail { field: ContextField, prompt: String },
    /// Enough is known to search
    StartSearch { prompt: String },
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolveConflict {
                description,
                options,
                ..
            } => {
                let options: Vec<String> = options.iter().map(|o| o.to_string()).collect();
                write!(f, "Conflict on {}. Choose {}.", description, options.join(", "))
            }
            Self::InvalidValue { message } => write!(f, "{}", message),
            Self::ProvideDetail { prompt, .. } | Self::StartSearch { prompt } => {
                write!(f, "{}", prompt)
            }
        }
    }
}

/// Suggestions for one turn, most urgent first
pub fn suggestions_for(
    context: &TripContext,
    conflicts: &[Conflict],
    rejected: &[InvalidEntity],
) -> Vec<Suggestion> {
    let mut out: Vec<Suggestion> = conflicts
        .iter()
        .map(|conflict| Suggestion::ResolveConflict {
            field: conflict.field(),
            description: conflict.description(),
            options: strategies_for(conflict),
        })
        .collect();

    out.extend(rejected.iter().map(|invalid| Suggestion::InvalidValue {
        message: format!("I couldn't use \"{}\": {}.", invalid.entity.value, invalid.reason),
    }));

    if context.is_search_ready() {
        out.push(Suggestion::StartSearch {
            prompt: format!(
                "I have enough to search for {}. Shall I look for options?",
                context.primary_destination().unwrap_or("your trip")
            ),
        });
    }

    out.extend(
        context
            .missing_fields()
            .into_iter()
            .take(MAX_DETAIL_PROMPTS)
            .map(|field| Suggestion::ProvideDetail {
                field,
                prompt: detail_prompt(field).to_string(),
            }),
    );

    out
}

/// Resolutions the engine refused, as prompts
pub fn resolution_suggestions(rejected: &[RejectedResolution]) -> Vec<Suggestion> {
    rejected
        .iter()
        .map(|r| Suggestion::InvalidValue {
            message: format!(
                "I kept {} for {}: {}.",
                r.conflict.existing,
                r.conflict.field(),
                r.reason
            ),
        })
        .collect()
}

/// `merge` is offered whenever a destination list is involved
fn strategies_for(conflict: &Conflict) -> Vec<ResolutionStrategy> {
    let list = |value: &FieldValue| value.field().is_list();
    if list(&conflict.existing) || list(&conflict.incoming) {
        vec![
            ResolutionStrategy::KeepExisting,
            ResolutionStrategy::UseNew,
            ResolutionStrategy::Merge,
        ]
    } else {
        vec![ResolutionStrategy::KeepExisting, ResolutionStrategy::UseNew]
    }
}

fn detail_prompt(field: ContextField) -> &'static str {
    match field {
        ContextField::Destination | ContextField::Destinations => "Where would you like to go?",
        ContextField::DepartureDate => "When would you like to leave?",
        ContextField::ReturnDate => "When are you coming back?",
        ContextField::Travelers => "How many people are travelling?",
        ContextField::Budget => "Do you have a budget in mind?",
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// One-line summary of what is known about the trip
pub fn trip_summary(context: &TripContext) -> String {
    let mut parts = Vec::new();
    match (&context.destination, &context.destinations) {
        (Some(place), _) => parts.push(format!("to {}", place)),
        (None, Some(stops)) => parts.push(format!("to {}", stops.join(", "))),
        (None, None) => {}
    }
    match (context.departure_date, context.return_date) {
        (Some(out), Some(back)) => parts.push(format!("from {} to {}", out, back)),
        (Some(out), None) => parts.push(format!("leaving {}", out)),
        (None, Some(back)) => parts.push(format!("returning {}", back)),
        (None, None) => {}
    }
    if let Some(count) = context.travelers {
        let noun = if count == 1 { "traveler" } else { "travelers" };
        parts.push(format!("for {} {}", count, noun));
    }
    if let Some(budget) = &context.budget {
        parts.push(format!("budget {}", budget));
    }
    if !context.preferences.is_empty() {
        parts.push(format!("({})", context.preferences.join(", ")));
    }

    if parts.is_empty() {
        "No trip details yet.".to_string()
    } else {
        format!("Trip {}.", parts.join(" "))
    }
}

/// Assistant reply for a processed user message
pub fn compose_reply(
    intent: &Intent,
    state: ConversationState,
    context: &TripContext,
    conflicts: &[Conflict],
) -> String {
    if !conflicts.is_empty() {
        let described: Vec<String> = conflicts.iter().map(Conflict::description).collect();
        return format!(
            "That changes something you told me earlier ({}). Should I keep the original or use the new value?",
            described.join("; ")
        );
    }

    let place = context.primary_destination();
    match state {
        ConversationState::Greeting => {
            "Hi! Where would you like to travel?".to_string()
        }
        ConversationState::GatheringRequirements => match context.missing_fields().first() {
            Some(field) => format!("Got it. {}", detail_prompt(*field)),
            None => "Got it. Anything else I should know?".to_string(),
        },
        ConversationState::Searching | ConversationState::RefiningSearch => {
            let what = if intent.intent_type == IntentType::SearchHotel {
                "hotels"
            } else {
                "flights"
            };
            format!("Looking for {} {}. {}", what, destination_phrase(place), trip_summary(context))
        }
        ConversationState::PresentingOptions => match place {
            Some(place) => format!("Here are some ideas for {}.", place),
            None => "Tell me where you're headed and I'll suggest things to do.".to_string(),
        },
        ConversationState::AddingToPlan => "Saved to your plan.".to_string(),
        ConversationState::ReviewingPlan => {
            if intent.intent_type == IntentType::CheckBudget {
                match &context.budget {
                    Some(budget) => format!("Your budget is {}. {}", budget, trip_summary(context)),
                    None => "You haven't set a budget yet. What would you like to spend?"
                        .to_string(),
                }
            } else {
                trip_summary(context)
            }
        }
        ConversationState::Booking => format!("Let's book it. {}", trip_summary(context)),
        ConversationState::PostBooking => {
            format!("You're booked. {}", trip_summary(context))
        }
    }
}

/// Opening line for a session created without a first message
pub fn greeting(resumed: bool, context: &TripContext) -> String {
    if resumed {
        format!("Welcome back! {}", trip_summary(context))
    } else {
        "Hi! Where would you like to travel?".to_string()
    }
}

fn destination_phrase(place: Option<&str>) -> String {
    match place {
        Some(place) => format!("to {}", place),
        None => "for your trip".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use trip_types::{FieldValue, Intent};

    fn context_with(destination: &str) -> TripContext {
        let mut ctx = TripContext::new();
        ctx.set_if_unset(FieldValue::Destination(destination.into()), 0.9);
        ctx
    }

    #[test]
    fn test_conflicts_come_first_with_options() {
        let ctx = context_with("Paris");
        let conflict = Conflict {
            existing: FieldValue::Destination("Paris".into()),
            incoming: FieldValue::Destination("Tokyo".into()),
            incoming_confidence: 0.9,
        };
        let suggestions = suggestions_for(&ctx, &[conflict], &[]);
        match &suggestions[0] {
            Suggestion::ResolveConflict {
                description,
                options,
                ..
            } => {
                assert_eq!(description, "destination: Paris vs Tokyo");
                assert_eq!(options.len(), 2);
            }
            other => panic!("expected conflict prompt, got {:?}", other),
        }
        assert_eq!(
            suggestions[0].to_string(),
            "Conflict on destination: Paris vs Tokyo. Choose keep_existing, use_new."
        );
    }

    #[test]
    fn test_merge_offered_for_list_against_single_place() {
        let conflict = Conflict {
            existing: FieldValue::Destinations(vec!["Rome".into(), "Florence".into()]),
            incoming: FieldValue::Destination("Tokyo".into()),
            incoming_confidence: 0.75,
        };
        assert_eq!(
            strategies_for(&conflict),
            vec![
                ResolutionStrategy::KeepExisting,
                ResolutionStrategy::UseNew,
                ResolutionStrategy::Merge,
            ]
        );
    }

    #[test]
    fn test_refused_resolution_becomes_prompt() {
        let rejected = RejectedResolution {
            conflict: Conflict {
                existing: FieldValue::DepartureDate(NaiveDate::from_ymd_opt(2026, 6, 10).unwrap()),
                incoming: FieldValue::DepartureDate(NaiveDate::from_ymd_opt(2026, 6, 25).unwrap()),
                incoming_confidence: 0.9,
            },
            reason: "return date 2026-06-20 would be before departure 2026-06-25".into(),
        };
        let suggestions = resolution_suggestions(&[rejected]);
        assert_eq!(
            suggestions[0].to_string(),
            "I kept 2026-06-10 for departure_date: \
             return date 2026-06-20 would be before departure 2026-06-25."
        );
    }

    #[test]
    fn test_summary_and_primary_destination_agree() {
        let mut ctx = context_with("Paris");
        ctx.overwrite(
            FieldValue::Destinations(vec!["Rome".into(), "Florence".into()]),
            0.9,
            "destination: Paris vs [Rome, Florence] (merged [Paris, Rome, Florence])",
        );
        assert_eq!(ctx.primary_destination(), Some("Rome"));
        assert_eq!(trip_summary(&ctx), "Trip to Rome, Florence.");
    }

    #[test]
    fn test_missing_fields_are_capped() {
        let suggestions = suggestions_for(&TripContext::new(), &[], &[]);
        assert_eq!(suggestions.len(), MAX_DETAIL_PROMPTS);
        assert!(matches!(
            suggestions[0],
            Suggestion::ProvideDetail {
                field: ContextField::Destination,
                ..
            }
        ));
    }

    #[test]
    fn test_search_prompt_when_ready() {
        let mut ctx = context_with("Lisbon");
        ctx.set_if_unset(
            FieldValue::DepartureDate(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()),
            0.9,
        );
        let suggestions = suggestions_for(&ctx, &[], &[]);
        assert!(suggestions
            .iter()
            .any(|s| matches!(s, Suggestion::StartSearch { prompt } if prompt.contains("Lisbon"))));
    }

    #[test]
    fn test_trip_summary() {
        let mut ctx = context_with("Rome");
        ctx.set_if_unset(FieldValue::Travelers(2), 0.9);
        assert_eq!(trip_summary(&ctx), "Trip to Rome for 2 travelers.");
        assert_eq!(trip_summary(&TripContext::new()), "No trip details yet.");
    }

    #[test]
    fn test_reply_asks_for_next_missing_field() {
        let ctx = context_with("Rome");
        let intent = Intent::new(IntentType::SearchFlight, 0.9);
        let reply = compose_reply(&intent, ConversationState::GatheringRequirements, &ctx, &[]);
        assert_eq!(reply, "Got it. When would you like to leave?");
    }
}
