//! Property tests for context merging and conflict resolution
//!
//! Run with: cargo test --test context_merge_properties

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use trip_planner::context::{resolve, ContextTracker};
use trip_types::{Budget, DateRole, Entity, EntityValue, ResolutionStrategy, Span, TripContext};

const PLACES: &[&str] = &["Paris", "Tokyo", "Rome", "Lisbon", "New York"];
const PREFERENCES: &[&str] = &["beach", "museums", "food", "hiking"];

fn entity(value: EntityValue, confidence: f32) -> Entity {
    Entity::new(value, confidence, Span::new(0, 1))
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0u64..365).prop_map(|day| NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Days::new(day))
}

/// Entities shaped like one message's extraction: any number of places and
/// preferences, at most one of everything else
fn arb_message() -> impl Strategy<Value = Vec<Entity>> {
    let confidence = 0.3f32..=1.0;
    (
        prop::collection::vec(prop::sample::select(PLACES), 0..3),
        prop::option::of(0u32..30),
        prop::option::of(arb_date()),
        prop::option::of(arb_date()),
        prop::option::of(-100i64..5000),
        prop::collection::vec(prop::sample::select(PREFERENCES), 0..3),
        confidence,
    )
        .prop_map(|(places, travelers, departure, ret, budget, preferences, c)| {
            let mut out: Vec<Entity> = places
                .into_iter()
                .map(|name| entity(EntityValue::Destination { name: name.to_string() }, c))
                .collect();
            if let Some(count) = travelers {
                out.push(entity(EntityValue::Travelers { count }, c));
            }
            if let Some(date) = departure {
                out.push(entity(EntityValue::Date { role: DateRole::Departure, date }, c));
            }
            if let Some(date) = ret {
                out.push(entity(EntityValue::Date { role: DateRole::Return, date }, c));
            }
            if let Some(max) = budget {
                out.push(entity(
                    EntityValue::Budget(Budget::up_to(Decimal::from(max), "EUR")),
                    c,
                ));
            }
            out.extend(
                preferences
                    .into_iter()
                    .map(|label| entity(EntityValue::Preference { label: label.to_string() }, c)),
            );
            out
        })
}

proptest! {
    #[test]
    fn prop_merge_is_idempotent(entities in arb_message()) {
        let tracker = ContextTracker::default();
        let once = tracker.merge(&TripContext::default(), &entities);
        let twice = tracker.merge(&once.context, &entities);

        prop_assert_eq!(&twice.context, &once.context);
        prop_assert!(twice.conflicts.is_empty());
    }

    #[test]
    fn prop_merge_never_overwrites(
        first in arb_message(),
        second in arb_message(),
    ) {
        let tracker = ContextTracker::default();
        let base = tracker.merge(&TripContext::default(), &first).context;
        let next = tracker.merge(&base, &second);

        for conflict in &next.conflicts {
            let kept = next.context.get(conflict.field());
            prop_assert_eq!(kept.as_ref(), Some(&conflict.existing));
        }
        prop_assert_eq!(&next.context.conflicts_resolved, &base.conflicts_resolved);
    }

    #[test]
    fn prop_every_resolution_is_recorded(
        first in arb_message(),
        second in arb_message(),
        strategy in prop::sample::select(vec![
            ResolutionStrategy::KeepExisting,
            ResolutionStrategy::UseNew,
            ResolutionStrategy::Merge,
        ]),
    ) {
        let tracker = ContextTracker::default();
        let base = tracker.merge(&TripContext::default(), &first).context;
        let next = tracker.merge(&base, &second);

        let resolved = resolve(&next.context, &next.conflicts, strategy).context;
        prop_assert_eq!(
            resolved.conflicts_resolved.len(),
            next.context.conflicts_resolved.len() + next.conflicts.len()
        );
        prop_assert!((0.0..=1.0).contains(&resolved.confidence));
    }

    #[test]
    fn prop_resolution_keeps_dates_in_order(
        first in arb_message(),
        second in arb_message(),
        third in arb_message(),
        strategy in prop::sample::select(vec![
            ResolutionStrategy::KeepExisting,
            ResolutionStrategy::UseNew,
            ResolutionStrategy::Merge,
        ]),
    ) {
        let tracker = ContextTracker::default();
        let base = tracker.merge(&TripContext::default(), &first).context;
        let next = tracker.merge(&base, &second);
        // A later message may fill the other date while conflicts wait.
        let later = tracker.merge(&next.context, &third).context;
        prop_assert!(later.dates_in_order());

        let resolution = resolve(&later, &next.conflicts, strategy);
        prop_assert!(resolution.context.dates_in_order());
        prop_assert!(resolution.context.destination.is_none() || resolution.context.destinations.is_none());
        for rejected in &resolution.rejected {
            let current = resolution.context.get(rejected.conflict.field());
            prop_assert_eq!(
                current.as_ref(),
                Some(&rejected.conflict.existing)
            );
        }
    }
}
