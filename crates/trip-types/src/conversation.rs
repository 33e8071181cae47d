//! Conversation state machine
//!
//! Exactly one state is active per session. `next` is the single entry point
//! for transitions and only looks at the classified intent plus whether the
//! trip context is search-ready.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::intent::IntentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Greeting,
    GatheringRequirements,
    Searching,
    PresentingOptions,
    RefiningSearch,
    AddingToPlan,
    ReviewingPlan,
    Booking,
    PostBooking,
}

impl ConversationState {
    /// Transition on a newly classified intent.
    ///
    /// | intent                      | next state                                   |
    /// |-----------------------------|----------------------------------------------|
    /// | search_* (context not ready)| gathering_requirements                       |
    /// | search_* (ready)            | searching, or refining_search when results were already shown |
    /// | get_recommendations         | presenting_options                           |
    /// | modify_plan                 | refining_search                              |
    /// | add_to_plan                 | adding_to_plan                               |
    /// | view_plan / check_budget    | reviewing_plan (post_booking after a booking)|
    /// | book_item                   | booking (post_booking when already booking)  |
    pub fn next(self, intent: IntentType, search_ready: bool) -> Self {
        use ConversationState as S;
        match intent {
            IntentType::SearchFlight | IntentType::SearchHotel => {
                if !search_ready {
                    S::GatheringRequirements
                } else if matches!(self, S::Searching | S::PresentingOptions | S::RefiningSearch) {
                    S::RefiningSearch
                } else {
                    S::Searching
                }
            }
            IntentType::GetRecommendations => S::PresentingOptions,
            IntentType::ModifyPlan => S::RefiningSearch,
            IntentType::AddToPlan => S::AddingToPlan,
            IntentType::ViewPlan | IntentType::CheckBudget => match self {
                S::Booking | S::PostBooking => S::PostBooking,
                _ => S::ReviewingPlan,
            },
            IntentType::BookItem => match self {
                S::Booking => S::PostBooking,
                _ => S::Booking,
            },
        }
    }
}
