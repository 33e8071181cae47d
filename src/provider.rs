//! Travel Data Provider port
//!
//! The engine only decides *when* a context is good enough to search;
//! fetching offers is a collaborator's job. Calls are bounded by a timeout
//! and every failure is recoverable.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trip_types::TripContext;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("travel data provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("trip context is not ready for search: need a destination and a date")]
    NotReady,

    #[error("travel data provider unavailable: {0}")]
    Unavailable(String),
}

/// One bookable option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub flights: Vec<Offer>,
    pub hotels: Vec<Offer>,
    pub activities: Vec<Offer>,
}

impl SearchResults {
    pub fn total(&self) -> usize {
        self.flights.len() + self.hotels.len() + self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[async_trait]
pub trait TravelDataProvider: Send + Sync {
    async fn search(&self, context: &TripContext) -> Result<SearchResults, ProviderError>;
}

/// Run a provider search under `timeout`
pub async fn search_with_timeout(
    provider: &dyn TravelDataProvider,
    context: &TripContext,
    timeout: Duration,
) -> Result<SearchResults, ProviderError> {
    if !context.is_search_ready() {
        return Err(ProviderError::NotReady);
    }
    match tokio::time::timeout(timeout, provider.search(context)).await {
        Ok(Ok(results)) => {
            tracing::debug!(offers = results.total(), "provider search completed");
            Ok(results)
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "provider search failed");
            Err(e)
        }
        Err(_) => {
            tracing::warn!(?timeout, "provider search timed out");
            Err(ProviderError::Timeout(timeout))
        }
    }
}

/// Deterministic offers derived from the context, for demos and tests
#[derive(Debug, Clone, Default)]
pub struct StaticTravelDataProvider;

#[async_trait]
impl TravelDataProvider for StaticTravelDataProvider {
    async fn search(&self, context: &TripContext) -> Result<SearchResults, ProviderError> {
        let destination = context
            .primary_destination()
            .ok_or(ProviderError::NotReady)?;
        let currency = context
            .budget
            .as_ref()
            .map(|b| b.currency.clone())
            .unwrap_or_else(|| "USD".to_string());
        let travelers = Decimal::from(context.travelers());
        let slug = destination.to_lowercase().replace(' ', "-");

        let offer = |kind: &str, title: String, unit: i64| Offer {
            id: format!("{}-{}", kind, slug),
            title,
            price: Some(Decimal::from(unit) * travelers),
            currency: currency.clone(),
        };

        Ok(SearchResults {
            flights: vec![offer("flight", format!("Economy return to {}", destination), 420)],
            hotels: vec![offer("hotel", format!("Central hotel in {}", destination), 150)],
            activities: vec![offer("tour", format!("Walking tour of {}", destination), 35)],
        })
    }
}
