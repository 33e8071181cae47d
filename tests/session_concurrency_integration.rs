//! Concurrency, cancellation and timeout behaviour of session writes
//!
//! Run with: cargo test --test session_concurrency_integration

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use trip_planner::engine::TripEngine;
use trip_planner::provider::{ProviderError, SearchResults, TravelDataProvider};
use trip_planner::session::{InMemoryLastSessionCache, InMemorySessionStore, SessionStore, StoreError};
use trip_planner::{EngineConfig, Session, TripContext, TripError};
use uuid::Uuid;

/// Delays every save, so callers can be cancelled mid-write
struct SlowStore {
    inner: Arc<InMemorySessionStore>,
    delay: Duration,
}

#[async_trait]
impl SessionStore for SlowStore {
    async fn load(&self, id: Uuid) -> Result<Option<(Session, u64)>, StoreError> {
        self.inner.load(id).await
    }

    async fn save(&self, session: &Session, expected: Option<u64>) -> Result<u64, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.save(session, expected).await
    }
}

async fn engine_on(store: Arc<dyn SessionStore>) -> TripEngine {
    TripEngine::builder(EngineConfig::default())
        .store(store)
        .last_session_cache(Arc::new(InMemoryLastSessionCache::new()))
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_concurrent_sends_on_one_engine_keep_every_turn() {
    let engine = engine_on(Arc::new(InMemorySessionStore::new())).await;
    let id = engine.create_session(None, true).await.unwrap().session_id;

    let messages = [
        "Trip to Rome",
        "For 4 people",
        "We like museums",
        "Budget $3000",
        "Leaving on 2026-09-12",
    ];
    let sends = messages.iter().map(|m| engine.send_message(id, m));
    for result in futures::future::join_all(sends).await {
        result.unwrap();
    }

    let view = engine.get_session(id).await.unwrap();
    // greeting + one (user, assistant) pair per send
    assert_eq!(view.messages.len(), 1 + 2 * messages.len());
    assert_eq!(view.context.destination.as_deref(), Some("Rome"));
    assert_eq!(view.context.travelers, Some(4));
    assert_eq!(view.context.preferences, vec!["museums"]);
    assert!(view.context.budget.is_some());
    assert!(view.context.departure_date.is_some());
}

#[tokio::test]
async fn test_concurrent_sends_from_two_engines_lose_nothing() {
    let store = Arc::new(SlowStore {
        inner: Arc::new(InMemorySessionStore::new()),
        delay: Duration::from_millis(10),
    });
    let first = engine_on(store.clone()).await;
    let second = engine_on(store.clone()).await;
    let id = first.create_session(None, true).await.unwrap().session_id;

    // Separate engines share no lock; only the version check orders them.
    let (a, b) = tokio::join!(
        first.send_message(id, "Trip to Barcelona"),
        second.send_message(id, "For 3 people"),
    );
    a.unwrap();
    b.unwrap();

    let view = first.get_session(id).await.unwrap();
    assert_eq!(view.context.destination.as_deref(), Some("Barcelona"));
    assert_eq!(view.context.travelers, Some(3));
    assert_eq!(view.messages.len(), 5);
}

#[tokio::test]
async fn test_cancelled_send_leaves_session_untouched() {
    let inner = Arc::new(InMemorySessionStore::new());
    let engine = engine_on(Arc::new(SlowStore {
        inner: inner.clone(),
        delay: Duration::from_millis(200),
    }))
    .await;
    let id = engine.create_session(None, true).await.unwrap().session_id;
    let (before, version) = inner.load(id).await.unwrap().unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(20), engine.send_message(id, "Trip to Rome")).await;
    assert!(cancelled.is_err());

    let (after, after_version) = inner.load(id).await.unwrap().unwrap();
    assert_eq!(after_version, version);
    assert_eq!(after, before);
    assert_eq!(after.context, TripContext::default());

    // The session is still usable.
    let turn = engine.send_message(id, "Trip to Rome").await.unwrap();
    assert_eq!(turn.updated_context.destination.as_deref(), Some("Rome"));
}

struct StalledProvider;

#[async_trait]
impl TravelDataProvider for StalledProvider {
    async fn search(&self, _context: &TripContext) -> Result<SearchResults, ProviderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(SearchResults::default())
    }
}

#[tokio::test]
async fn test_provider_timeout_is_recoverable() {
    let config = EngineConfig {
        provider_timeout: Duration::from_millis(30),
        ..EngineConfig::default()
    };
    let engine = TripEngine::builder(config)
        .provider(Arc::new(StalledProvider))
        .build()
        .await
        .unwrap();
    let id = engine
        .create_session(Some("Trip to Lisbon leaving 2026-06-01"), true)
        .await
        .unwrap()
        .session_id;

    let err = engine.search(id).await.unwrap_err();
    assert!(matches!(err, TripError::Provider(ProviderError::Timeout(_))));
    assert!(err.is_recoverable());

    // A failed search does not change the conversation.
    let view = engine.get_session(id).await.unwrap();
    assert_eq!(view.messages.len(), 2);
}
