//! Trip engine facade
//!
//! `TripEngine` is what a transport (CLI, HTTP handler, test) talks to. Each
//! call names its session explicitly. Message understanding runs before the
//! session lock is taken; everything that reads or writes the session runs
//! inside one `SessionLifecycle::update`, so a turn is saved whole or not at
//! all.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use trip_agentic::{EntityExtractor, IntentClassifier};
use trip_types::{
    Conflict, ConversationState, Entity, Intent, Message, MessageMetadata, MessageRole,
    MessageStatus, ResolutionStrategy, Session, SessionStatus, TripContext,
};
use uuid::Uuid;

use crate::assistant::{compose_reply, greeting, resolution_suggestions, suggestions_for, Suggestion};
use crate::config::EngineConfig;
use crate::context::{resolve, ContextTracker, InvalidEntity, MergeOutcome, RejectedResolution, Resolution};
use crate::error::{Result, TripError};
use crate::provider::{search_with_timeout, ProviderError, SearchResults, TravelDataProvider};
use crate::session::{
    ensure_active, FileLastSessionCache, InMemoryLastSessionCache, InMemorySessionStore,
    JsonFileSessionStore, LastSessionCache, SessionLifecycle, SessionStore,
};

/// File holding the last-session pointer inside a store directory
const LAST_SESSION_FILE: &str = "last_session";

// ============================================================================
// Results
// ============================================================================

/// Outcome of one processed user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub session_id: Uuid,
    /// Id of the stored user message
    pub message_id: Uuid,
    pub intent: Intent,
    pub entities: Vec<Entity>,
    pub updated_context: TripContext,
    /// `"<field>: <old> vs <new>"` for conflicts raised by this message
    pub conflicts: Vec<String>,
    pub suggestions: Vec<Suggestion>,
    pub state: ConversationState,
    pub search_ready: bool,
    pub rejected: Vec<InvalidEntity>,
    /// Assistant reply appended after the user message
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStart {
    pub session_id: Uuid,
    pub resumed: bool,
    pub initial_response: String,
    /// Present when an initial message was processed
    pub metadata: Option<TurnResult>,
}

/// What a client renders for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub state: ConversationState,
    pub context: TripContext,
    /// History with superseded entries folded away
    pub messages: Vec<Message>,
    pub pending_conflicts: Vec<Conflict>,
    pub search_ready: bool,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            state: session.state,
            context: session.context.clone(),
            messages: session.visible_messages().into_iter().cloned().collect(),
            pending_conflicts: session.pending_conflicts.clone(),
            search_ready: session.context.is_search_ready(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub updated_context: TripContext,
    /// Audit notes added by this resolution, empty when nothing was pending
    pub resolved: Vec<String>,
    /// Conflicts held at their existing value because the chosen one was invalid
    pub rejected: Vec<RejectedResolution>,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: SearchResults,
    pub state: ConversationState,
}

// ============================================================================
// Builder
// ============================================================================

pub struct TripEngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn SessionStore>>,
    last_session: Option<Arc<dyn LastSessionCache>>,
    provider: Option<Arc<dyn TravelDataProvider>>,
    reference_date: Option<NaiveDate>,
}

impl TripEngineBuilder {
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn last_session_cache(mut self, cache: Arc<dyn LastSessionCache>) -> Self {
        self.last_session = Some(cache);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn TravelDataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Anchor for resolving yearless dates; today when unset
    pub fn reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    /// Load matchers and vocabulary, open the default store if none was given
    pub async fn build(self) -> Result<TripEngine> {
        let config = self.config;

        let classifier = IntentClassifier::new(&config.load_patterns()?)?;
        let mut extractor = EntityExtractor::new(config.load_vocabulary()?)?;
        if let Some(date) = self.reference_date {
            extractor = extractor.with_reference_date(date);
        }

        let store: Arc<dyn SessionStore> = match (self.store, &config.store_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(JsonFileSessionStore::open(dir).await?),
            (None, None) => Arc::new(InMemorySessionStore::new()),
        };
        let last_session: Arc<dyn LastSessionCache> = match (self.last_session, &config.store_dir) {
            (Some(cache), _) => cache,
            (None, Some(dir)) => Arc::new(FileLastSessionCache::new(dir.join(LAST_SESSION_FILE))),
            (None, None) => Arc::new(InMemoryLastSessionCache::new()),
        };

        tracing::info!(
            matchers = classifier.matcher().total_matchers(),
            store_dir = ?config.store_dir,
            provider = self.provider.is_some(),
            "trip engine ready"
        );

        Ok(TripEngine {
            classifier,
            extractor,
            tracker: ContextTracker::new(config.max_travelers),
            lifecycle: SessionLifecycle::new(store, last_session)
                .with_max_save_retries(config.max_save_retries),
            provider: self.provider,
            provider_timeout: config.provider_timeout,
        })
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct TripEngine {
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    tracker: ContextTracker,
    lifecycle: SessionLifecycle,
    provider: Option<Arc<dyn TravelDataProvider>>,
    provider_timeout: Duration,
}

impl TripEngine {
    pub fn builder(config: EngineConfig) -> TripEngineBuilder {
        TripEngineBuilder {
            config,
            store: None,
            last_session: None,
            provider: None,
            reference_date: None,
        }
    }

    /// Engine with embedded matchers and in-memory storage
    pub async fn in_memory() -> Result<Self> {
        Self::builder(EngineConfig::default()).build().await
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    /// Start or resume a chat, optionally processing a first message
    pub async fn create_session(
        &self,
        initial_message: Option<&str>,
        force_new: bool,
    ) -> Result<SessionStart> {
        let handle = self.lifecycle.create_session(force_new).await?;

        if let Some(text) = initial_message.filter(|t| !t.trim().is_empty()) {
            let turn = self.send_message(handle.id, text).await?;
            return Ok(SessionStart {
                session_id: handle.id,
                resumed: handle.resumed,
                initial_response: turn.reply.clone(),
                metadata: Some(turn),
            });
        }

        let initial_response = if handle.resumed {
            let session = self.lifecycle.resume_session(handle.id).await?;
            greeting(true, &session.context)
        } else {
            let text = greeting(false, &TripContext::default());
            self.lifecycle
                .append_message(handle.id, Message::assistant(text.clone()))
                .await?;
            text
        };

        Ok(SessionStart {
            session_id: handle.id,
            resumed: handle.resumed,
            initial_response,
            metadata: None,
        })
    }

    /// Classify, extract, merge and reply to one user message
    pub async fn send_message(&self, session_id: Uuid, content: &str) -> Result<TurnResult> {
        let (intent, entities) = self.analyse(content);

        let (_, turn) = self
            .lifecycle
            .update(session_id, |session| {
                ensure_active(session)?;
                Ok(self.apply_turn(session, Message::user(content), &intent, &entities))
            })
            .await?;

        Ok(turn)
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<SessionView> {
        let session = self.lifecycle.resume_session(session_id).await?;
        Ok(SessionView::from(&session))
    }

    /// Apply `strategy` to every pending conflict
    pub async fn resolve_conflict(
        &self,
        session_id: Uuid,
        strategy: ResolutionStrategy,
    ) -> Result<ResolutionResult> {
        let (_, result) = self
            .lifecycle
            .update(session_id, |session| {
                ensure_active(session)?;
                if session.pending_conflicts.is_empty() {
                    return Ok(ResolutionResult {
                        updated_context: session.context.clone(),
                        resolved: Vec::new(),
                        rejected: Vec::new(),
                        suggestions: Vec::new(),
                    });
                }

                let pending = std::mem::take(&mut session.pending_conflicts);
                let before = session.context.conflicts_resolved.len();
                let Resolution { context, rejected } = resolve(&session.context, &pending, strategy);
                session.context = context;
                let resolved = session.context.conflicts_resolved[before..].to_vec();

                session.append(Message::system(format!("Resolved: {}", resolved.join("; "))));
                Ok(ResolutionResult {
                    updated_context: session.context.clone(),
                    resolved,
                    suggestions: resolution_suggestions(&rejected),
                    rejected,
                })
            })
            .await?;

        Ok(result)
    }

    /// Mark a session archived. Archiving twice is a no-op.
    pub async fn archive_session(&self, session_id: Uuid) -> Result<SessionView> {
        let (session, ()) = self
            .lifecycle
            .update(session_id, |session| {
                if session.is_active() {
                    session.status = SessionStatus::Archived;
                    session.updated_at = Utc::now();
                    tracing::info!(session_id = %session.id, "archived session");
                }
                Ok(())
            })
            .await?;
        Ok(SessionView::from(&session))
    }

    /// Replace a user message and re-run the turn on the new text.
    ///
    /// The original stays in history; facts it already merged stay in the
    /// context, and anything the new text contradicts comes back as a
    /// conflict.
    pub async fn edit_message(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> Result<TurnResult> {
        let (intent, entities) = self.analyse(content);

        let (_, turn) = self
            .lifecycle
            .update(session_id, |session| {
                ensure_active(session)?;
                let original = editable(session, message_id)?;
                let edit = Message::edit_of(original, content);
                Ok(self.apply_turn(session, edit, &intent, &entities))
            })
            .await?;

        Ok(turn)
    }

    /// Hide a user message. The trip context is left as it is.
    pub async fn delete_message(&self, session_id: Uuid, message_id: Uuid) -> Result<SessionView> {
        let (session, ()) = self
            .lifecycle
            .update(session_id, |session| {
                ensure_active(session)?;
                let tombstone = Message::deletion_of(editable(session, message_id)?);
                session.append(tombstone);
                Ok(())
            })
            .await?;
        Ok(SessionView::from(&session))
    }

    /// Ask the travel data provider for offers matching the session's trip
    pub async fn search(&self, session_id: Uuid) -> Result<SearchOutcome> {
        let session = self.lifecycle.resume_session(session_id).await?;
        ensure_active(&session)?;
        let provider = self.provider.as_deref().ok_or_else(|| {
            ProviderError::Unavailable("no travel data provider configured".to_string())
        })?;

        let results = search_with_timeout(provider, &session.context, self.provider_timeout).await?;

        let summary = format!(
            "Found {} flights, {} hotels and {} activities for {}.",
            results.flights.len(),
            results.hotels.len(),
            results.activities.len(),
            session.context.primary_destination().unwrap_or("your trip")
        );
        let (session, ()) = self
            .lifecycle
            .update(session_id, |session| {
                ensure_active(session)?;
                session.state = ConversationState::PresentingOptions;
                session.append(Message::assistant(summary.clone()));
                Ok(())
            })
            .await?;

        Ok(SearchOutcome {
            results,
            state: session.state,
        })
    }

    fn analyse(&self, content: &str) -> (Intent, Vec<Entity>) {
        let intent = self.classifier.classify(content);
        let entities = self.extractor.extract(content);
        tracing::debug!(
            intent = %intent.intent_type,
            confidence = intent.confidence,
            entities = entities.len(),
            "analysed message"
        );
        (intent, entities)
    }

    /// Merge, transition and record one turn on an in-memory session
    fn apply_turn(
        &self,
        session: &mut Session,
        user_message: Message,
        intent: &Intent,
        entities: &[Entity],
    ) -> TurnResult {
        let outcome = self.tracker.merge(&session.context, entities);
        let conflicts = outcome.conflict_descriptions();
        let MergeOutcome {
            context,
            conflicts: raised,
            rejected,
        } = outcome;

        session.context = context;
        session.queue_conflicts(&raised);
        let search_ready = session.context.is_search_ready();
        session.state = session.state.next(intent.intent_type, search_ready);

        let suggestions = suggestions_for(&session.context, &raised, &rejected);
        let reply = compose_reply(intent, session.state, &session.context, &raised);

        let metadata = MessageMetadata {
            intent: Some(intent.clone()),
            entities: Some(entities.to_vec()),
            conflicts: (!conflicts.is_empty()).then(|| conflicts.clone()),
        };
        let message_id = user_message.id;
        session.append(user_message.with_metadata(metadata));
        session.append(Message::assistant(reply.clone()));

        TurnResult {
            session_id: session.id,
            message_id,
            intent: intent.clone(),
            entities: entities.to_vec(),
            updated_context: session.context.clone(),
            conflicts,
            suggestions,
            state: session.state,
            search_ready,
            rejected,
            reply,
        }
    }
}

/// A live user message that may be edited or deleted
fn editable(session: &Session, message_id: Uuid) -> Result<&Message> {
    let message = session
        .find_message(message_id)
        .ok_or(TripError::MessageNotFound {
            session_id: session.id,
            message_id,
        })?;
    if message.status == MessageStatus::Deleted || session.is_superseded(message_id) {
        return Err(TripError::MessageSuperseded(message_id));
    }
    if message.role != MessageRole::User {
        return Err(TripError::MessageNotEditable(message_id));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticTravelDataProvider;
    use trip_types::IntentType;

    async fn engine() -> TripEngine {
        TripEngine::builder(EngineConfig::default())
            .reference_date(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap())
            .provider(Arc::new(StaticTravelDataProvider))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_with_initial_message() {
        let engine = engine().await;
        let start = engine
            .create_session(Some("Find flights to Tokyo for 2 people"), true)
            .await
            .unwrap();

        let turn = start.metadata.unwrap();
        assert_eq!(turn.intent.intent_type, IntentType::SearchFlight);
        assert_eq!(turn.updated_context.destination.as_deref(), Some("Tokyo"));
        assert_eq!(turn.updated_context.travelers, Some(2));
        assert_eq!(start.initial_response, turn.reply);

        let view = engine.get_session(start.session_id).await.unwrap();
        assert_eq!(view.messages.len(), 2);
        assert_eq!(view.messages[0].role, MessageRole::User);
        assert!(view.messages[0].metadata.intent.is_some());
    }

    #[tokio::test]
    async fn test_create_without_message_greets() {
        let engine = engine().await;
        let start = engine.create_session(None, true).await.unwrap();
        assert!(start.metadata.is_none());
        assert_eq!(start.initial_response, "Hi! Where would you like to travel?");

        let again = engine.create_session(Some("   "), false).await.unwrap();
        assert!(again.resumed);
        assert_eq!(again.session_id, start.session_id);
        assert!(again.initial_response.starts_with("Welcome back!"));
    }

    #[tokio::test]
    async fn test_conflict_is_queued_until_resolved() {
        let engine = engine().await;
        let id = engine.create_session(None, true).await.unwrap().session_id;
        engine.send_message(id, "Trip to Paris").await.unwrap();
        let turn = engine.send_message(id, "Actually fly to Tokyo").await.unwrap();

        assert_eq!(turn.conflicts, vec!["destination: Paris vs Tokyo".to_string()]);
        assert_eq!(turn.updated_context.destination.as_deref(), Some("Paris"));
        assert!(matches!(turn.suggestions[0], Suggestion::ResolveConflict { .. }));

        let resolved = engine
            .resolve_conflict(id, ResolutionStrategy::KeepExisting)
            .await
            .unwrap();
        assert_eq!(resolved.updated_context.destination.as_deref(), Some("Paris"));
        assert_eq!(resolved.resolved, vec!["destination: Paris vs Tokyo (kept Paris)"]);

        let view = engine.get_session(id).await.unwrap();
        assert!(view.pending_conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_resolution_cannot_put_return_before_departure() {
        let engine = engine().await;
        let id = engine
            .create_session(Some("Trip to Rome leaving 2026-06-10"), true)
            .await
            .unwrap()
            .session_id;
        let turn = engine.send_message(id, "Leaving on 2026-06-25").await.unwrap();
        assert_eq!(turn.conflicts, vec!["departure_date: 2026-06-10 vs 2026-06-25"]);
        let turn = engine.send_message(id, "Back on 2026-06-20").await.unwrap();
        assert_eq!(turn.updated_context.return_date, NaiveDate::from_ymd_opt(2026, 6, 20));

        let result = engine.resolve_conflict(id, ResolutionStrategy::UseNew).await.unwrap();
        assert_eq!(
            result.updated_context.departure_date,
            NaiveDate::from_ymd_opt(2026, 6, 10)
        );
        assert!(result.updated_context.dates_in_order());
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.resolved.len(), 1);
        assert!(matches!(result.suggestions[0], Suggestion::InvalidValue { .. }));

        let view = engine.get_session(id).await.unwrap();
        assert!(view.pending_conflicts.is_empty());
        assert_eq!(view.context, result.updated_context);
    }

    #[tokio::test]
    async fn test_single_place_after_multi_stop_trip_conflicts() {
        let engine = engine().await;
        let id = engine
            .create_session(Some("Trip to Rome and Florence"), true)
            .await
            .unwrap()
            .session_id;
        let turn = engine.send_message(id, "Actually fly to Tokyo").await.unwrap();

        assert_eq!(turn.conflicts, vec!["destinations: [Rome, Florence] vs Tokyo"]);
        assert_eq!(
            turn.updated_context.destinations,
            Some(vec!["Rome".to_string(), "Florence".to_string()])
        );
        assert!(turn.updated_context.destination.is_none());
        assert!(matches!(
            &turn.suggestions[0],
            Suggestion::ResolveConflict { options, .. } if options.contains(&ResolutionStrategy::Merge)
        ));

        let result = engine.resolve_conflict(id, ResolutionStrategy::Merge).await.unwrap();
        assert_eq!(
            result.updated_context.destinations,
            Some(vec!["Rome".to_string(), "Florence".to_string(), "Tokyo".to_string()])
        );
        assert!(result.updated_context.destination.is_none());
    }

    #[tokio::test]
    async fn test_resolve_with_nothing_pending() {
        let engine = engine().await;
        let id = engine.create_session(Some("Trip to Rome"), true).await.unwrap().session_id;
        let result = engine.resolve_conflict(id, ResolutionStrategy::UseNew).await.unwrap();
        assert!(result.resolved.is_empty());
        assert_eq!(result.updated_context.destination.as_deref(), Some("Rome"));
    }

    #[tokio::test]
    async fn test_invalid_travelers_are_reported() {
        let engine = engine().await;
        let id = engine.create_session(None, true).await.unwrap().session_id;
        let turn = engine.send_message(id, "Trip to Rome for 0 people").await.unwrap();
        assert_eq!(turn.rejected.len(), 1);
        assert_eq!(turn.updated_context.travelers, None);
        assert!(turn
            .suggestions
            .iter()
            .any(|s| matches!(s, Suggestion::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_archived_session_refuses_writes() {
        let engine = engine().await;
        let id = engine.create_session(None, true).await.unwrap().session_id;
        let view = engine.archive_session(id).await.unwrap();
        assert_eq!(view.status, SessionStatus::Archived);
        engine.archive_session(id).await.unwrap();

        assert!(matches!(
            engine.send_message(id, "Trip to Rome").await,
            Err(TripError::SessionArchived(_))
        ));
        // Reads still work.
        assert!(engine.get_session(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_edit_replaces_and_reanalyses() {
        let engine = engine().await;
        let id = engine.create_session(None, true).await.unwrap().session_id;
        let first = engine.send_message(id, "Trip for 2 people").await.unwrap();

        let edited = engine
            .edit_message(id, first.message_id, "Trip to Lisbon for 2 people")
            .await
            .unwrap();
        assert_eq!(edited.updated_context.destination.as_deref(), Some("Lisbon"));

        let view = engine.get_session(id).await.unwrap();
        let users: Vec<&str> = view
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(users, vec!["Trip to Lisbon for 2 people"]);

        assert!(matches!(
            engine.edit_message(id, first.message_id, "again").await,
            Err(TripError::MessageSuperseded(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_keeps_context() {
        let engine = engine().await;
        let id = engine.create_session(None, true).await.unwrap().session_id;
        let turn = engine.send_message(id, "Trip to Rome").await.unwrap();

        let view = engine.delete_message(id, turn.message_id).await.unwrap();
        assert!(view.messages.iter().all(|m| m.id != turn.message_id));
        assert_eq!(view.context.destination.as_deref(), Some("Rome"));

        let assistant = view.messages[0].id;
        assert!(matches!(
            engine.delete_message(id, assistant).await,
            Err(TripError::MessageNotEditable(_))
        ));
        assert!(matches!(
            engine.delete_message(id, Uuid::new_v4()).await,
            Err(TripError::MessageNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_without_provider_is_recoverable() {
        let engine = TripEngine::in_memory().await.unwrap();
        let id = engine
            .create_session(Some("Trip to Rome leaving 2026-05-01"), true)
            .await
            .unwrap()
            .session_id;
        let err = engine.search(id).await.unwrap_err();
        assert!(matches!(err, TripError::Provider(ProviderError::Unavailable(_))));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_search_requires_ready_context() {
        let engine = engine().await;
        let id = engine.create_session(Some("Trip to Rome"), true).await.unwrap().session_id;
        assert!(matches!(
            engine.search(id).await,
            Err(TripError::Provider(ProviderError::NotReady))
        ));

        let turn = engine.send_message(id, "Leaving on 2026-05-01").await.unwrap();
        assert!(turn.search_ready);

        let outcome = engine.search(id).await.unwrap();
        assert_eq!(outcome.state, ConversationState::PresentingOptions);
        assert_eq!(outcome.results.total(), 3);
    }
}
