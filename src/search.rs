// Search session state machine
//
// Idle -> Searching -> Success | Error, with credential failures routed back
// to Idle. Leaving Searching waits for both the recommendation fetch and a
// minimum display duration. Only one search runs at a time; a submission
// while Searching is refused.

use crate::ai::{Recommend, RecommendationResult};
use crate::error::{RecommendationError, SubmitError};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Lower bound on how long Searching stays visible
pub const DEFAULT_MIN_DISPLAY: Duration = Duration::from_millis(800);

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Idle,
    Searching,
    Success,
    Error,
}

/// Snapshot of the current query lifecycle, as seen by presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSession {
    pub query: String,
    pub state: SearchState,
    pub results: Vec<RecommendationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Set when a credential failure sent the session back to key selection
    pub auth_required: bool,
}

impl SearchSession {
    fn idle() -> Self {
        SearchSession {
            query: String::new(),
            state: SearchState::Idle,
            results: Vec::new(),
            error_message: None,
            auth_required: false,
        }
    }

    /// The search ran and matched nothing (distinct from a failed search)
    pub fn is_empty_success(&self) -> bool {
        self.state == SearchState::Success && self.results.is_empty()
    }
}

pub struct SearchMachine {
    recommender: Arc<dyn Recommend>,
    min_display: Duration,
    session: Mutex<SearchSession>,
    events: broadcast::Sender<SearchSession>,
}

impl SearchMachine {
    pub fn new(recommender: Arc<dyn Recommend>, min_display: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        SearchMachine {
            recommender,
            min_display,
            session: Mutex::new(SearchSession::idle()),
            events,
        }
    }

    fn session(&self) -> MutexGuard<'_, SearchSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SearchSession {
        self.session().clone()
    }

    /// Every transition is published here
    pub fn subscribe(&self) -> broadcast::Receiver<SearchSession> {
        self.events.subscribe()
    }

    fn publish(&self, session: &SearchSession) {
        // No subscribers is fine
        let _ = self.events.send(session.clone());
    }

    /// Move to Searching for `query`. Returns the recorded query, which must
    /// then be handed to [`SearchMachine::run_search`].
    pub fn begin(&self, query: &str) -> Result<String, SubmitError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SubmitError::EmptyQuery);
        }

        let mut session = self.session();
        if session.state == SearchState::Searching {
            return Err(SubmitError::Busy);
        }

        session.query = query.to_string();
        session.state = SearchState::Searching;
        session.results.clear();
        session.error_message = None;
        session.auth_required = false;
        self.publish(&session);

        tracing::info!("Searching for {:?}", query);
        Ok(session.query.clone())
    }

    /// Resend the last query after a failed search
    pub fn begin_retry(&self) -> Result<String, SubmitError> {
        let last_query = {
            let session = self.session();
            if session.state != SearchState::Error {
                return Err(SubmitError::NothingToRetry);
            }
            session.query.clone()
        };
        self.begin(&last_query)
    }

    /// Run the fetch alongside the minimum-display timer and apply the outcome
    /// once both are done.
    pub async fn run_search(&self, query: String) -> SearchSession {
        let started = Instant::now();
        let (outcome, ()) = tokio::join!(
            self.recommender.recommend(&query),
            tokio::time::sleep(self.min_display)
        );

        let mut session = self.session();
        match outcome {
            Ok(results) => {
                tracing::info!(
                    "Search for {:?} finished with {} results in {:?}",
                    query,
                    results.len(),
                    started.elapsed()
                );
                session.state = SearchState::Success;
                session.results = results;
            }
            Err(e) => Self::apply_failure(&mut session, &query, e),
        }
        self.publish(&session);
        session.clone()
    }

    fn apply_failure(session: &mut SearchSession, query: &str, error: RecommendationError) {
        session.results.clear();
        session.error_message = Some(error.user_message().to_string());

        if error.is_credential_failure() {
            tracing::warn!("Search for {:?} needs a new API key: {}", query, error);
            session.state = SearchState::Idle;
            session.auth_required = true;
        } else {
            tracing::error!("Search for {:?} failed: {}", query, error);
            session.state = SearchState::Error;
        }
    }

    /// Submit a query and wait for the search to settle
    pub async fn submit(&self, query: &str) -> Result<SearchSession, SubmitError> {
        let query = self.begin(query)?;
        Ok(self.run_search(query).await)
    }

    /// "Try Again": resubmit the last query from the Error state
    pub async fn retry(&self) -> Result<SearchSession, SubmitError> {
        let query = self.begin_retry()?;
        Ok(self.run_search(query).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CREDENTIAL_FAILURE_MESSAGE, GENERIC_FAILURE_MESSAGE};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRecommender {
        outcome: Result<Vec<RecommendationResult>, RecommendationError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeRecommender {
        fn new(outcome: Result<Vec<RecommendationResult>, RecommendationError>, delay: Duration) -> Arc<Self> {
            Arc::new(FakeRecommender {
                outcome,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Recommend for FakeRecommender {
        async fn recommend(&self, _query: &str) -> Result<Vec<RecommendationResult>, RecommendationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()
        }
    }

    fn result(title: &str) -> RecommendationResult {
        RecommendationResult {
            title: title.to_string(),
            author: "Author".to_string(),
            description: "Description".to_string(),
            relevance: "Relevant because".to_string(),
            category: "Category".to_string(),
            published_year: None,
            isbn: None,
        }
    }

    fn machine(fake: &Arc<FakeRecommender>) -> SearchMachine {
        SearchMachine::new(fake.clone(), DEFAULT_MIN_DISPLAY)
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_passes_through_searching() {
        let fake = FakeRecommender::new(Ok(vec![result("Cosmos")]), Duration::ZERO);
        let machine = machine(&fake);
        let mut events = machine.subscribe();

        assert_eq!(machine.snapshot().state, SearchState::Idle);
        let session = machine.submit("Astronomy").await.unwrap();

        assert_eq!(session.state, SearchState::Success);
        assert_eq!(session.query, "Astronomy");
        assert_eq!(session.results.len(), 1);
        assert_eq!(events.recv().await.unwrap().state, SearchState::Searching);
        assert_eq!(events.recv().await.unwrap().state, SearchState::Success);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_fetch_waits_for_min_display() {
        let fake = FakeRecommender::new(Ok(vec![]), Duration::ZERO);
        let machine = machine(&fake);

        let started = Instant::now();
        machine.submit("Anything").await.unwrap();
        assert!(started.elapsed() >= DEFAULT_MIN_DISPLAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_gates_transition() {
        let fetch_time = Duration::from_secs(3);
        let fake = FakeRecommender::new(Ok(vec![result("Cosmos")]), fetch_time);
        let machine = machine(&fake);

        let started = Instant::now();
        machine.submit("Anything").await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= fetch_time);
        assert!(elapsed < fetch_time + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_query_is_not_submitted() {
        let fake = FakeRecommender::new(Ok(vec![]), Duration::ZERO);
        let machine = machine(&fake);
        let mut events = machine.subscribe();

        assert_eq!(machine.submit("   \t").await, Err(SubmitError::EmptyQuery));
        assert_eq!(machine.snapshot().state, SearchState::Idle);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_while_searching_is_refused() {
        let fake = FakeRecommender::new(Ok(vec![]), Duration::ZERO);
        let machine = machine(&fake);

        let query = machine.begin("First").unwrap();
        assert_eq!(machine.begin("Second"), Err(SubmitError::Busy));
        assert_eq!(machine.snapshot().query, "First");

        machine.run_search(query).await;
        assert!(machine.begin("Second").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_routes_to_idle() {
        let fake = FakeRecommender::new(Err(RecommendationError::MissingCredential), Duration::ZERO);
        let machine = machine(&fake);

        let session = machine.submit("Anything").await.unwrap();
        assert_eq!(session.state, SearchState::Idle);
        assert!(session.auth_required);
        assert_eq!(session.error_message.as_deref(), Some(CREDENTIAL_FAILURE_MESSAGE));
        assert_eq!(machine.retry().await, Err(SubmitError::NothingToRetry));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_then_retry_resends_last_query() {
        let fake = FakeRecommender::new(
            Err(RecommendationError::MalformedResponse("expected value at line 1".into())),
            Duration::ZERO,
        );
        let machine = machine(&fake);

        let session = machine.submit("Urban Planning").await.unwrap();
        assert_eq!(session.state, SearchState::Error);
        assert_eq!(session.error_message.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
        assert!(session.results.is_empty());

        let mut events = machine.subscribe();
        let retried = machine.retry().await.unwrap();
        assert_eq!(retried.query, "Urban Planning");
        assert_eq!(retried.state, SearchState::Error);
        assert_eq!(events.recv().await.unwrap().state, SearchState::Searching);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_success_is_not_an_error() {
        let fake = FakeRecommender::new(Ok(vec![]), Duration::ZERO);
        let machine = machine(&fake);

        let session = machine.submit("Obscure topic").await.unwrap();
        assert_eq!(session.state, SearchState::Success);
        assert!(session.is_empty_success());
        assert_eq!(session.error_message, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmitting_same_query_repeats_transitions() {
        let fake = FakeRecommender::new(Ok(vec![result("Cosmos")]), Duration::ZERO);
        let machine = machine(&fake);
        let mut events = machine.subscribe();

        for _ in 0..2 {
            let session = machine.submit("Astronomy").await.unwrap();
            assert_eq!(session.state, SearchState::Success);
        }

        let states: Vec<SearchState> = (0..4).map(|_| events.try_recv().unwrap().state).collect();
        assert_eq!(
            states,
            vec![
                SearchState::Searching,
                SearchState::Success,
                SearchState::Searching,
                SearchState::Success
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_submission_clears_previous_error() {
        let fake = FakeRecommender::new(Err(RecommendationError::Timeout), Duration::ZERO);
        let machine = machine(&fake);
        machine.submit("First").await.unwrap();

        machine.begin("Second").unwrap();
        let session = machine.snapshot();
        assert_eq!(session.state, SearchState::Searching);
        assert_eq!(session.error_message, None);
        assert_eq!(session.query, "Second");
    }
}
