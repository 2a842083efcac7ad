//! # Search Demo
//!
//! Debounced, cancellable search on top of the unistore architecture.
//!
//! Every keystroke dispatches [`SearchAction::QueryChanged`]. The reducer
//! debounces the lookup under a single effect id, and the lookup itself is
//! cancellable under the same id, so a burst of keystrokes runs one search,
//! and a newer search supersedes an in-flight one. Results from superseded
//! lookups never reach the state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use unistore_core::effect::{Effect, EffectError};
use unistore_core::reducer::{Effects, Reducer};
use unistore_core::smallvec;

/// Effect id shared by the debounce window and the lookup itself.
const SEARCH_ID: &str = "search";

/// Searchable backend.
pub trait SearchClient: Send + Sync {
    /// Look up entries matching `query`.
    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<String>, EffectError>> + Send;
}

/// In-memory catalog with simulated latency.
#[derive(Clone)]
pub struct CatalogClient {
    entries: Arc<Vec<String>>,
    latency: Duration,
}

impl CatalogClient {
    /// Create a catalog over the given entries.
    #[must_use]
    pub fn new(entries: Vec<String>, latency: Duration) -> Self {
        Self {
            entries: Arc::new(entries),
            latency,
        }
    }
}

impl SearchClient for CatalogClient {
    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<String>, EffectError>> + Send {
        let entries = Arc::clone(&self.entries);
        let latency = self.latency;
        let query = query.to_owned();

        async move {
            tokio::time::sleep(latency).await;
            Ok(entries
                .iter()
                .filter(|entry| entry.contains(&query))
                .cloned()
                .collect())
        }
    }
}

/// Search state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchState {
    /// The latest query the user typed.
    pub query: String,
    /// Results for the last completed lookup.
    pub results: Vec<String>,
    /// Which query the current results belong to.
    pub results_for: Option<String>,
}

/// Search actions.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchAction {
    /// The user edited the query.
    QueryChanged(String),
    /// A lookup completed.
    ResultsLoaded {
        /// The query the lookup ran for.
        query: String,
        /// Matching entries.
        results: Vec<String>,
    },
}

/// Search environment.
#[derive(Clone)]
pub struct SearchEnvironment<C> {
    /// Backend to query.
    pub client: C,
    /// Quiet period before a lookup fires.
    pub debounce: Duration,
}

/// The search feature's business logic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchReducer<C> {
    _client: std::marker::PhantomData<C>,
}

impl<C> SearchReducer<C> {
    /// Create a search reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _client: std::marker::PhantomData,
        }
    }
}

impl<C> Reducer for SearchReducer<C>
where
    C: SearchClient + Clone + 'static,
{
    type State = SearchState;
    type Action = SearchAction;
    type Environment = SearchEnvironment<C>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            SearchAction::QueryChanged(query) => {
                state.query.clone_from(&query);

                if query.is_empty() {
                    // Nothing to look up; drop any in-flight search as well.
                    state.results.clear();
                    state.results_for = None;
                    return smallvec![Effect::cancel(SEARCH_ID)];
                }

                let client = env.client.clone();
                smallvec![Effect::debounce(
                    SEARCH_ID,
                    env.debounce,
                    Effect::try_cancellable(SEARCH_ID, async move {
                        let results = client.search(&query).await?;
                        Ok(Some(SearchAction::ResultsLoaded { query, results }))
                    }),
                )]
            },
            SearchAction::ResultsLoaded { query, results } => {
                state.results = results;
                state.results_for = Some(query);
                smallvec![]
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_clears_results_and_cancels() {
        let env = SearchEnvironment {
            client: CatalogClient::new(vec![], Duration::ZERO),
            debounce: Duration::from_millis(300),
        };
        let reducer = SearchReducer::new();
        let mut state = SearchState {
            query: "old".to_owned(),
            results: vec!["old result".to_owned()],
            results_for: Some("old".to_owned()),
        };

        let mut effects =
            reducer.reduce(&mut state, SearchAction::QueryChanged(String::new()), &env);

        assert!(state.results.is_empty());
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            effects.pop(),
            Some(Effect::Cancel(id)) if id.as_str() == SEARCH_ID
        ));
    }

    #[test]
    fn query_change_schedules_a_debounced_lookup() {
        let env = SearchEnvironment {
            client: CatalogClient::new(vec![], Duration::ZERO),
            debounce: Duration::from_millis(300),
        };
        let reducer = SearchReducer::new();
        let mut state = SearchState::default();

        let mut effects =
            reducer.reduce(&mut state, SearchAction::QueryChanged("rust".to_owned()), &env);

        assert_eq!(state.query, "rust");
        assert!(matches!(
            effects.pop(),
            Some(Effect::Debounce { id, duration, .. })
                if id.as_str() == SEARCH_ID && duration == env.debounce
        ));
    }
}
