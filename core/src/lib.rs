//! # Unistore Core
//!
//! Core traits and types for the unistore architecture: a unidirectional
//! state-management engine built around pure reducers and declarative
//! effects.
//!
//! ## Core Concepts
//!
//! - **State**: value-semantics snapshot owned by a store
//! - **Action**: closed enum describing one discrete event
//! - **Reducer**: pure function `(State, Action, Environment) → Effects`
//! - **Effect**: inert description of asynchronous work and its cancellation
//!   identity ([`EffectId`])
//! - **Middleware**: ordered, short-circuitable action interception
//! - **Environment**: dependencies injected explicitly, never ambient
//!
//! This crate holds only types and pure composition; execution (the store,
//! the cancellation/debounce/throttle scheduler) lives in the runtime crate,
//! and the deterministic test harness in the testing crate.
//!
//! ## Example
//!
//! ```ignore
//! use unistore_core::{Effect, Effects, Reducer, smallvec};
//!
//! #[derive(Clone, Debug, PartialEq, Default)]
//! struct SearchState {
//!     query: String,
//!     results: Vec<String>,
//! }
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum SearchAction {
//!     QueryChanged(String),
//!     ResultsLoaded(Vec<String>),
//! }
//!
//! impl Reducer for SearchReducer {
//!     type State = SearchState;
//!     type Action = SearchAction;
//!     type Environment = SearchEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut SearchState,
//!         action: SearchAction,
//!         env: &SearchEnvironment,
//!     ) -> Effects<SearchAction> {
//!         match action {
//!             SearchAction::QueryChanged(query) => {
//!                 state.query = query.clone();
//!                 let client = env.client.clone();
//!                 smallvec![Effect::debounce(
//!                     "search",
//!                     env.debounce_interval,
//!                     Effect::cancellable("search", async move {
//!                         client.search(&query).await.map(SearchAction::ResultsLoaded)
//!                     }),
//!                 )]
//!             }
//!             SearchAction::ResultsLoaded(results) => {
//!                 state.results = results;
//!                 smallvec![]
//!             }
//!         }
//!     }
//! }
//! ```

/// Effect descriptions and identity tokens.
pub mod effect;

/// The Reducer trait.
pub mod reducer;

/// Reducer composition: combine and pullback.
pub mod composition;

/// Action interception ahead of the reducer.
pub mod middleware;

/// Dependency injection traits.
pub mod environment;

mod effect_macros;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use effect::{Effect, EffectError, EffectId, ThrottlePolicy};
pub use middleware::{ActionHistory, Middleware};
pub use reducer::{Effects, Reducer};
pub use smallvec::{SmallVec, smallvec};
