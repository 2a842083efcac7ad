//! # Counter Demo
//!
//! A pure state machine on top of the unistore architecture: every action
//! mutates state and schedules no effects. The clock dependency comes in
//! through the environment, so tests pin time with a fixed clock.
//!
//! ## Example
//!
//! ```no_run
//! use counter::{CounterState, CounterAction, CounterReducer, CounterEnvironment};
//! use unistore_runtime::Store;
//! use unistore_testing::test_clock;
//!
//! # async fn example() {
//! let env = CounterEnvironment::new(test_clock());
//! let store = Store::new(CounterState::default(), CounterReducer::new(), env);
//!
//! let _ = store.send(CounterAction::Increment).await;
//! assert_eq!(store.state(|s| s.count).await, 1);
//! # }
//! ```

use unistore_core::environment::Clock;
use unistore_core::reducer::{Effects, Reducer};
use unistore_core::{DateTime, Utc, smallvec};

/// Counter state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CounterState {
    /// Current count value.
    pub count: i64,
    /// When the count last changed.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Counter actions.
#[derive(Debug, Clone, PartialEq)]
pub enum CounterAction {
    /// Increment the counter by 1.
    Increment,
    /// Decrement the counter by 1.
    Decrement,
    /// Reset the counter to 0.
    Reset,
}

/// Counter environment: just a clock.
#[derive(Debug, Clone)]
pub struct CounterEnvironment<C: Clock> {
    /// Source of timestamps for `updated_at`.
    pub clock: C,
}

impl<C: Clock> CounterEnvironment<C> {
    /// Create an environment with the given clock.
    #[must_use]
    pub const fn new(clock: C) -> Self {
        Self { clock }
    }
}

/// The counter's business logic.
///
/// Generic over the clock so production and tests share one reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterReducer<C> {
    _clock: std::marker::PhantomData<C>,
}

impl<C> CounterReducer<C> {
    /// Create a counter reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _clock: std::marker::PhantomData,
        }
    }
}

impl<C: Clock> Reducer for CounterReducer<C> {
    type State = CounterState;
    type Action = CounterAction;
    type Environment = CounterEnvironment<C>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            CounterAction::Increment => state.count += 1,
            CounterAction::Decrement => state.count -= 1,
            CounterAction::Reset => state.count = 0,
        }
        state.updated_at = Some(env.clock.now());
        smallvec![]
    }
}
