//! The Store: serialized dispatch, state publication, effect lifecycle.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, broadcast, watch};
use unistore_core::middleware::Middleware;
use unistore_core::reducer::Reducer;

use crate::error::StoreError;
use crate::scheduler::{ActionSink, Scheduler};
use crate::scope::ScopedStore;
use crate::{EffectHandle, EffectTracking};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the effect-produced action broadcast channel.
    pub broadcast_capacity: usize,
    /// How long [`Store::shutdown`] waits for in-flight effects.
    pub shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Create a configuration with custom values.
    #[must_use]
    pub const fn new(broadcast_capacity: usize, shutdown_timeout: Duration) -> Self {
        Self {
            broadcast_capacity,
            shutdown_timeout,
        }
    }

    /// Set the action broadcast capacity.
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the shutdown timeout.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// The runtime coordinator for one reducer.
///
/// The store owns:
///
/// 1. the current state (behind a FIFO-fair write lock: dispatch is
///    serialized in call order, and the reducer is never invoked concurrently
///    with itself)
/// 2. the middleware pipeline run ahead of every reducer invocation
/// 3. the [`Scheduler`] interpreting returned effects
/// 4. the observation channels: a state watch (notified once per accepted
///    action, after the new state is fully committed, with equal states
///    deduplicated) and a broadcast of effect-produced actions
///
/// Actions produced by completed effects re-enter [`send`] and take the same
/// middleware + reducer path as externally sent actions.
///
/// Cloning a store is cheap and shares all of the above.
///
/// [`send`]: Store::send
///
/// # Example
///
/// ```ignore
/// let store = Store::new(CounterState::default(), CounterReducer, env);
///
/// store.send(CounterAction::Increment).await?;
/// let count = store.state(|s| s.count).await;
/// ```
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: Arc<RwLock<S>>,
    reducer: Arc<R>,
    environment: Arc<E>,
    middleware: Vec<Arc<dyn Middleware<S, A>>>,
    scheduler: Scheduler<A>,
    shutdown: Arc<AtomicBool>,
    shutdown_timeout: Duration,
    state_watch: watch::Sender<S>,
    action_broadcast: broadcast::Sender<A>,
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Send + Sync + 'static,
    A: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Create a store with the default configuration.
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_config(initial_state, reducer, environment, StoreConfig::default())
    }

    /// Create a store with a custom configuration.
    #[must_use]
    pub fn with_config(initial_state: S, reducer: R, environment: E, config: StoreConfig) -> Self {
        let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity);
        let (state_watch, _) = watch::channel(initial_state.clone());

        Self {
            state: Arc::new(RwLock::new(initial_state)),
            reducer: Arc::new(reducer),
            environment: Arc::new(environment),
            middleware: Vec::new(),
            scheduler: Scheduler::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_timeout: config.shutdown_timeout,
            state_watch,
            action_broadcast,
        }
    }

    /// Append a middleware stage. Stages run in registration order.
    #[must_use]
    pub fn with_middleware(mut self, stage: Arc<dyn Middleware<S, A>>) -> Self {
        self.middleware.push(stage);
        self
    }

    /// Dispatch one action.
    ///
    /// The action runs through the middleware pipeline, then the reducer;
    /// the committed state is published to subscribers and every returned
    /// effect is handed to the scheduler. Dispatch is serialized: a reducer
    /// invocation always sees the state left by the immediately preceding
    /// accepted action.
    ///
    /// Returns a handle resolving once every effect scheduled by this action
    /// has settled. A swallowed action returns an already-completed handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`] began.
    /// Effect failures never surface here; they are governed by the effect's
    /// own failure policy.
    ///
    /// [`shutdown`]: Store::shutdown
    pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
        if self.shutdown.load(Ordering::Acquire) {
            tracing::warn!("rejected action: store is shutting down");
            metrics::counter!("store.shutdown.rejected_actions").increment(1);
            return Err(StoreError::ShutdownInProgress);
        }

        metrics::counter!("store.actions.total").increment(1);

        let tracking = EffectTracking::new();

        let effects = {
            let mut state = self.state.write().await;

            let Some(action) = self.run_pipeline(action, &state) else {
                tracing::debug!("action swallowed by middleware");
                metrics::counter!("store.actions.swallowed").increment(1);
                return Ok(EffectHandle::completed());
            };

            let span = tracing::debug_span!("reducer_execution");
            let _enter = span.enter();

            let observed = if self.middleware.is_empty() {
                None
            } else {
                Some(action.clone())
            };

            let start = std::time::Instant::now();
            let effects = self
                .reducer
                .reduce(&mut *state, action, &self.environment);
            metrics::histogram!("store.reducer.duration_seconds")
                .record(start.elapsed().as_secs_f64());
            tracing::trace!(effects = effects.len(), "reducer completed");

            // Publish the committed snapshot; an unchanged state notifies
            // nobody.
            self.state_watch.send_if_modified(|current| {
                if *current == *state {
                    false
                } else {
                    current.clone_from(&*state);
                    true
                }
            });

            if let Some(action) = &observed {
                for stage in &self.middleware {
                    stage.after_reduce(action, &state);
                }
            }

            effects
        };

        for effect in effects {
            self.scheduler.run(effect, &tracking, self);
        }

        Ok(tracking.handle())
    }

    /// Read current state via a closure, releasing the lock promptly.
    ///
    /// ```ignore
    /// let count = store.state(|s| s.count).await;
    /// ```
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.state.read().await;
        f(&state)
    }

    /// Subscribe to state changes.
    ///
    /// The receiver holds the latest committed snapshot; it is notified once
    /// per accepted action that actually changed the state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.state_watch.subscribe()
    }

    /// Subscribe to actions produced by effects.
    ///
    /// Only effect-produced actions are broadcast, not the actions sent
    /// directly via [`send`](Store::send).
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.action_broadcast.subscribe()
    }

    /// Send an action and wait for an effect-produced action matching the
    /// predicate.
    ///
    /// Subscribes before sending, so a fast completion cannot be missed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ShutdownInProgress`]: the store is shutting down
    /// - [`StoreError::Timeout`]: no matching action within `timeout`
    /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
    pub async fn send_and_wait_for<F>(
        &self,
        action: A,
        timeout: Duration,
        mut matches: F,
    ) -> Result<A, StoreError>
    where
        F: FnMut(&A) -> bool,
    {
        let mut receiver = self.action_broadcast.subscribe();
        let _ = self.send(action).await?;

        let result = tokio::time::timeout(timeout, async {
            loop {
                match receiver.recv().await {
                    Ok(candidate) => {
                        if matches(&candidate) {
                            return Ok(candidate);
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "action observer lagged; continuing");
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(StoreError::ChannelClosed);
                    },
                }
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    /// Stop accepting actions and wait for in-flight effects to settle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] with the number of effects
    /// still running if the configured timeout expires first.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.shutdown.store(true, Ordering::Release);
        tracing::info!("store shutdown initiated");

        if tokio::time::timeout(self.shutdown_timeout, self.scheduler.settled())
            .await
            .is_err()
        {
            let remaining = self.scheduler.pending();
            tracing::warn!(remaining, "shutdown timed out with effects still running");
            return Err(StoreError::ShutdownTimeout(remaining));
        }

        tracing::info!("store shutdown complete");
        Ok(())
    }

    /// Derive a store-shaped view over a projection of this store.
    ///
    /// `state` projects the parent state into the child's; `embed` lifts
    /// child actions into parent actions. The scope runs no reducer and no
    /// scheduler of its own; all execution happens here, in the parent.
    #[must_use]
    pub fn scope<CS, CA>(
        &self,
        state: impl Fn(&S) -> CS + Send + Sync + 'static,
        embed: impl Fn(CA) -> A + Send + Sync + 'static,
    ) -> ScopedStore<S, A, E, R, CS, CA>
    where
        CS: 'static,
        CA: 'static,
    {
        ScopedStore::new(self.clone(), Arc::new(state), Arc::new(embed))
    }

    /// Run the middleware pipeline; `None` means the action was swallowed
    /// and the reducer must not run.
    fn run_pipeline(&self, action: A, state: &S) -> Option<A> {
        let mut action = action;
        for stage in &self.middleware {
            action = stage.handle(action, state)?;
        }
        Some(action)
    }
}

impl<S, A, E, R> ActionSink<A> for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Send + Sync + 'static,
    A: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    fn deliver(&self, action: A) -> impl Future<Output = ()> + Send {
        let store = self.clone();
        async move {
            // Effect-produced actions are observable before they re-enter
            // the serialized dispatch path.
            let _ = store.action_broadcast.send(action.clone());
            if let Err(error) = store.send(action).await {
                tracing::debug!(%error, "dropping effect-produced action");
            }
        }
    }
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            reducer: Arc::clone(&self.reducer),
            environment: Arc::clone(&self.environment),
            middleware: self.middleware.clone(),
            scheduler: self.scheduler.clone(),
            shutdown: Arc::clone(&self.shutdown),
            shutdown_timeout: self.shutdown_timeout,
            state_watch: self.state_watch.clone(),
            action_broadcast: self.action_broadcast.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code may unwrap
mod tests {
    use super::*;
    use unistore_core::effect::Effect;
    use unistore_core::reducer::Effects;
    use unistore_core::{ActionHistory, smallvec};

    #[derive(Debug, Clone, PartialEq)]
    struct TestState {
        value: i32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        Increment,
        Decrement,
        NoOp,
        ProduceEffect,
        ProduceMergedEffects,
    }

    #[derive(Debug, Clone)]
    struct TestEnv;

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Effects<Self::Action> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![]
                },
                TestAction::Decrement => {
                    state.value -= 1;
                    smallvec![]
                },
                TestAction::NoOp => smallvec![Effect::none()],
                TestAction::ProduceEffect => {
                    smallvec![Effect::task(async { Some(TestAction::Increment) })]
                },
                TestAction::ProduceMergedEffects => {
                    smallvec![Effect::merge(vec![
                        Effect::task(async { Some(TestAction::Increment) }),
                        Effect::task(async { Some(TestAction::Increment) }),
                        Effect::task(async { Some(TestAction::Decrement) }),
                    ])]
                },
            }
        }
    }

    fn store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState { value: 0 }, TestReducer, TestEnv)
    }

    #[tokio::test]
    async fn send_applies_the_reducer() {
        let store = store();

        let _ = store.send(TestAction::Increment).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn actions_are_processed_in_call_order() {
        let store = store();

        let _ = store.send(TestAction::Increment).await.unwrap();
        let _ = store.send(TestAction::Increment).await.unwrap();
        let _ = store.send(TestAction::Decrement).await.unwrap();

        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn effect_produced_actions_feed_back_into_dispatch() {
        let store = store();

        let mut handle = store.send(TestAction::ProduceEffect).await.unwrap();
        handle.wait().await;
        // The feedback send itself completed before deliver() returned.
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn merged_effects_all_complete() {
        let store = store();

        let mut handle = store.send(TestAction::ProduceMergedEffects).await.unwrap();
        handle.wait().await;
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn state_watch_publishes_committed_snapshots() {
        let store = store();
        let mut receiver = store.subscribe();
        assert_eq!(receiver.borrow().value, 0);

        let _ = store.send(TestAction::Increment).await.unwrap();
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow_and_update().value, 1);
    }

    #[tokio::test]
    async fn unchanged_state_notifies_nobody() {
        let store = store();
        let mut receiver = store.subscribe();
        let _ = receiver.borrow_and_update();

        let _ = store.send(TestAction::NoOp).await.unwrap();
        assert!(!receiver.has_changed().unwrap());
    }

    #[tokio::test]
    async fn effect_actions_are_broadcast_to_observers() {
        let store = store();
        let mut actions = store.subscribe_actions();

        let mut handle = store.send(TestAction::ProduceEffect).await.unwrap();
        handle.wait().await;

        assert_eq!(actions.recv().await.unwrap(), TestAction::Increment);
    }

    #[tokio::test]
    async fn send_and_wait_for_matches_feedback() {
        let store = store();

        let received = store
            .send_and_wait_for(TestAction::ProduceEffect, Duration::from_secs(1), |a| {
                *a == TestAction::Increment
            })
            .await
            .unwrap();
        assert_eq!(received, TestAction::Increment);
    }

    #[tokio::test(start_paused = true)]
    async fn send_and_wait_for_times_out() {
        let store = store();

        let result = store
            .send_and_wait_for(TestAction::NoOp, Duration::from_millis(50), |_| true)
            .await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn shutdown_rejects_subsequent_sends() {
        let store = store();
        store.shutdown().await.unwrap();

        let result = store.send(TestAction::Increment).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    }

    // Middleware behavior

    struct Swallow;

    impl Middleware<TestState, TestAction> for Swallow {
        fn handle(&self, _action: TestAction, _state: &TestState) -> Option<TestAction> {
            None
        }
    }

    struct InvertSign;

    impl Middleware<TestState, TestAction> for InvertSign {
        fn handle(&self, action: TestAction, _state: &TestState) -> Option<TestAction> {
            Some(match action {
                TestAction::Increment => TestAction::Decrement,
                TestAction::Decrement => TestAction::Increment,
                other => other,
            })
        }
    }

    #[tokio::test]
    async fn swallowing_middleware_blocks_the_reducer() {
        let store = store().with_middleware(Arc::new(Swallow));

        let mut handle = store.send(TestAction::ProduceEffect).await.unwrap();
        handle.wait().await;

        // No state change and no scheduled effect for any action.
        assert_eq!(store.state(|s| s.value).await, 0);
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test]
    async fn transforming_middleware_rewrites_the_action() {
        let store = store().with_middleware(Arc::new(InvertSign));

        let _ = store.send(TestAction::Increment).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, -1);
    }

    #[tokio::test]
    async fn history_middleware_records_action_and_resulting_state() {
        let history = Arc::new(ActionHistory::new());
        let store =
            store().with_middleware(Arc::clone(&history) as Arc<dyn Middleware<_, _>>);

        let _ = store.send(TestAction::Increment).await.unwrap();
        let _ = store.send(TestAction::Increment).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(
            history.entry(1),
            Some((TestAction::Increment, TestState { value: 2 }))
        );
    }
}
