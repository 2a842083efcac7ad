//! Deterministic driver for reducer/effect pairs.
//!
//! The harness reduces synchronously, executes effects through the same
//! [`Scheduler`] as the production store, and queues effect-produced actions
//! for explicit draining instead of feeding them back automatically. Every
//! prediction failure is recorded with its source location and reported
//! together at [`TestStore::finish`]; execution continues with the actual
//! state so later assertions stay meaningful.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use unistore_core::reducer::Reducer;
use unistore_runtime::{ActionSink, EffectTracking, Scheduler};

/// How strictly the harness enforces its contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exhaustivity {
    /// Every predicted mutation is checked and [`TestStore::finish`] fails
    /// on unconsumed actions or effects still in flight. The default.
    #[default]
    Full,
    /// Predicted mutations are still checked, but leftovers at `finish` are
    /// tolerated.
    Partial,
    /// No state assertions at all; only the received action sequence shape
    /// is checked.
    Off,
}

/// One recorded assertion failure.
#[derive(Debug)]
pub struct TestFailure {
    message: String,
    location: &'static Location<'static>,
}

impl TestFailure {
    /// The failure description, with expected/actual values where relevant.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source location of the assertion that failed.
    #[must_use]
    pub const fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n  at {}", self.message, self.location)
    }
}

/// Queued-feedback sink: effect-produced actions wait here until the test
/// consumes them via `receive`/`skip_received`.
struct ReceivedQueue<A> {
    actions: Arc<Mutex<VecDeque<A>>>,
    notify: Arc<Notify>,
}

impl<A> ReceivedQueue<A> {
    fn new() -> Self {
        Self {
            actions: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn pop(&self) -> Option<A> {
        self.actions.lock().unwrap().pop_front()
    }

    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn drain(&self) -> Vec<A> {
        self.actions.lock().unwrap().drain(..).collect()
    }
}

impl<A> Clone for ReceivedQueue<A> {
    fn clone(&self) -> Self {
        Self {
            actions: Arc::clone(&self.actions),
            notify: Arc::clone(&self.notify),
        }
    }
}

impl<A> ActionSink<A> for ReceivedQueue<A>
where
    A: Send + 'static,
{
    fn deliver(&self, action: A) -> impl Future<Output = ()> + Send {
        let queue = self.clone();
        async move {
            #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
            queue.actions.lock().unwrap().push_back(action);
            queue.notify.notify_one();
        }
    }
}

/// Deterministic test harness around a reducer/effect pair.
///
/// ```ignore
/// let mut store = TestStore::new(SearchState::default(), SearchReducer, env);
///
/// store.send(SearchAction::Fetch, |_| {});
/// store
///     .receive(SearchAction::Loaded(42), |state| state.value = 42)
///     .await;
/// store.finish().await;
/// ```
///
/// Dropping a harness that recorded failures without calling
/// [`finish`](TestStore::finish) (or [`into_failures`]) panics, so missed
/// assertions cannot pass silently.
///
/// [`into_failures`]: TestStore::into_failures
pub struct TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: S,
    reducer: R,
    environment: E,
    scheduler: Scheduler<A>,
    tracking: EffectTracking,
    received: ReceivedQueue<A>,
    timeout: Duration,
    exhaustivity: Exhaustivity,
    failures: Vec<TestFailure>,
    finished: bool,
}

impl<S, A, E, R> TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
    S: Clone + PartialEq + fmt::Debug,
    A: PartialEq + fmt::Debug + Send + 'static,
{
    /// Create a harness with full exhaustivity and a 1 second receive
    /// timeout.
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self {
            state: initial_state,
            reducer,
            environment,
            scheduler: Scheduler::new(),
            tracking: EffectTracking::new(),
            received: ReceivedQueue::new(),
            timeout: Duration::from_secs(1),
            exhaustivity: Exhaustivity::Full,
            failures: Vec::new(),
            finished: false,
        }
    }

    /// Bound for `receive`, `skip_received`, `drain_effects`, and `finish`
    /// waits.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Relax or disable the harness's assertions.
    #[must_use]
    pub fn with_exhaustivity(mut self, exhaustivity: Exhaustivity) -> Self {
        self.exhaustivity = exhaustivity;
        self
    }

    /// The current (actual) state.
    #[must_use]
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// Failures recorded so far.
    #[must_use]
    pub fn failures(&self) -> &[TestFailure] {
        &self.failures
    }

    /// Consume the harness without reporting, returning recorded failures.
    ///
    /// Intended for tests *of* test tooling; ordinary tests end with
    /// [`finish`](TestStore::finish).
    #[must_use]
    pub fn into_failures(mut self) -> Vec<TestFailure> {
        self.finished = true;
        std::mem::take(&mut self.failures)
    }

    /// Apply the reducer to `action` and verify the state mutation.
    ///
    /// `expected` receives a clone of the prior state and must reproduce the
    /// mutation the reducer is expected to perform; a mismatch is recorded
    /// as a failure and execution continues with the actual state. Returned
    /// effects are scheduled immediately (a tokio runtime must be current).
    #[track_caller]
    pub fn send(&mut self, action: A, expected: impl FnOnce(&mut S)) {
        let location = Location::caller();
        tracing::debug!(action = ?action, "test store send");

        let mut predicted = self.state.clone();
        expected(&mut predicted);

        let effects = self.reducer.reduce(&mut self.state, action, &self.environment);
        for effect in effects {
            self.scheduler.run(effect, &self.tracking, &self.received);
        }

        self.check_state(&predicted, location);
    }

    /// Wait (bounded by the configured timeout) for an effect-produced
    /// action, assert it equals `expected`, reduce with it, and verify the
    /// state mutation.
    ///
    /// The reducer runs with the action that actually arrived even on
    /// mismatch, keeping the harness synchronized with real behavior.
    #[track_caller]
    pub async fn receive(&mut self, expected: A, expected_mutation: impl FnOnce(&mut S)) {
        let location = Location::caller();

        let Some(action) = self.next_action().await else {
            self.fail(
                format!(
                    "expected to receive {expected:?}, but no action arrived within {:?}",
                    self.timeout
                ),
                location,
            );
            return;
        };

        if action != expected {
            self.fail(
                format!("received unexpected action\nexpected: {expected:?}\n  actual: {action:?}"),
                location,
            );
        }

        let mut predicted = self.state.clone();
        expected_mutation(&mut predicted);

        let effects = self.reducer.reduce(&mut self.state, action, &self.environment);
        for effect in effects {
            self.scheduler.run(effect, &self.tracking, &self.received);
        }

        self.check_state(&predicted, location);
    }

    /// Consume and reduce `count` effect-produced actions without asserting
    /// on them.
    #[track_caller]
    pub async fn skip_received(&mut self, count: usize) {
        let location = Location::caller();

        for index in 0..count {
            let Some(action) = self.next_action().await else {
                self.fail(
                    format!(
                        "expected to skip {count} received action(s), but only {index} arrived"
                    ),
                    location,
                );
                return;
            };
            tracing::debug!(action = ?action, "skipping received action");

            let effects = self.reducer.reduce(&mut self.state, action, &self.environment);
            for effect in effects {
                self.scheduler.run(effect, &self.tracking, &self.received);
            }
        }
    }

    /// Wait (bounded) until no scheduled effects remain in flight.
    #[track_caller]
    pub async fn drain_effects(&mut self) {
        let location = Location::caller();

        if tokio::time::timeout(self.timeout, self.scheduler.settled())
            .await
            .is_err()
        {
            let pending = self.scheduler.pending();
            self.fail(
                format!("{pending} effect(s) still in flight after drain timeout"),
                location,
            );
        }
    }

    /// Assert exhaustiveness and report every recorded failure.
    ///
    /// Under [`Exhaustivity::Full`], effects still in flight after the
    /// timeout and unconsumed received actions are failures.
    ///
    /// # Panics
    ///
    /// Panics if any failure was recorded during the test.
    #[track_caller]
    #[allow(clippy::panic)] // The harness reports by panicking
    pub async fn finish(mut self) {
        let location = Location::caller();

        if tokio::time::timeout(self.timeout, self.scheduler.settled())
            .await
            .is_err()
        {
            let pending = self.scheduler.pending();
            if self.exhaustivity == Exhaustivity::Full {
                self.fail(format!("{pending} effect(s) still in flight at finish"), location);
            } else {
                tracing::debug!(pending, "effects still in flight at finish (non-exhaustive)");
            }
        }

        let leftovers = self.received.drain();
        if !leftovers.is_empty() {
            if self.exhaustivity == Exhaustivity::Full {
                self.fail(
                    format!(
                        "{} received action(s) were not consumed: {leftovers:?}",
                        leftovers.len()
                    ),
                    location,
                );
            } else {
                tracing::debug!(
                    count = leftovers.len(),
                    "unconsumed received actions (non-exhaustive)"
                );
            }
        }

        self.finished = true;
        if !self.failures.is_empty() {
            panic!(
                "test store finished with {} failure(s):\n\n{}",
                self.failures.len(),
                report(&self.failures)
            );
        }
    }

    async fn next_action(&self) -> Option<A> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            if let Some(action) = self.received.pop() {
                return Some(action);
            }

            let remaining = deadline.duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return self.received.pop();
            }

            let notified = self.received.notify.notified();
            if tokio::time::timeout(remaining, notified).await.is_err() {
                // Last look, in case the action landed on the deadline.
                return self.received.pop();
            }
        }
    }

    fn check_state(&mut self, predicted: &S, location: &'static Location<'static>) {
        if self.exhaustivity == Exhaustivity::Off {
            return;
        }
        if self.state != *predicted {
            let message = format!(
                "state mismatch\nexpected: {predicted:#?}\n  actual: {actual:#?}",
                actual = self.state
            );
            self.fail(message, location);
        }
    }

    fn fail(&mut self, message: String, location: &'static Location<'static>) {
        tracing::error!(%message, %location, "test store assertion failed");
        self.failures.push(TestFailure { message, location });
    }
}

impl<S, A, E, R> Drop for TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    #[allow(clippy::panic)] // The harness reports by panicking
    fn drop(&mut self) {
        if !self.finished && !self.failures.is_empty() && !std::thread::panicking() {
            panic!(
                "test store dropped with {} unreported failure(s); call finish():\n\n{}",
                self.failures.len(),
                report(&self.failures)
            );
        }
    }
}

fn report(failures: &[TestFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n\n")
}
