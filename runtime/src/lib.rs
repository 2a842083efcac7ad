//! # Unistore Runtime
//!
//! Runtime for the unistore architecture.
//!
//! This crate interprets the inert descriptions from `unistore-core`:
//!
//! - **[`Store`]**: the serialized dispatch loop: middleware pipeline, reducer,
//!   state publication, and the feedback path for effect-produced actions
//! - **[`Scheduler`]**: identity-based effect execution (cancellation,
//!   debounce, throttle) with generation-stamped registrations so stale
//!   completions are discarded
//! - **[`ScopedStore`]**: a store-shaped view over a projection of a parent
//!
//! ## Example
//!
//! ```ignore
//! use unistore_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action; the returned handle resolves when its effects finish.
//! let handle = store.send(Action::Refresh).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;

/// Identity-based effect scheduling: cancellation, debounce, throttle.
pub mod scheduler;

/// A store-shaped view over a projection of a parent store.
pub mod scope;

/// The Store: serialized dispatch and state publication.
pub mod store;

/// Error types for the Store runtime.
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations.
    ///
    /// Effect execution failures are deliberately absent: a failed effect
    /// task is logged and dropped by the scheduler, never surfaced here.
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions.
        #[error("store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for in-flight effects to complete.
        #[error("shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// A bounded wait expired before a matching action was received.
        #[error("timeout waiting for action")]
        Timeout,

        /// The observed channel closed, typically because the store is
        /// shutting down.
        #[error("action channel closed")]
        ChannelClosed,
    }
}

/// Producer side of effect-completion tracking.
///
/// One tracking value is created per dispatched action; every effect spawned
/// for that action increments it and decrements on completion. [`handle`]
/// hands out the consumer side for waiting.
///
/// [`handle`]: EffectTracking::handle
#[derive(Clone, Debug)]
pub struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    /// Create a tracking context with no in-flight effects.
    #[must_use]
    pub fn new() -> Self {
        let (notifier, _) = watch::channel(());
        Self {
            counter: Arc::new(AtomicUsize::new(0)),
            notifier,
        }
    }

    /// A handle that resolves once every tracked effect has completed.
    #[must_use]
    pub fn handle(&self) -> EffectHandle {
        EffectHandle {
            effects: Arc::clone(&self.counter),
            completion: self.notifier.subscribe(),
        }
    }

    /// Record one effect starting.
    pub(crate) fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one effect finishing; wakes waiters when none remain.
    pub(crate) fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

impl Default for EffectTracking {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for waiting on effect completion.
///
/// Returned by [`store::Store::send`]: the handle resolves once every effect
/// scheduled by that action has completed, been cancelled, or been
/// superseded.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now settled.
/// ```
#[derive(Clone, Debug)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// A handle that is already complete.
    ///
    /// Useful as the initial value when folding over sends in a loop, and
    /// returned for actions that scheduled nothing.
    #[must_use]
    pub fn completed() -> Self {
        EffectTracking::new().handle()
    }

    /// Number of tracked effects still in flight.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait until every tracked effect has completed.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Producer side dropped; nothing can increment any more.
                if self.effects.load(Ordering::SeqCst) == 0 {
                    break;
                }
                return;
            }
        }
    }

    /// Wait until every tracked effect has completed, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`error::StoreError::Timeout`] if effects are still in flight
    /// when the timeout expires.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), error::StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| error::StoreError::Timeout)
    }
}

/// RAII guard that decrements an [`EffectTracking`] counter on drop.
///
/// Ensures the counter is decremented even if the owning task is aborted or
/// panics mid-effect.
pub(crate) struct DecrementGuard(EffectTracking);

impl DecrementGuard {
    pub(crate) const fn new(tracking: EffectTracking) -> Self {
        Self(tracking)
    }

    pub(crate) const fn tracking(&self) -> &EffectTracking {
        &self.0
    }
}

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

// Re-export for convenience
pub use error::StoreError;
pub use scheduler::{ActionSink, Scheduler};
pub use scope::{ScopedStateReceiver, ScopedStore};
pub use store::{Store, StoreConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_handle_resolves_immediately() {
        let mut handle = EffectHandle::completed();
        assert_eq!(handle.pending(), 0);
        handle.wait().await;
    }

    #[tokio::test]
    async fn handle_waits_for_tracked_work() {
        let tracking = EffectTracking::new();
        tracking.increment();
        let mut handle = tracking.handle();
        assert_eq!(handle.pending(), 1);

        let waiter = {
            let mut handle = handle.clone();
            tokio::spawn(async move { handle.wait().await })
        };

        tracking.decrement();
        waiter.await.ok();
        handle.wait().await;
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_wait_times_out_while_work_is_pending() {
        let tracking = EffectTracking::new();
        tracking.increment();
        let mut handle = tracking.handle();

        let result = handle.wait_with_timeout(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(StoreError::Timeout)));
        tracking.decrement();
    }
}
