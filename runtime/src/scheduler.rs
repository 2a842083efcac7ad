//! Identity-based effect scheduling.
//!
//! The scheduler interprets [`Effect`] descriptions into running tokio tasks
//! with the cancellation and timing semantics the store promises:
//!
//! - at most one live execution per [`EffectId`] at any instant; scheduling
//!   under a live id aborts and supersedes the previous registration
//! - registrations are generation-stamped: a completion only dispatches if
//!   its captured generation is still the current one, so a late result from
//!   a superseded execution is discarded even when the abort lost the race.
//!   A cancelled-then-rescheduled id can never accept a stale result, which a
//!   plain boolean flag could not guarantee.
//! - debounce timers restart on every scheduling call under their id; only
//!   the most recent inner effect survives the quiet period
//! - throttle windows bound execution frequency per id, with the trailing
//!   edge coalescing to the latest call

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::AbortHandle;
use unistore_core::effect::{Effect, EffectId};

use crate::{DecrementGuard, EffectTracking};

/// Destination for actions produced by completed effects.
///
/// The production store feeds actions back into its own dispatch path; the
/// deterministic test harness queues them for explicit draining. Both run
/// effects through the same scheduler, so cancellation and timing semantics
/// cannot drift between production and tests.
pub trait ActionSink<A>: Clone + Send + Sync + 'static {
    /// Deliver one action produced by a completed effect.
    fn deliver(&self, action: A) -> impl Future<Output = ()> + Send;
}

/// Interprets effects into running work with identity-based cancellation,
/// debounce, and throttle semantics.
///
/// Cheap to clone; clones share the same registry and pending-work counter.
pub struct Scheduler<A> {
    inner: Arc<SchedulerInner<A>>,
}

struct SchedulerInner<A> {
    registry: Mutex<Registry<A>>,
    pending: AtomicUsize,
    idle: watch::Sender<()>,
}

struct Registry<A> {
    next_generation: u64,
    live: HashMap<EffectId, Registration>,
    windows: HashMap<EffectId, ThrottleWindow<A>>,
}

/// One live scheduled execution under an id.
struct Registration {
    generation: u64,
    abort: Option<AbortHandle>,
}

/// An open throttle window. The window's timer task is registered in `live`
/// under the same id, so cancel and supersede tear both down together.
struct ThrottleWindow<A> {
    trailing: Option<Stashed<A>>,
}

/// A trailing-edge effect held until its window closes, carrying the
/// completion tracking of the call that stashed it.
struct Stashed<A> {
    effect: Effect<A>,
    guard: DecrementGuard,
    pending: PendingGuard<A>,
}

/// RAII guard for the scheduler-wide pending-work counter.
struct PendingGuard<A> {
    inner: Arc<SchedulerInner<A>>,
}

impl<A> Drop for PendingGuard<A> {
    fn drop(&mut self) {
        if self.inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.inner.idle.send(());
        }
    }
}

impl<A> Clone for Scheduler<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> Default for Scheduler<A>
where
    A: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Scheduler<A>
where
    A: Send + 'static,
{
    /// Create a scheduler with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (idle, _) = watch::channel(());
        Self {
            inner: Arc::new(SchedulerInner {
                registry: Mutex::new(Registry {
                    next_generation: 0,
                    live: HashMap::new(),
                    windows: HashMap::new(),
                }),
                pending: AtomicUsize::new(0),
                idle,
            }),
        }
    }

    /// Number of scheduled executions currently in flight (running tasks,
    /// debounce timers, stashed trailing calls).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Wait until no scheduled executions remain in flight.
    pub async fn settled(&self) {
        let mut idle = self.inner.idle.subscribe();
        while self.pending() > 0 {
            if idle.changed().await.is_err() {
                break;
            }
        }
    }

    /// Cancel any in-flight execution registered under `id`.
    ///
    /// Tears down a live task or debounce timer and any open throttle window
    /// (including its stashed trailing call). A miss is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the registry mutex is poisoned.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn cancel(&self, id: &EffectId) {
        let (registration, window) = {
            let mut registry = self.inner.registry.lock().unwrap();
            (registry.live.remove(id), registry.windows.remove(id))
        };

        if registration.is_none() && window.is_none() {
            tracing::trace!(id = %id, "cancel for unknown id ignored");
            return;
        }

        metrics::counter!("store.effects.cancelled").increment(1);
        tracing::trace!(id = %id, "cancelled in-flight execution");

        if let Some(registration) = registration {
            if let Some(abort) = registration.abort {
                abort.abort();
            }
        }
        // Dropping the window releases any stashed trailing work.
        drop(window);
    }

    /// Interpret one effect, spawning whatever work it describes.
    ///
    /// Every spawned unit increments `tracking` (and the scheduler-wide
    /// pending count) before `run` returns, and decrements when it completes,
    /// is aborted, or is superseded.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, or if the registry mutex is
    /// poisoned.
    #[allow(clippy::too_many_lines)]
    #[tracing::instrument(skip_all, name = "run_effect")]
    pub fn run<K>(&self, effect: Effect<A>, tracking: &EffectTracking, sink: &K)
    where
        K: ActionSink<A>,
    {
        match effect {
            Effect::None => {
                tracing::trace!("no-op effect");
                metrics::counter!("store.effects.executed", "type" => "none").increment(1);
            },

            Effect::Task { id: None, future } => {
                metrics::counter!("store.effects.executed", "type" => "task").increment(1);
                tracking.increment();
                let guard = DecrementGuard::new(tracking.clone());
                let pending = self.begin_pending();
                let sink = sink.clone();

                tokio::spawn(async move {
                    let _guard = guard;
                    let _pending = pending;
                    Self::dispatch(future.await, &sink).await;
                });
            },

            Effect::Task {
                id: Some(id),
                future,
            } => {
                metrics::counter!("store.effects.executed", "type" => "task").increment(1);
                tracking.increment();
                let guard = DecrementGuard::new(tracking.clone());
                let pending = self.begin_pending();
                let generation = self.register(&id);
                let scheduler = self.clone();
                let sink = sink.clone();
                let task_id = id.clone();

                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    let _pending = pending;
                    let result = future.await;

                    // Identity check: only the current registration may
                    // dispatch. A superseded execution's result is discarded
                    // here even if it raced past its abort.
                    if !scheduler.complete(&task_id, generation) {
                        metrics::counter!("store.effects.discarded").increment(1);
                        tracing::trace!(id = %task_id, "discarding stale completion");
                        return;
                    }

                    Self::dispatch(result, &sink).await;
                });
                self.set_abort(&id, generation, handle.abort_handle());
            },

            Effect::FireAndForget(future) => {
                metrics::counter!("store.effects.executed", "type" => "fire_and_forget")
                    .increment(1);
                tracking.increment();
                let guard = DecrementGuard::new(tracking.clone());
                let pending = self.begin_pending();

                tokio::spawn(async move {
                    let _guard = guard;
                    let _pending = pending;
                    future.await;
                });
            },

            Effect::Merge(effects) => {
                metrics::counter!("store.effects.executed", "type" => "merge").increment(1);
                tracing::trace!(count = effects.len(), "merging effects");
                for effect in effects {
                    self.run(effect, tracking, sink);
                }
            },

            Effect::Cancel(id) => {
                metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                self.cancel(&id);
            },

            Effect::Debounce {
                id,
                duration,
                effect,
            } => {
                metrics::counter!("store.effects.executed", "type" => "debounce").increment(1);
                tracking.increment();
                let guard = DecrementGuard::new(tracking.clone());
                let pending = self.begin_pending();
                let generation = self.register(&id);
                let scheduler = self.clone();
                let sink = sink.clone();
                let timer_id = id.clone();

                let handle = tokio::spawn(async move {
                    let _pending = pending;
                    tokio::time::sleep(duration).await;

                    if !scheduler.complete(&timer_id, generation) {
                        tracing::trace!(id = %timer_id, "debounce superseded during quiet period");
                        return;
                    }

                    tracing::trace!(id = %timer_id, "debounce quiet period elapsed");
                    scheduler.run(*effect, guard.tracking(), &sink);
                });
                self.set_abort(&id, generation, handle.abort_handle());
            },

            Effect::Throttle {
                id,
                duration,
                policy,
                effect,
            } => {
                metrics::counter!("store.effects.executed", "type" => "throttle").increment(1);

                #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
                let leading = {
                    let mut registry = self.inner.registry.lock().unwrap();

                    if let Some(window) = registry.windows.get_mut(&id) {
                        if policy.fires_trailing() {
                            // Latest call wins the trailing edge.
                            tracing::trace!(id = %id, "coalescing call into open throttle window");
                            let replaced = window.trailing.replace(self.stash(*effect, tracking));
                            drop(replaced);
                        } else {
                            tracing::trace!(id = %id, "dropping call inside throttle window");
                        }
                        None
                    } else {
                        let generation = registry.register(&id);
                        let run_now = if policy.fires_leading() {
                            registry
                                .windows
                                .insert(id.clone(), ThrottleWindow { trailing: None });
                            Some(effect)
                        } else {
                            let stashed = self.stash(*effect, tracking);
                            registry.windows.insert(
                                id.clone(),
                                ThrottleWindow {
                                    trailing: Some(stashed),
                                },
                            );
                            None
                        };

                        let scheduler = self.clone();
                        let sink = sink.clone();
                        let window_id = id.clone();
                        let handle = tokio::spawn(async move {
                            tokio::time::sleep(duration).await;
                            if let Some(stashed) = scheduler.close_window(&window_id, generation)
                            {
                                tracing::trace!(id = %window_id, "throttle window closed; firing trailing call");
                                let Stashed {
                                    effect,
                                    guard,
                                    pending,
                                } = stashed;
                                scheduler.run(effect, guard.tracking(), &sink);
                                drop(guard);
                                drop(pending);
                            }
                        });
                        if let Some(entry) = registry.live.get_mut(&id) {
                            if entry.generation == generation {
                                entry.abort = Some(handle.abort_handle());
                            }
                        }
                        run_now
                    }
                };

                if let Some(effect) = leading {
                    tracing::trace!(id = %id, "throttle leading edge");
                    self.run(*effect, tracking, sink);
                }
            },
        }
    }

    /// Send an optional produced action to the sink; failures are dropped.
    async fn dispatch<K>(result: Result<Option<A>, unistore_core::EffectError>, sink: &K)
    where
        K: ActionSink<A>,
    {
        match result {
            Ok(Some(action)) => sink.deliver(action).await,
            Ok(None) => tracing::trace!("task completed with no action"),
            Err(error) => {
                metrics::counter!("store.effects.failed").increment(1);
                tracing::warn!(%error, "effect task failed; dropping");
            },
        }
    }

    /// Hold a trailing-edge effect, keeping its caller's tracking and the
    /// pending count alive until the window closes.
    fn stash(&self, effect: Effect<A>, tracking: &EffectTracking) -> Stashed<A> {
        tracking.increment();
        Stashed {
            effect,
            guard: DecrementGuard::new(tracking.clone()),
            pending: self.begin_pending(),
        }
    }

    fn begin_pending(&self) -> PendingGuard<A> {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        PendingGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Register a new execution under `id`, superseding any live one.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn register(&self, id: &EffectId) -> u64 {
        let mut registry = self.inner.registry.lock().unwrap();
        registry.register(id)
    }

    /// Attach the abort handle to a registration, unless it was already
    /// superseded.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn set_abort(&self, id: &EffectId, generation: u64, abort: AbortHandle) {
        let mut registry = self.inner.registry.lock().unwrap();
        if let Some(entry) = registry.live.get_mut(id) {
            if entry.generation == generation {
                entry.abort = Some(abort);
            }
        }
    }

    /// Deregister iff `generation` is still current. Returns whether the
    /// caller owns the completion and may dispatch.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn complete(&self, id: &EffectId, generation: u64) -> bool {
        let mut registry = self.inner.registry.lock().unwrap();
        if registry
            .live
            .get(id)
            .is_some_and(|entry| entry.generation == generation)
        {
            registry.live.remove(id);
            true
        } else {
            false
        }
    }

    /// Close a throttle window, returning its trailing call if the window is
    /// still the current registration under the id.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn close_window(&self, id: &EffectId, generation: u64) -> Option<Stashed<A>> {
        let mut registry = self.inner.registry.lock().unwrap();
        if !registry
            .live
            .get(id)
            .is_some_and(|entry| entry.generation == generation)
        {
            // Superseded or cancelled; the teardown already happened.
            return None;
        }
        registry.live.remove(id);
        registry.windows.remove(id).and_then(|window| window.trailing)
    }
}

impl<A> Registry<A> {
    /// Supersede any live execution (and stale window) under `id` and claim
    /// a fresh generation for the caller.
    fn register(&mut self, id: &EffectId) -> u64 {
        if let Some(previous) = self.live.remove(id) {
            metrics::counter!("store.effects.superseded").increment(1);
            tracing::trace!(id = %id, "superseding live execution");
            if let Some(abort) = previous.abort {
                abort.abort();
            }
        }
        let stale_window = self.windows.remove(id);
        drop(stale_window);

        self.next_generation += 1;
        let generation = self.next_generation;
        self.live.insert(
            id.clone(),
            Registration {
                generation,
                abort: None,
            },
        );
        generation
    }
}
