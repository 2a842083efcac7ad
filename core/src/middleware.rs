//! Ordered action interception ahead of the reducer.
//!
//! A store runs its middleware stages in registration order before every
//! reducer invocation. The pipeline is an explicit ordered list iterated by
//! index: a stage continues the pipeline by returning the (possibly
//! transformed) action, and swallows it by returning `None`. Calling "next"
//! more than once is therefore unrepresentable rather than undefined
//! behavior.

use std::sync::Mutex;

/// One stage of a store's interception pipeline.
///
/// Stages may inspect the action and the current state, transform the action,
/// or swallow it entirely. Side effects performed directly inside a stage
/// (logging, recording) are fire-and-forget with respect to the store's
/// guarantees: they participate in neither cancellation nor ordering.
pub trait Middleware<S, A>: Send + Sync {
    /// Inspect an action before the reducer runs.
    ///
    /// Return `Some(action)` to hand it to the next stage (or, for the last
    /// stage, the reducer). Return `None` to swallow it: the reducer does not
    /// run, no state change is published, and no effect is scheduled.
    fn handle(&self, action: A, state: &S) -> Option<A>;

    /// Observe the committed state after the reducer ran for `action`.
    ///
    /// Called once per accepted action, after the state change is published.
    /// The default does nothing.
    fn after_reduce(&self, _action: &A, _state: &S) {}
}

/// Append-only log of `(action, resulting state)` pairs, queryable by index.
///
/// Attach a clone of the `Arc` to a store as a middleware stage and keep the
/// other clone to query the recorded history; the store itself never records
/// anything.
///
/// # Example
///
/// ```ignore
/// let history = Arc::new(ActionHistory::new());
/// let store = Store::new(state, reducer, env)
///     .with_middleware(Arc::clone(&history) as Arc<dyn Middleware<_, _>>);
/// // ... send actions ...
/// assert_eq!(history.len(), 2);
/// let (action, state_after) = history.entry(0).unwrap();
/// ```
#[derive(Debug)]
pub struct ActionHistory<S, A> {
    entries: Mutex<Vec<(A, S)>>,
}

impl<S, A> Default for ActionHistory<S, A>
where
    S: Clone,
    A: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A> ActionHistory<S, A>
where
    S: Clone,
    A: Clone,
{
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Number of recorded entries.
    ///
    /// # Panics
    ///
    /// Panics if the entries mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `(action, resulting state)` pair recorded at `index`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the entries mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn entry(&self, index: usize) -> Option<(A, S)> {
        self.entries.lock().unwrap().get(index).cloned()
    }

    /// Snapshot of all recorded entries, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the entries mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn entries(&self) -> Vec<(A, S)> {
        self.entries.lock().unwrap().clone()
    }
}

impl<S, A> Middleware<S, A> for ActionHistory<S, A>
where
    S: Clone + Send + Sync,
    A: Clone + Send + Sync,
{
    fn handle(&self, action: A, _state: &S) -> Option<A> {
        Some(action)
    }

    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn after_reduce(&self, action: &A, state: &S) {
        self.entries
            .lock()
            .unwrap()
            .push((action.clone(), state.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct State {
        count: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Action {
        Bump,
    }

    #[test]
    fn history_records_in_order_and_is_queryable_by_index() {
        let history: ActionHistory<State, Action> = ActionHistory::new();
        assert!(history.is_empty());

        history.after_reduce(&Action::Bump, &State { count: 1 });
        history.after_reduce(&Action::Bump, &State { count: 2 });

        assert_eq!(history.len(), 2);
        assert_eq!(history.entry(1), Some((Action::Bump, State { count: 2 })));
        assert_eq!(history.entry(2), None);
    }

    #[test]
    fn history_passes_actions_through_unchanged() {
        let history: ActionHistory<State, Action> = ActionHistory::new();
        let passed = history.handle(Action::Bump, &State { count: 0 });
        assert_eq!(passed, Some(Action::Bump));
    }
}
