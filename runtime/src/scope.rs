//! Store-shaped views over projections of a parent store.

use std::sync::Arc;

use tokio::sync::watch;
use unistore_core::reducer::Reducer;

use crate::error::StoreError;
use crate::store::Store;
use crate::EffectHandle;

/// A store-shaped view bound to a projected state/action pair.
///
/// The scope holds a clone of its parent: `send` embeds the child action and
/// forwards it, and reads recompute the projection from the parent's current
/// state. The scope runs no reducer and no scheduler of its own, owns no
/// independent storage, and is valid as long as any clone of the parent
/// exists.
///
/// Equality-deduplication of redundant state notifications is the parent's
/// responsibility; the scope only projects what the parent publishes.
pub struct ScopedStore<S, A, E, R, CS, CA>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    parent: Store<S, A, E, R>,
    state: Arc<dyn Fn(&S) -> CS + Send + Sync>,
    embed: Arc<dyn Fn(CA) -> A + Send + Sync>,
}

impl<S, A, E, R, CS, CA> ScopedStore<S, A, E, R, CS, CA>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Send + Sync + 'static,
    A: Clone + Send + 'static,
    E: Send + Sync + 'static,
    CS: 'static,
    CA: 'static,
{
    pub(crate) fn new(
        parent: Store<S, A, E, R>,
        state: Arc<dyn Fn(&S) -> CS + Send + Sync>,
        embed: Arc<dyn Fn(CA) -> A + Send + Sync>,
    ) -> Self {
        Self {
            parent,
            state,
            embed,
        }
    }

    /// Embed the child action and dispatch it through the parent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the parent is shutting
    /// down.
    pub async fn send(&self, action: CA) -> Result<EffectHandle, StoreError> {
        self.parent.send((self.embed)(action)).await
    }

    /// Read the projected state via a closure.
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&CS) -> T,
    {
        self.parent.state(|s| f(&(self.state)(s))).await
    }

    /// Subscribe to changes of the projected state.
    #[must_use]
    pub fn subscribe(&self) -> ScopedStateReceiver<S, CS> {
        ScopedStateReceiver {
            receiver: self.parent.subscribe(),
            state: Arc::clone(&self.state),
        }
    }

    /// Derive a further scope over this one.
    ///
    /// Projections and embeddings compose; the new scope still talks directly
    /// to the root parent.
    #[must_use]
    pub fn scope<GS, GA>(
        &self,
        state: impl Fn(&CS) -> GS + Send + Sync + 'static,
        embed: impl Fn(GA) -> CA + Send + Sync + 'static,
    ) -> ScopedStore<S, A, E, R, GS, GA>
    where
        GS: 'static,
        GA: 'static,
    {
        let parent_state = Arc::clone(&self.state);
        let parent_embed = Arc::clone(&self.embed);

        ScopedStore {
            parent: self.parent.clone(),
            state: Arc::new(move |s: &S| state(&parent_state(s))),
            embed: Arc::new(move |a: GA| parent_embed(embed(a))),
        }
    }
}

impl<S, A, E, R, CS, CA> Clone for ScopedStore<S, A, E, R, CS, CA>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    fn clone(&self) -> Self {
        Self {
            parent: self.parent.clone(),
            state: Arc::clone(&self.state),
            embed: Arc::clone(&self.embed),
        }
    }
}

/// Receiver of projected state changes, created by
/// [`ScopedStore::subscribe`].
pub struct ScopedStateReceiver<S, CS> {
    receiver: watch::Receiver<S>,
    state: Arc<dyn Fn(&S) -> CS + Send + Sync>,
}

impl<S, CS> ScopedStateReceiver<S, CS> {
    /// The projection of the parent's latest committed state.
    #[must_use]
    pub fn current(&self) -> CS {
        (self.state)(&self.receiver.borrow())
    }

    /// Wait for the next parent state change and mark it seen.
    ///
    /// Note the parent deduplicates on *parent* state equality: a parent
    /// change that leaves this projection untouched still counts as a
    /// change.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ChannelClosed`] once the parent store (and all
    /// its clones) has been dropped.
    pub async fn changed(&mut self) -> Result<(), StoreError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| StoreError::ChannelClosed)
    }
}
