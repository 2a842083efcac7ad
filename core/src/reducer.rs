//! The Reducer trait, the core abstraction for business logic.

use crate::effect::Effect;
use smallvec::SmallVec;

/// Effect list returned by a reducer invocation.
///
/// Most reducer arms return zero or one effect; the inline capacity keeps the
/// common case off the heap. Returning several effects is equivalent to
/// returning a single [`Effect::Merge`] of them.
pub type Effects<A> = SmallVec<[Effect<A>; 4]>;

/// A pure state transition: `(state, action, environment) → effects`.
///
/// Reducers mutate the state in place, must not perform I/O or block, and are
/// deterministic given `(state, action)`. Everything asynchronous is returned
/// as an [`Effect`] description for the store's scheduler to interpret.
///
/// Dependencies arrive as the explicit `Environment` parameter; there is no
/// ambient dependency container to read from.
///
/// # Example
///
/// ```
/// use unistore_core::{Effects, Reducer, smallvec};
///
/// #[derive(Clone, Debug, PartialEq, Default)]
/// struct CounterState {
///     count: i64,
/// }
///
/// #[derive(Clone, Debug)]
/// enum CounterAction {
///     Increment,
///     Decrement,
/// }
///
/// struct CounterReducer;
///
/// impl Reducer for CounterReducer {
///     type State = CounterState;
///     type Action = CounterAction;
///     type Environment = ();
///
///     fn reduce(
///         &self,
///         state: &mut Self::State,
///         action: Self::Action,
///         _env: &Self::Environment,
///     ) -> Effects<Self::Action> {
///         match action {
///             CounterAction::Increment => state.count += 1,
///             CounterAction::Decrement => state.count -= 1,
///         }
///         smallvec![]
///     }
/// }
/// ```
pub trait Reducer {
    /// The state type this reducer operates on.
    type State;

    /// The action type this reducer processes.
    type Action;

    /// The injected dependencies available to effects.
    type Environment;

    /// Apply one action to the state, returning effect descriptions.
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action>;
}
