//! Reducer composition utilities.
//!
//! - [`combine_reducers`]: run multiple reducers on the same state/action
//! - [`pullback`]: lift a child-feature reducer into a parent feature

use std::marker::PhantomData;

use crate::effect::Effect;
use crate::reducer::{Effects, Reducer};

/// A boxed reducer, ready for composition.
pub type BoxedReducer<S, A, E> =
    Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>;

/// Combines multiple reducers that operate on the same state and action
/// types.
///
/// Each reducer runs in sequence against the same state and action, and all
/// returned effects are concatenated (equivalent to merging them). Ordering
/// is significant when children mutate overlapping state: the last writer
/// wins per field.
#[must_use]
pub fn combine_reducers<S, A, E>(reducers: Vec<BoxedReducer<S, A, E>>) -> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    CombinedReducer { reducers }
}

/// A reducer that runs several child reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    reducers: Vec<BoxedReducer<S, A, E>>,
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let mut all_effects = Effects::new();

        for reducer in &self.reducers {
            let effects = reducer.reduce(state, action.clone(), env);
            all_effects.extend(effects);
        }

        all_effects
    }
}

/// Lifts a reducer over a child state/action pair into one over a parent
/// state/action pair.
///
/// - `state` focuses the parent state on the child's slice.
/// - `extract` maps a parent action into the child's action space; parent
///   actions that do not map are ignored (no state change, no effects).
/// - `embed` maps child actions back into the parent space; effects returned
///   by the child are re-embedded with it, so cancellation ids stay
///   meaningful at the parent level as long as the author keeps them stable
///   across the lift.
///
/// # Example
///
/// ```
/// use unistore_core::composition::pullback;
/// use unistore_core::{Effects, Reducer, smallvec};
///
/// #[derive(Clone, Debug, Default)]
/// struct CounterState {
///     count: i64,
/// }
///
/// #[derive(Clone, Debug)]
/// enum CounterAction {
///     Increment,
/// }
///
/// #[derive(Clone, Debug, Default)]
/// struct AppState {
///     counter: CounterState,
///     log: Vec<String>,
/// }
///
/// #[derive(Clone, Debug)]
/// enum AppAction {
///     Counter(CounterAction),
///     Noop,
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
///         let CounterAction::Increment = action;
///         state.count += 1;
///         smallvec![]
///     }
/// }
///
/// let lifted = pullback(
///     CounterReducer,
///     |app: &mut AppState| &mut app.counter,
///     |action| match action {
///         AppAction::Counter(child) => Some(child),
///         AppAction::Noop => None,
///     },
///     AppAction::Counter,
/// );
///
/// let mut state = AppState::default();
/// let _ = lifted.reduce(&mut state, AppAction::Counter(CounterAction::Increment), &());
/// assert_eq!(state.counter.count, 1);
/// ```
pub fn pullback<PS, CS, PA, CA, E, R>(
    reducer: R,
    state: fn(&mut PS) -> &mut CS,
    extract: fn(PA) -> Option<CA>,
    embed: fn(CA) -> PA,
) -> PulledBack<PS, CS, PA, CA, E, R>
where
    R: Reducer<State = CS, Action = CA, Environment = E>,
    PA: 'static,
    CA: 'static,
{
    PulledBack {
        reducer,
        state,
        extract,
        embed,
        _env: PhantomData,
    }
}

/// A reducer lifted into a parent state/action space.
///
/// Created by [`pullback`].
pub struct PulledBack<PS, CS, PA, CA, E, R>
where
    R: Reducer<State = CS, Action = CA, Environment = E>,
{
    reducer: R,
    state: fn(&mut PS) -> &mut CS,
    extract: fn(PA) -> Option<CA>,
    embed: fn(CA) -> PA,
    _env: PhantomData<fn(&E)>,
}

impl<PS, CS, PA, CA, E, R> Reducer for PulledBack<PS, CS, PA, CA, E, R>
where
    R: Reducer<State = CS, Action = CA, Environment = E>,
    PA: 'static,
    CA: 'static,
{
    type State = PS;
    type Action = PA;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let Some(child_action) = (self.extract)(action) else {
            return Effects::new();
        };

        let child_state = (self.state)(state);
        let effects = self.reducer.reduce(child_state, child_action, env);

        effects
            .into_iter()
            .map(|effect: Effect<CA>| effect.map(self.embed))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SmallVec, smallvec};

    #[derive(Clone, Debug, Default)]
    struct TestState {
        counter: i64,
        name: String,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        SetName(String),
        SetBoth(String),
    }

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Effects<Self::Action> {
            match action {
                TestAction::Increment => state.counter += 1,
                TestAction::SetBoth(_) => state.name = "counter".to_owned(),
                TestAction::SetName(_) => {},
            }
            smallvec![]
        }
    }

    struct NameReducer;

    impl Reducer for NameReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Effects<Self::Action> {
            match action {
                TestAction::SetName(name) | TestAction::SetBoth(name) => state.name = name,
                TestAction::Increment => {},
            }
            smallvec![]
        }
    }

    #[test]
    fn combine_runs_children_in_sequence() {
        let combined = combine_reducers(vec![Box::new(CounterReducer), Box::new(NameReducer)]);

        let mut state = TestState::default();
        let _ = combined.reduce(&mut state, TestAction::Increment, &());
        assert_eq!(state.counter, 1);

        let _ = combined.reduce(&mut state, TestAction::SetName("alice".to_owned()), &());
        assert_eq!(state.name, "alice");
    }

    #[test]
    fn combine_last_writer_wins_on_overlap() {
        // Both reducers write `name` for SetBoth; NameReducer runs second.
        let combined = combine_reducers(vec![Box::new(CounterReducer), Box::new(NameReducer)]);

        let mut state = TestState::default();
        let _ = combined.reduce(&mut state, TestAction::SetBoth("bob".to_owned()), &());
        assert_eq!(state.name, "bob");
    }

    #[derive(Clone, Debug, Default)]
    struct ChildState {
        value: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum ChildAction {
        Add(i32),
        Loaded(i32),
    }

    #[derive(Clone, Debug, Default)]
    struct ParentState {
        child: ChildState,
        other: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum ParentAction {
        Child(ChildAction),
        Other,
    }

    struct ChildReducer;

    impl Reducer for ChildReducer {
        type State = ChildState;
        type Action = ChildAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Effects<Self::Action> {
            match action {
                ChildAction::Add(n) => {
                    state.value += n;
                    smallvec![Effect::task(async move { Some(ChildAction::Loaded(n)) })]
                },
                ChildAction::Loaded(n) => {
                    state.value = n;
                    smallvec![]
                },
            }
        }
    }

    fn lifted() -> PulledBack<ParentState, ChildState, ParentAction, ChildAction, (), ChildReducer>
    {
        pullback(
            ChildReducer,
            |parent: &mut ParentState| &mut parent.child,
            |action| match action {
                ParentAction::Child(child) => Some(child),
                ParentAction::Other => None,
            },
            ParentAction::Child,
        )
    }

    #[test]
    fn pullback_ignores_unmapped_actions() {
        let reducer = lifted();
        let mut state = ParentState::default();

        let effects = reducer.reduce(&mut state, ParentAction::Other, &());
        assert!(effects.is_empty());
        assert_eq!(state.child.value, 0);
    }

    #[test]
    fn pullback_mutates_only_the_focused_slice() {
        let reducer = lifted();
        let mut state = ParentState {
            child: ChildState { value: 5 },
            other: 7,
        };

        let _ = reducer.reduce(&mut state, ParentAction::Child(ChildAction::Add(3)), &());
        assert_eq!(state.child.value, 8);
        assert_eq!(state.other, 7);
    }

    #[test]
    fn pullback_embeds_child_effects_into_parent_actions() {
        let reducer = lifted();
        let mut state = ParentState::default();

        let mut effects: SmallVec<[Effect<ParentAction>; 4]> =
            reducer.reduce(&mut state, ParentAction::Child(ChildAction::Add(3)), &());
        assert_eq!(effects.len(), 1);

        let Some(Effect::Task { id: None, future }) = effects.pop() else {
            unreachable!("child task must lift to a parent task");
        };
        let produced = tokio_test::block_on(future);
        assert_eq!(
            produced.ok().flatten(),
            Some(ParentAction::Child(ChildAction::Loaded(3)))
        );
    }
}
