//! Effect descriptions returned by reducers.
//!
//! Effects are NOT executed when they are constructed. They are inert
//! descriptions of asynchronous work, returned from reducers and interpreted
//! by the store's scheduler. All execution state (registrations, timers,
//! pending windows) lives in the scheduler, never in the effect value.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Error surfaced by a fallible effect task.
///
/// The scheduler's default policy is to log and drop these: a failed task
/// never dispatches an action. Effect authors that want failure visibility
/// catch their own errors and map them to a normal action instead.
#[derive(Debug, Error)]
#[error("effect task failed: {message}")]
pub struct EffectError {
    message: String,
}

impl EffectError {
    /// Create an error from a display-able cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for EffectError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for EffectError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_owned(),
        }
    }
}

/// Identity token scoping cancellation, debounce, and throttle groups.
///
/// Callers supply a stable id for each logical operation (e.g. `"search"`),
/// so that later dispatches of the same operation can supersede or cancel
/// earlier ones. At most one execution is live per id at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(Cow<'static, str>);

impl EffectId {
    /// Create an id from a static string without allocating.
    #[must_use]
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// Create an id from an owned string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for EffectId {
    fn from(id: &'static str) -> Self {
        Self::from_static(id)
    }
}

impl From<String> for EffectId {
    fn from(id: String) -> Self {
        Self(Cow::Owned(id))
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which edges of a throttle window execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePolicy {
    /// The first call in a window executes immediately; later calls in the
    /// same window are dropped.
    Leading,
    /// Calls are coalesced; the latest one executes when the window closes.
    Trailing,
    /// The first call executes immediately and the latest subsequent call
    /// executes when the window closes.
    LeadingAndTrailing,
}

impl ThrottlePolicy {
    /// Whether the first call in a window executes immediately.
    #[must_use]
    pub const fn fires_leading(self) -> bool {
        matches!(self, Self::Leading | Self::LeadingAndTrailing)
    }

    /// Whether the latest coalesced call executes at window end.
    #[must_use]
    pub const fn fires_trailing(self) -> bool {
        matches!(self, Self::Trailing | Self::LeadingAndTrailing)
    }
}

/// Boxed future run by a task effect.
pub type TaskFuture<A> = Pin<Box<dyn Future<Output = Result<Option<A>, EffectError>> + Send>>;

/// Boxed future run by a fire-and-forget effect.
pub type FireAndForgetFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A description of future asynchronous work and its cancellation identity.
///
/// # Type Parameters
///
/// - `A`: the action type the work can produce (the feedback loop)
pub enum Effect<A> {
    /// No further work.
    None,

    /// One asynchronous unit producing at most one action.
    ///
    /// When `id` is set, the execution is registered for identity-based
    /// cancellation: scheduling another identified effect under the same id
    /// supersedes this one, and a superseded execution never dispatches its
    /// action even if it completed first.
    Task {
        /// Cancellation identity, if any.
        id: Option<EffectId>,
        /// The work to run.
        future: TaskFuture<A>,
    },

    /// Asynchronous work that never produces an action.
    FireAndForget(FireAndForgetFuture),

    /// Run all child effects concurrently, each with its own identity.
    Merge(Vec<Effect<A>>),

    /// Cancel any in-flight execution registered under the id.
    ///
    /// A miss is a no-op, not an error.
    Cancel(EffectId),

    /// Delay the inner effect until `duration` passes with no further
    /// debounce scheduling under the same id. Only the most recent inner
    /// effect survives the quiet period.
    Debounce {
        /// Debounce group.
        id: EffectId,
        /// Quiet period.
        duration: Duration,
        /// Effect to run once the group goes quiet.
        effect: Box<Effect<A>>,
    },

    /// Bound execution frequency of the inner effect to one window per id.
    Throttle {
        /// Throttle group.
        id: EffectId,
        /// Window length.
        duration: Duration,
        /// Which window edges execute.
        policy: ThrottlePolicy,
        /// Effect gated by the window.
        effect: Box<Effect<A>>,
    },
}

impl<A> Effect<A> {
    /// No-op effect.
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// An asynchronous unit of work resolving to an optional action.
    #[must_use]
    pub fn task<F>(future: F) -> Self
    where
        F: Future<Output = Option<A>> + Send + 'static,
        A: 'static,
    {
        Self::Task {
            id: None,
            future: Box::pin(async move { Ok(future.await) }),
        }
    }

    /// A fallible asynchronous unit of work.
    ///
    /// Failures are logged and dropped by the scheduler; map errors to an
    /// action inside the future for visibility.
    #[must_use]
    pub fn try_task<F>(future: F) -> Self
    where
        F: Future<Output = Result<Option<A>, EffectError>> + Send + 'static,
    {
        Self::Task {
            id: None,
            future: Box::pin(future),
        }
    }

    /// A task registered under `id` for identity-based cancellation.
    #[must_use]
    pub fn cancellable<F>(id: impl Into<EffectId>, future: F) -> Self
    where
        F: Future<Output = Option<A>> + Send + 'static,
        A: 'static,
    {
        Self::Task {
            id: Some(id.into()),
            future: Box::pin(async move { Ok(future.await) }),
        }
    }

    /// A fallible task registered under `id` for identity-based cancellation.
    #[must_use]
    pub fn try_cancellable<F>(id: impl Into<EffectId>, future: F) -> Self
    where
        F: Future<Output = Result<Option<A>, EffectError>> + Send + 'static,
    {
        Self::Task {
            id: Some(id.into()),
            future: Box::pin(future),
        }
    }

    /// Asynchronous work producing no action.
    #[must_use]
    pub fn fire_and_forget<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::FireAndForget(Box::pin(future))
    }

    /// Run all effects concurrently.
    #[must_use]
    pub fn merge(effects: Vec<Effect<A>>) -> Self {
        Self::Merge(effects)
    }

    /// Cancel any in-flight execution registered under `id`.
    #[must_use]
    pub fn cancel(id: impl Into<EffectId>) -> Self {
        Self::Cancel(id.into())
    }

    /// Debounce `effect` under `id`: it runs only after `duration` elapses
    /// with no further debounce scheduling for the same id.
    #[must_use]
    pub fn debounce(id: impl Into<EffectId>, duration: Duration, effect: Effect<A>) -> Self {
        Self::Debounce {
            id: id.into(),
            duration,
            effect: Box::new(effect),
        }
    }

    /// Throttle `effect` under `id` to at most one window per `duration`.
    #[must_use]
    pub fn throttle(
        id: impl Into<EffectId>,
        duration: Duration,
        policy: ThrottlePolicy,
        effect: Effect<A>,
    ) -> Self {
        Self::Throttle {
            id: id.into(),
            duration,
            policy,
            effect: Box::new(effect),
        }
    }

    /// Whether this effect describes no work at all.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Re-embed every action this effect can produce into another action
    /// type.
    ///
    /// Used by `pullback` to lift child-feature effects into the parent
    /// action space. Identities are carried through unchanged, so
    /// cancellation ids keep their meaning across the lift.
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Effect<B>
    where
        F: Fn(A) -> B + Clone + Send + Sync + 'static,
        A: 'static,
        B: 'static,
    {
        match self {
            Self::None => Effect::None,
            Self::Task { id, future } => Effect::Task {
                id,
                future: Box::pin(async move { future.await.map(|opt| opt.map(f)) }),
            },
            Self::FireAndForget(future) => Effect::FireAndForget(future),
            Self::Merge(effects) => {
                Effect::Merge(effects.into_iter().map(|e| e.map(f.clone())).collect())
            },
            Self::Cancel(id) => Effect::Cancel(id),
            Self::Debounce {
                id,
                duration,
                effect,
            } => Effect::Debounce {
                id,
                duration,
                effect: Box::new(effect.map(f)),
            },
            Self::Throttle {
                id,
                duration,
                policy,
                effect,
            } => Effect::Throttle {
                id,
                duration,
                policy,
                effect: Box::new(effect.map(f)),
            },
        }
    }
}

// Manual Debug implementation since task futures don't implement Debug.
impl<A> fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "Effect::None"),
            Self::Task { id, .. } => f
                .debug_struct("Effect::Task")
                .field("id", id)
                .finish_non_exhaustive(),
            Self::FireAndForget(_) => write!(f, "Effect::FireAndForget(<future>)"),
            Self::Merge(effects) => f.debug_tuple("Effect::Merge").field(effects).finish(),
            Self::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            Self::Debounce { id, duration, .. } => f
                .debug_struct("Effect::Debounce")
                .field("id", id)
                .field("duration", duration)
                .finish_non_exhaustive(),
            Self::Throttle {
                id,
                duration,
                policy,
                ..
            } => f
                .debug_struct("Effect::Throttle")
                .field("id", id)
                .field("duration", duration)
                .field("policy", policy)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum ChildAction {
        Loaded(i32),
    }

    #[derive(Debug, Clone, PartialEq)]
    enum ParentAction {
        Child(ChildAction),
    }

    #[test]
    fn constructors_produce_expected_variants() {
        let effect: Effect<ChildAction> = Effect::task(async { None });
        assert!(matches!(effect, Effect::Task { id: None, .. }));

        let effect: Effect<ChildAction> = Effect::cancellable("load", async { None });
        assert!(matches!(effect, Effect::Task { id: Some(_), .. }));

        let effect: Effect<ChildAction> = Effect::cancel("load");
        assert!(matches!(effect, Effect::Cancel(id) if id.as_str() == "load"));

        let effect: Effect<ChildAction> = Effect::debounce(
            "load",
            Duration::from_millis(300),
            Effect::task(async { None }),
        );
        assert!(matches!(effect, Effect::Debounce { .. }));
    }

    #[test]
    fn effect_id_equality_is_value_based() {
        let a = EffectId::from_static("search");
        let b = EffectId::new(String::from("search"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "search");
    }

    #[test]
    fn throttle_policy_edges() {
        assert!(ThrottlePolicy::Leading.fires_leading());
        assert!(!ThrottlePolicy::Leading.fires_trailing());
        assert!(ThrottlePolicy::Trailing.fires_trailing());
        assert!(ThrottlePolicy::LeadingAndTrailing.fires_leading());
        assert!(ThrottlePolicy::LeadingAndTrailing.fires_trailing());
    }

    #[test]
    fn map_embeds_produced_actions() {
        let effect: Effect<ChildAction> = Effect::task(async { Some(ChildAction::Loaded(42)) });
        let mapped = effect.map(ParentAction::Child);

        let Effect::Task { id, future } = mapped else {
            unreachable!("map must preserve the task variant");
        };
        assert!(id.is_none());

        let produced = tokio_test::block_on(future);
        assert_eq!(
            produced.ok().flatten(),
            Some(ParentAction::Child(ChildAction::Loaded(42)))
        );
    }

    #[test]
    fn map_recurses_through_composition() {
        let effect: Effect<ChildAction> = Effect::merge(vec![
            Effect::cancel("x"),
            Effect::debounce(
                "y",
                Duration::from_millis(10),
                Effect::task(async { Some(ChildAction::Loaded(1)) }),
            ),
        ]);

        let mapped = effect.map(ParentAction::Child);
        let Effect::Merge(children) = mapped else {
            unreachable!("map must preserve the merge variant");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[0], Effect::Cancel(id) if id.as_str() == "x"));
        assert!(matches!(&children[1], Effect::Debounce { id, .. } if id.as_str() == "y"));
    }
}
