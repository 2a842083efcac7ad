//! Declarative macros for ergonomic effect construction.

/// Create an [`crate::Effect`] task from an async block.
///
/// # Example
///
/// ```rust,ignore
/// use unistore_core::async_effect;
///
/// async_effect! {
///     let response = client.search(&query).await.ok()?;
///     Some(SearchAction::ResultsLoaded(response))
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::task(async move { $($body)* })
    };
}

/// Create an [`crate::Effect::FireAndForget`] from an async block.
///
/// # Example
///
/// ```rust,ignore
/// use unistore_core::fire_and_forget;
///
/// fire_and_forget! {
///     audit_log.record(&entry).await;
/// }
/// ```
#[macro_export]
macro_rules! fire_and_forget {
    ($($body:tt)*) => {
        $crate::effect::Effect::fire_and_forget(async move { $($body)* })
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;

    #[derive(Clone, Debug)]
    enum TestAction {
        AsyncResult { value: i32 },
    }

    #[test]
    fn async_effect_macro_builds_a_task() {
        let effect = async_effect! {
            Some(TestAction::AsyncResult { value: 42 })
        };

        assert!(matches!(effect, Effect::Task { id: None, .. }));
    }

    #[test]
    fn fire_and_forget_macro_builds_the_silent_variant() {
        let effect: Effect<TestAction> = fire_and_forget! {};

        assert!(matches!(effect, Effect::FireAndForget(_)));
    }
}
