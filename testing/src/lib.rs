//! # Unistore Testing
//!
//! Deterministic testing utilities for the unistore architecture.
//!
//! The centerpiece is [`TestStore`], a harness that drives a reducer/effect
//! pair outside the production dispatch loop: reductions are synchronous,
//! effect-produced actions queue up for explicit consumption, and every
//! expected state mutation is verified against the actual one. Its
//! exhaustiveness contract (every effect an action produces must be
//! explicitly received or drained) is what pins down the scheduler's
//! ordering semantics.
//!
//! ## Example
//!
//! ```ignore
//! use unistore_testing::TestStore;
//!
//! #[tokio::test]
//! async fn fetch_loads_the_answer() {
//!     let mut store = TestStore::new(FetchState::default(), FetchReducer, env);
//!
//!     store.send(FetchAction::Fetch, |_| {});
//!     store
//!         .receive(FetchAction::Loaded(42), |state| state.value = 42)
//!         .await;
//!     store.finish().await;
//! }
//! ```

use chrono::{DateTime, Utc};
use unistore_core::environment::Clock;

mod test_store;

pub use test_store::{Exhaustivity, TestFailure, TestStore};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use unistore_testing::mocks::FixedClock;
    /// use unistore_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a fixed clock with the given time.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_deterministic() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }
}
