//! Dependency injection traits.
//!
//! All external dependencies reach effects through the explicit
//! `Environment` parameter of [`crate::Reducer::reduce`]. The store treats
//! the environment as an opaque read-only bundle; tests construct isolated
//! environments instead of mutating shared globals.

use chrono::{DateTime, Utc};

/// Abstracts time reads for testability.
///
/// # Examples
///
/// ```ignore
/// // Production - uses system clock
/// struct SystemClock;
/// impl Clock for SystemClock {
///     fn now(&self) -> DateTime<Utc> {
///         Utc::now()
///     }
/// }
///
/// // Test - fixed time for deterministic tests
/// struct FixedClock { time: DateTime<Utc> }
/// impl Clock for FixedClock {
///     fn now(&self) -> DateTime<Utc> {
///         self.time
///     }
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}
