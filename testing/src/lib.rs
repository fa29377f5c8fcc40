//! # Storeroom Testing
//!
//! Testing utilities and helpers for the Storeroom architecture.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - A fluent Given-When-Then harness for reducers
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use storeroom_testing::{ReducerTest, mocks::FixedClock};
//!
//! ReducerTest::new(PaymentReducer::new())
//!     .with_env(test_environment())
//!     .given_state(BookingPayments::new(booking_id))
//!     .when_action(PaymentAction::Expire { attempt_id, at: clock.now() })
//!     .then_state(|state| assert!(state.active().is_none()))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use storeroom_core::environment::Clock;

pub mod reducer_test;

pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::RwLock;

    /// Fixed clock for deterministic tests
    ///
    /// Returns a controlled time that only moves when the test says so,
    /// which keeps transition timestamps and expiry windows reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use storeroom_testing::mocks::FixedClock;
    /// use storeroom_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug)]
    pub struct FixedClock {
        time: RwLock<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: RwLock::new(time),
            }
        }

        /// Move the clock forward by `duration`
        ///
        /// # Panics
        ///
        /// Panics if the inner lock is poisoned (test code only).
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, duration: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += duration;
        }

        /// Set the clock to an absolute time
        ///
        /// # Panics
        ///
        /// Panics if the inner lock is poisoned (test code only).
        #[allow(clippy::unwrap_used)]
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }
    }

    impl Clock for FixedClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }
}

pub use mocks::FixedClock;

#[cfg(test)]
mod tests {
    use super::mocks::FixedClock;
    use chrono::{Duration, Utc};
    use storeroom_core::environment::Clock;

    #[test]
    fn fixed_clock_is_deterministic() {
        let clock = FixedClock::new(Utc::now());
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn fixed_clock_advances() {
        let start = Utc::now();
        let clock = FixedClock::new(start);
        clock.advance(Duration::minutes(10));
        assert_eq!(clock.now(), start + Duration::minutes(10));
    }
}
