//! # Topout Testing
//!
//! Testing utilities for topout reducers and sessions.
//!
//! This crate provides:
//! - A deterministic [`FixedClock`]
//! - The [`ReducerTest`] Given-When-Then harness
//! - Effect assertions
//!
//! ## Example
//!
//! ```ignore
//! use topout_testing::{ReducerTest, assertions};
//!
//! ReducerTest::new(ReorderReducer::new())
//!     .with_env(env)
//!     .given_state(loaded_state)
//!     .when_action(ReorderAction::Move { from: 0, to: 2 })
//!     .then_state(|state| assert!(state.phase.is_pending()))
//!     .then_effects(assertions::assert_has_future_effect)
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use topout_core::environment::Clock;


/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use topout_testing::mocks::FixedClock;
    /// use topout_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
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

    /// Fixed clock at 2025-06-14 09:00:00 UTC (a Saturday morning qualifier)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_749_891_600, 0).unwrap_or_default())
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-06-14T09:00:00+00:00");
    }
}
