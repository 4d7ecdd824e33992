//! # Study Space Testing
//!
//! Testing utilities for the study-space reservation engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryReservationStore`]: a mutex-serialized implementation of every store trait
//! - Fixture builders and proptest strategies for domain types
//!
//! ## Example
//!
//! ```
//! use study_space_testing::{InMemoryReservationStore, fixtures};
//! use study_space_core::store::SpaceDirectory;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryReservationStore::new();
//! let space = fixtures::space(2);
//! store.insert_space(&space).await?;
//! assert!(store.get_space(space.id).await?.is_some());
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use study_space_core::environment::Clock;

pub mod fixtures;
pub mod in_memory;

/// Mock implementations of Environment traits
pub mod mocks {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use study_space_testing::mocks::FixedClock;
    /// use study_space_core::environment::Clock;
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

    /// Clock that only moves when the test moves it.
    ///
    /// Clones share the same instant, so a test can keep one handle and
    /// give another to the service under test.
    ///
    /// ```
    /// use study_space_testing::mocks::ManualClock;
    /// use study_space_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let handle = clock.clone();
    /// let before = clock.now();
    /// handle.advance(Duration::minutes(16));
    /// assert_eq!(clock.now() - before, Duration::minutes(16));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: Duration) {
            *self.time.write().unwrap() += by;
        }

        /// Jump to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
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

/// Property-based testing utilities using proptest.
pub mod properties {
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;
    use study_space_core::types::TimeRange;

    /// Ranges on a 15-minute grid within one day starting at `day`.
    ///
    /// Coarse slots make overlaps and touching boundaries common.
    pub fn quarter_hour_range(day: DateTime<Utc>) -> impl Strategy<Value = TimeRange> {
        (0i64..40, 1i64..8).prop_filter_map("range fits the day", move |(slot, len)| {
            let start = day + Duration::minutes(slot * 15);
            TimeRange::new(start, start + Duration::minutes(len * 15)).ok()
        })
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "study_space=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use in_memory::InMemoryReservationStore;
pub use mocks::{FixedClock, ManualClock, test_clock};
