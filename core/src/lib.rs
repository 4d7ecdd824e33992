//! # Study Space Core
//!
//! Domain model and rules for the study-space reservation engine.
//!
//! This crate decides whether a booking may be admitted, which status
//! transitions are legal, and how penalties move a user's balance. It does
//! no I/O: persistence is described by the traits in [`store`] and time is
//! injected through [`environment::Clock`].
//!
//! ## Core Concepts
//!
//! - **Space**: a bookable room with a capacity and an availability state
//! - **Booking**: a user's claim on a space for a half-open interval `[start, end)`
//! - **Transition**: the only way a booking's status changes
//! - **Admission**: the check that keeps overlapping active bookings within capacity
//! - **Penalty**: a ledger entry whose points accumulate on the user
//!
//! ## Example
//!
//! ```
//! use study_space_core::admission::{self, Candidate};
//! use study_space_core::space::{NewSpace, Space, SpaceStatus};
//! use study_space_core::types::{TimeRange, UserId};
//! use chrono::{TimeZone, Utc};
//!
//! let now = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
//! let space = Space::create(
//!     NewSpace {
//!         name: "Carrel 12".into(),
//!         capacity: 1,
//!         status: SpaceStatus::Available,
//!         location: None,
//!         description: None,
//!     },
//!     now,
//! )
//! .unwrap();
//!
//! let range = TimeRange::new(
//!     Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2025, 3, 10, 11, 0, 0).unwrap(),
//! )
//! .unwrap();
//!
//! assert!(admission::check(Some(&space), &[], &Candidate::create(UserId::new(), space.id, range)).is_ok());
//! ```

pub mod admission;
pub mod booking;
pub mod error;
pub mod penalty;
pub mod rating;
pub mod space;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use booking::{Booking, BookingStatus, Transition};
pub use chrono::{DateTime, Utc};
pub use error::{ReservationError, Result};
pub use penalty::{Penalty, PenaltyPolicy, PenaltyType};
pub use space::{Space, SpaceStatus};
pub use types::{BookingId, PenaltyId, RatingId, SpaceId, TimeRange, UserAccount, UserId};

/// Environment module - injected dependencies
///
/// Time is the only ambient dependency of the core. Production code uses
/// [`environment::SystemClock`]; tests use the fixed and manual clocks from
/// `study-space-testing`.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
