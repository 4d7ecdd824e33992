//! Fixture builders for spaces, users and bookings.

#![allow(clippy::unwrap_used)] // Fixture inputs are hardcoded and always valid
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, TimeZone, Utc};
use study_space_core::booking::NewBooking;
use study_space_core::space::{NewSpace, Space, SpaceStatus};
use study_space_core::types::{Role, SpaceId, UserAccount, UserId};

/// `2025-03-10 hh:mm:00 UTC`, the reference day used across the test suites.
#[must_use]
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
}

/// Creation request for an `available` space with the given capacity.
#[must_use]
pub fn new_space(capacity: u32) -> NewSpace {
    NewSpace {
        name: format!("Study room ({capacity} seats)"),
        capacity,
        status: SpaceStatus::Available,
        location: Some("Main library".to_string()),
        description: None,
    }
}

/// An active, `available` space created at midnight of the reference day.
#[must_use]
pub fn space(capacity: u32) -> Space {
    Space::create(new_space(capacity), at(0, 0)).unwrap()
}

/// An active student account with a zero balance.
#[must_use]
pub fn student() -> UserAccount {
    UserAccount::new(UserId::new(), Role::Student)
}

/// Booking request without metadata.
#[must_use]
pub fn booking_request(
    user_id: UserId,
    space_id: SpaceId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> NewBooking {
    NewBooking {
        user_id,
        space_id,
        start,
        end,
        notes: None,
        qr_code_data: None,
    }
}
