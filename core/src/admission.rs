//! Admission rules for new and rescheduled bookings.
//!
//! [`check`] is pure: it decides admit/reject from a snapshot of the space
//! and its bookings. Callers must take that snapshot and perform the write
//! inside one atomic unit scoped to the space (row lock, serializable
//! transaction or a single-writer mutex), otherwise two requests can both
//! observe free capacity and both commit.

use crate::booking::Booking;
use crate::error::{ReservationError, Result};
use crate::space::Space;
use crate::types::{BookingId, SpaceId, TimeRange, UserId};

/// A proposed claim on a space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Requesting user
    pub user_id: UserId,
    /// Requested space
    pub space_id: SpaceId,
    /// Requested interval
    pub range: TimeRange,
    /// Booking being rescheduled, excluded from its own overlap count
    pub exclude: Option<BookingId>,
}

impl Candidate {
    /// Candidate for a brand new booking.
    #[must_use]
    pub const fn create(user_id: UserId, space_id: SpaceId, range: TimeRange) -> Self {
        Self {
            user_id,
            space_id,
            range,
            exclude: None,
        }
    }

    /// Candidate for moving `booking` to `range`.
    #[must_use]
    pub const fn reschedule(booking: &Booking, range: TimeRange) -> Self {
        Self {
            user_id: booking.user_id,
            space_id: booking.space_id,
            range,
            exclude: Some(booking.id),
        }
    }
}

/// Decides whether `candidate` may be admitted.
///
/// `existing` is every booking on the candidate's space that may overlap the
/// requested range; bookings in other statuses or on other spaces are
/// ignored, so passing a superset is fine.
///
/// Rules are applied in order and the first failure wins:
///
/// 1. the space exists, is active and is `available`
/// 2. the user holds no other `pending`/`confirmed` overlapping booking on it
/// 3. fewer than `capacity` other `pending`/`confirmed` bookings overlap
///
/// The range itself is already non-empty by construction of [`TimeRange`].
///
/// # Errors
///
/// [`ReservationError::SpaceUnavailable`], [`ReservationError::UserOverlap`]
/// or [`ReservationError::CapacityExceeded`].
pub fn check(space: Option<&Space>, existing: &[Booking], candidate: &Candidate) -> Result<()> {
    let space = match space {
        Some(space) if space.id == candidate.space_id && space.accepts_bookings() => space,
        _ => {
            return Err(ReservationError::SpaceUnavailable {
                space_id: candidate.space_id,
            });
        },
    };

    let competing = || {
        existing.iter().filter(|b| {
            b.space_id == candidate.space_id
                && b.status.is_active()
                && Some(b.id) != candidate.exclude
                && b.overlaps(&candidate.range)
        })
    };

    if competing().any(|b| b.user_id == candidate.user_id) {
        return Err(ReservationError::UserOverlap {
            user_id: candidate.user_id,
            space_id: candidate.space_id,
        });
    }

    if competing().count() >= space.capacity as usize {
        return Err(ReservationError::CapacityExceeded {
            space_id: space.id,
            capacity: space.capacity,
        });
    }

    Ok(())
}
