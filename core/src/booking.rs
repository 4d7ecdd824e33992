//! Bookings and their status state machine.
//!
//! A booking moves through an explicit transition table:
//!
//! ```text
//! pending ──confirm──▶ confirmed
//!    │                    │
//!    ├──check_in──────────┼──▶ checked_in ──check_out──▶ completed
//!    ├──cancel────────────┼──▶ cancelled
//!    └──mark_no_show──────┴──▶ no_show
//! ```
//!
//! `completed`, `cancelled` and `no_show` are terminal. Status is never set
//! directly; the only way to change it is [`Booking::apply`] with a
//! [`Transition`].

use crate::error::{ReservationError, Result};
use crate::types::{BookingId, SpaceId, TimeRange, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Status
// ============================================================================

/// Booking status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Created, awaiting check-in
    Pending,
    /// Explicitly confirmed, awaiting check-in
    Confirmed,
    /// User is on site
    CheckedIn,
    /// User checked out (terminal)
    Completed,
    /// Cancelled before check-in (terminal)
    Cancelled,
    /// Swept after the grace period expired (terminal)
    NoShow,
}

impl BookingStatus {
    /// Statuses that hold a claim on capacity and may still be edited.
    pub const ACTIVE: [Self; 2] = [Self::Pending, Self::Confirmed];

    /// Statuses that occupy the space now or in the future.
    pub const LIVE: [Self; 3] = [Self::Pending, Self::Confirmed, Self::CheckedIn];

    /// `pending` or `confirmed`.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// `pending`, `confirmed` or `checked_in`.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::CheckedIn)
    }

    /// `completed`, `cancelled` or `no_show`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::CheckedIn => "checked_in",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// Looks up the status reached by `transition` from `self`.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::InvalidTransition`] if the table has no
    /// edge from `self` for `transition`.
    pub fn apply(self, transition: Transition) -> Result<Self> {
        if transition.allowed_from().contains(&self) {
            Ok(transition.target())
        } else {
            Err(ReservationError::InvalidTransition {
                from: self,
                action: transition.action(),
            })
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "checked_in" => Ok(Self::CheckedIn),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "no_show" => Ok(Self::NoShow),
            other => Err(ReservationError::InvalidInput(format!(
                "unknown booking status `{other}`"
            ))),
        }
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// The dedicated operations allowed to change a booking's status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// `pending → confirmed`
    Confirm,
    /// `pending | confirmed → checked_in`, stamps check-in time
    CheckIn,
    /// `checked_in → completed`, stamps check-out time
    CheckOut,
    /// `pending | confirmed → cancelled`
    Cancel,
    /// `pending | confirmed → no_show` (sweeper only)
    MarkNoShow,
}

impl Transition {
    /// Status reached by this transition.
    #[must_use]
    pub const fn target(self) -> BookingStatus {
        match self {
            Self::Confirm => BookingStatus::Confirmed,
            Self::CheckIn => BookingStatus::CheckedIn,
            Self::CheckOut => BookingStatus::Completed,
            Self::Cancel => BookingStatus::Cancelled,
            Self::MarkNoShow => BookingStatus::NoShow,
        }
    }

    /// Statuses this transition may start from.
    #[must_use]
    pub const fn allowed_from(self) -> &'static [BookingStatus] {
        match self {
            Self::Confirm => &[BookingStatus::Pending],
            Self::CheckOut => &[BookingStatus::CheckedIn],
            Self::CheckIn | Self::Cancel | Self::MarkNoShow => &BookingStatus::ACTIVE,
        }
    }

    /// Verb used in error messages and logs.
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::CheckIn => "check in",
            Self::CheckOut => "check out",
            Self::Cancel => "cancel",
            Self::MarkNoShow => "mark as no-show",
        }
    }
}

// ============================================================================
// Booking
// ============================================================================

/// A user's claim on a space for a time interval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking ID
    pub id: BookingId,
    /// Owning user
    pub user_id: UserId,
    /// Booked space (immutable after creation)
    pub space_id: SpaceId,
    /// Inclusive start
    pub start_time: DateTime<Utc>,
    /// Exclusive end
    pub end_time: DateTime<Utc>,
    /// Current status
    pub status: BookingStatus,
    /// Set on check-in
    pub check_in_time: Option<DateTime<Utc>>,
    /// Set on check-out
    pub check_out_time: Option<DateTime<Utc>>,
    /// Free-text notes
    pub notes: Option<String>,
    /// QR payload shown at the desk
    pub qr_code_data: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a `pending` booking for an already validated request.
    #[must_use]
    pub fn pending(request: NewBooking, range: TimeRange, now: DateTime<Utc>) -> Self {
        Self {
            id: BookingId::new(),
            user_id: request.user_id,
            space_id: request.space_id,
            start_time: range.start(),
            end_time: range.end(),
            status: BookingStatus::Pending,
            check_in_time: None,
            check_out_time: None,
            notes: request.notes,
            qr_code_data: request.qr_code_data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this booking's interval overlaps `range`.
    #[must_use]
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        self.start_time < range.end() && range.start() < self.end_time
    }

    /// Applies a status transition, stamping check-in/out times.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::InvalidTransition`] if the transition is
    /// illegal from the current status. The booking is left untouched.
    pub fn apply(&mut self, transition: Transition, at: DateTime<Utc>) -> Result<()> {
        let next = self.status.apply(transition)?;
        match transition {
            Transition::CheckIn => self.check_in_time = Some(at),
            Transition::CheckOut => self.check_out_time = Some(at),
            Transition::Confirm | Transition::Cancel | Transition::MarkNoShow => {},
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// Fails unless the booking is still `pending`/`confirmed`.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::InvalidTransition`] naming `action`.
    pub const fn ensure_editable(&self, action: &'static str) -> Result<()> {
        if self.status.is_active() {
            Ok(())
        } else {
            Err(ReservationError::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    /// Computes the interval a reschedule would move this booking to.
    ///
    /// Returns `None` when the request leaves both times untouched.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidTransition`] if the booking is no longer editable
    /// - [`ReservationError::InvalidRange`] if the merged interval is empty
    pub fn plan_reschedule(&self, request: &Reschedule) -> Result<Option<TimeRange>> {
        self.ensure_editable("reschedule")?;
        if request.start.is_none() && request.end.is_none() {
            return Ok(None);
        }
        let range = TimeRange::new(
            request.start.unwrap_or(self.start_time),
            request.end.unwrap_or(self.end_time),
        )?;
        Ok(Some(range))
    }

    /// Writes an admitted reschedule into the booking.
    pub fn apply_reschedule(
        &mut self,
        request: Reschedule,
        range: Option<TimeRange>,
        at: DateTime<Utc>,
    ) {
        if let Some(range) = range {
            self.start_time = range.start();
            self.end_time = range.end();
        }
        if let Some(notes) = request.notes {
            self.notes = Some(notes);
        }
        if let Some(qr) = request.qr_code_data {
            self.qr_code_data = Some(qr);
        }
        self.updated_at = at;
    }
}

/// Request to create a booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    /// Requesting user (trusted after identity resolution)
    pub user_id: UserId,
    /// Space to book
    pub space_id: SpaceId,
    /// Requested start
    pub start: DateTime<Utc>,
    /// Requested end
    pub end: DateTime<Utc>,
    /// Free-text notes
    pub notes: Option<String>,
    /// QR payload
    pub qr_code_data: Option<String>,
}

/// Generic booking update as it arrives from the API layer.
///
/// `status` and `space_id` exist so that attempts to set them can be rejected
/// explicitly; they are never applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPatch {
    /// New start
    pub start: Option<DateTime<Utc>>,
    /// New end
    pub end: Option<DateTime<Utc>>,
    /// New notes
    pub notes: Option<String>,
    /// New QR payload
    pub qr_code_data: Option<String>,
    /// Always rejected
    pub status: Option<BookingStatus>,
    /// Always rejected
    pub space_id: Option<SpaceId>,
}

impl BookingPatch {
    /// Strips the patch down to the mutable fields.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::FieldImmutable`] if `status` or `space_id` is set.
    pub fn into_reschedule(self) -> Result<Reschedule> {
        if self.status.is_some() {
            return Err(ReservationError::FieldImmutable { field: "status" });
        }
        if self.space_id.is_some() {
            return Err(ReservationError::FieldImmutable { field: "space_id" });
        }
        Ok(Reschedule {
            start: self.start,
            end: self.end,
            notes: self.notes,
            qr_code_data: self.qr_code_data,
        })
    }
}

/// Validated change to a booking's times and metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reschedule {
    /// New start (keeps the current one if `None`)
    pub start: Option<DateTime<Utc>>,
    /// New end (keeps the current one if `None`)
    pub end: Option<DateTime<Utc>>,
    /// New notes
    pub notes: Option<String>,
    /// New QR payload
    pub qr_code_data: Option<String>,
}

/// Filters for listing bookings. `None` fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFilter {
    /// Only this user's bookings
    pub user_id: Option<UserId>,
    /// Only bookings on this space
    pub space_id: Option<SpaceId>,
    /// Only bookings in this status
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    /// Whether `booking` passes the filter.
    #[must_use]
    pub fn matches(&self, booking: &Booking) -> bool {
        self.user_id.is_none_or(|id| booking.user_id == id)
            && self.space_id.is_none_or(|id| booking.space_id == id)
            && self.status.is_none_or(|status| booking.status == status)
    }
}
