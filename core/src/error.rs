//! Error taxonomy for reservation, lifecycle and penalty operations.

use crate::booking::BookingStatus;
use crate::types::{BookingId, SpaceId, UserId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for reservation operations.
pub type Result<T> = std::result::Result<T, ReservationError>;

/// Every failure the reservation core surfaces to its callers.
///
/// All variants except [`ReservationError::StorageError`] are recoverable
/// rejections: the caller reports them and the process carries on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReservationError {
    // ═══════════════════════════════════════════════════════════
    // Admission
    // ═══════════════════════════════════════════════════════════

    /// Requested interval is empty or inverted.
    #[error("Invalid time range: start {start} is not before end {end}")]
    InvalidRange {
        /// Requested start
        start: DateTime<Utc>,
        /// Requested end
        end: DateTime<Utc>,
    },

    /// Space is missing, soft-deleted, or not in `available` status.
    #[error("Space {space_id} is not available for booking")]
    SpaceUnavailable {
        /// Space that was requested
        space_id: SpaceId,
    },

    /// The user already holds an overlapping active booking on this space.
    #[error("User {user_id} already has a booking on space {space_id} in this time range")]
    UserOverlap {
        /// Requesting user
        user_id: UserId,
        /// Space that was requested
        space_id: SpaceId,
    },

    /// The space is fully booked for the requested interval.
    #[error("Space {space_id} is fully booked in this time range (capacity {capacity})")]
    CapacityExceeded {
        /// Space that was requested
        space_id: SpaceId,
        /// Capacity at the time of the check
        capacity: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════

    /// The requested operation is illegal from the booking's current status.
    #[error("Cannot {action} a booking that is {from}")]
    InvalidTransition {
        /// Status the booking was in
        from: BookingStatus,
        /// Operation that was attempted
        action: &'static str,
    },

    /// Attempt to change a field that is locked after creation.
    #[error("Field `{field}` cannot be modified")]
    FieldImmutable {
        /// Name of the locked field
        field: &'static str,
    },

    /// Referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity (`booking`, `space`, `user`, `penalty`)
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Penalty ledger
    // ═══════════════════════════════════════════════════════════

    /// A `no_show` penalty already exists for this booking.
    #[error("A no-show penalty already exists for booking {booking_id}")]
    DuplicatePenalty {
        /// Booking already penalized
        booking_id: BookingId,
    },

    // ═══════════════════════════════════════════════════════════
    // Space reconciliation
    // ═══════════════════════════════════════════════════════════

    /// Space status/activity change blocked by live bookings.
    #[error("Space {space_id} still has {active} active booking(s)")]
    SpaceInUse {
        /// Space being modified
        space_id: SpaceId,
        /// Number of live bookings
        active: usize,
    },

    /// Capacity reduction below current concurrent bookings.
    #[error("Cannot reduce capacity of space {space_id} to {requested}: {active} bookings overlap")]
    CapacityBelowActive {
        /// Space being modified
        space_id: SpaceId,
        /// Requested capacity
        requested: u32,
        /// Peak number of concurrently overlapping live bookings
        active: usize,
    },

    // ═══════════════════════════════════════════════════════════
    // Ratings
    // ═══════════════════════════════════════════════════════════

    /// The user never completed a booking on this space.
    #[error("User {user_id} can only rate space {space_id} after completing a booking")]
    RatingNotAllowed {
        /// Rating author
        user_id: UserId,
        /// Rated space
        space_id: SpaceId,
    },

    /// The user already rated this space.
    #[error("User {user_id} has already rated space {space_id}")]
    DuplicateRating {
        /// Rating author
        user_id: UserId,
        /// Rated space
        space_id: SpaceId,
    },

    // ═══════════════════════════════════════════════════════════
    // System
    // ═══════════════════════════════════════════════════════════

    /// Malformed input that no domain rule covers.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persistence failure; the operation was aborted without partial commit.
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl ReservationError {
    /// Builds a [`ReservationError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable, low-cardinality name of the error kind (for metric labels and logs).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } => "invalid_range",
            Self::SpaceUnavailable { .. } => "space_unavailable",
            Self::UserOverlap { .. } => "user_overlap",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::FieldImmutable { .. } => "field_immutable",
            Self::NotFound { .. } => "not_found",
            Self::DuplicatePenalty { .. } => "duplicate_penalty",
            Self::SpaceInUse { .. } => "space_in_use",
            Self::CapacityBelowActive { .. } => "capacity_below_active",
            Self::RatingNotAllowed { .. } => "rating_not_allowed",
            Self::DuplicateRating { .. } => "duplicate_rating",
            Self::InvalidInput(_) => "invalid_input",
            Self::StorageError(_) => "storage_error",
        }
    }

    /// Returns `true` if the caller caused the rejection (as opposed to a storage failure).
    ///
    /// # Examples
    ///
    /// ```
    /// # use study_space_core::error::ReservationError;
    /// assert!(ReservationError::FieldImmutable { field: "status" }.is_client_error());
    /// assert!(!ReservationError::StorageError("connection reset".into()).is_client_error());
    /// ```
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::StorageError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct_for_admission_errors() {
        let space_id = SpaceId::new();
        let user_id = UserId::new();
        let kinds = [
            ReservationError::SpaceUnavailable { space_id }.kind(),
            ReservationError::UserOverlap { user_id, space_id }.kind(),
            ReservationError::CapacityExceeded { space_id, capacity: 1 }.kind(),
        ];
        assert_eq!(kinds, ["space_unavailable", "user_overlap", "capacity_exceeded"]);
    }

    #[test]
    fn invalid_transition_message_names_status() {
        let err = ReservationError::InvalidTransition {
            from: BookingStatus::Completed,
            action: "cancel",
        };
        assert_eq!(err.to_string(), "Cannot cancel a booking that is completed");
    }

    #[test]
    fn not_found_formats_entity_and_id() {
        let id = BookingId::new();
        let err = ReservationError::not_found("booking", id);
        assert_eq!(err.to_string(), format!("booking {id} not found"));
        assert!(err.is_client_error());
    }
}
