//! Persistence contract for the reservation core.
//!
//! Every method is one atomic unit. Implementations must guarantee:
//!
//! - admission (`admit`, `reschedule`) reads the space and its overlapping
//!   bookings and writes the result without another admission on the same
//!   space interleaving
//! - status changes are conditional on the status that was read, so two
//!   racing transitions on one booking never both succeed
//! - penalty writes and the owning user's `penalty_count` change commit
//!   together or not at all
//!
//! Methods return `impl Future + Send` so generic callers can hand the
//! futures to `tokio::spawn`.

use crate::booking::{Booking, BookingFilter, Reschedule, Transition};
use crate::error::Result;
use crate::penalty::{NoShowOutcome, Penalty, PenaltyAmendment, PenaltyFilter};
use crate::rating::Rating;
use crate::space::{Space, SpaceUpdate};
use crate::types::{BookingId, PenaltyId, SpaceId, UserAccount, UserId};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Spaces as seen by the reservation core.
pub trait SpaceDirectory: Send + Sync {
    /// Fetches a space, active or not.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    fn get_space(&self, id: SpaceId) -> impl Future<Output = Result<Option<Space>>> + Send;

    /// Persists a newly created space.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    fn insert_space(&self, space: &Space) -> impl Future<Output = Result<()>> + Send;

    /// Applies `update` after checking it against the live bookings ending after `now`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the space does not exist
    /// - `InvalidInput`, `CapacityBelowActive` or `SpaceInUse` from [`Space::apply_update`]
    fn update_space(
        &self,
        id: SpaceId,
        update: SpaceUpdate,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Space>> + Send;

    /// Soft-deletes a space that has no live bookings ending after `now`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the space does not exist
    /// - `SpaceInUse` if live bookings remain
    fn deactivate_space(
        &self,
        id: SpaceId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Space>> + Send;
}

/// The authoritative set of bookings.
pub trait BookingStore: Send + Sync {
    /// Fetches a booking.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    fn get_booking(&self, id: BookingId) -> impl Future<Output = Result<Option<Booking>>> + Send;

    /// Lists bookings matching `filter`, oldest start first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    fn list_bookings(
        &self,
        filter: &BookingFilter,
    ) -> impl Future<Output = Result<Vec<Booking>>> + Send;

    /// Runs the admission check for a `pending` booking and inserts it.
    ///
    /// # Errors
    ///
    /// Any error of [`crate::admission::check`], or `StorageError`.
    fn admit(&self, booking: Booking) -> impl Future<Output = Result<Booking>> + Send;

    /// Moves a `pending`/`confirmed` booking and/or edits its metadata.
    ///
    /// Time changes are re-admitted with the booking excluded from its own
    /// overlap count.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the booking does not exist
    /// - `InvalidTransition` if it is no longer editable
    /// - `InvalidRange` or any admission error for the new interval
    fn reschedule(
        &self,
        id: BookingId,
        request: Reschedule,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Booking>> + Send;

    /// Applies a status transition, conditional on the status it was read in.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the booking does not exist
    /// - `InvalidTransition` if the transition is illegal, including when a
    ///   concurrent writer changed the status first
    fn transition(
        &self,
        id: BookingId,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Booking>> + Send;

    /// Deletes a `pending`/`confirmed` booking.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the booking does not exist
    /// - `InvalidTransition` if it has progressed past `confirmed`
    fn delete_booking(&self, id: BookingId) -> impl Future<Output = Result<()>> + Send;

    /// `pending`/`confirmed` bookings whose start is strictly before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    fn overdue_bookings(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Booking>>> + Send;
}

/// Penalty entries and the user balances they feed.
pub trait PenaltyLedger: Send + Sync {
    /// Fetches a user's account record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    fn get_user(&self, id: UserId) -> impl Future<Output = Result<Option<UserAccount>>> + Send;

    /// Fetches a penalty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    fn get_penalty(&self, id: PenaltyId) -> impl Future<Output = Result<Option<Penalty>>> + Send;

    /// Lists penalties matching `filter`, newest first, paged.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    fn list_penalties(
        &self,
        filter: &PenaltyFilter,
    ) -> impl Future<Output = Result<Vec<Penalty>>> + Send;

    /// Inserts a penalty and credits its points to the user.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the user or referenced booking does not exist
    /// - `DuplicatePenalty` for a second `no_show` penalty on one booking
    fn record_penalty(&self, penalty: Penalty) -> impl Future<Output = Result<Penalty>> + Send;

    /// Changes points/reason/expiry and applies the point delta to the user.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the penalty does not exist.
    fn amend_penalty(
        &self,
        id: PenaltyId,
        amendment: PenaltyAmendment,
    ) -> impl Future<Output = Result<Penalty>> + Send;

    /// Deletes a penalty and debits its points, flooring the balance at zero.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the penalty does not exist.
    fn revoke_penalty(&self, id: PenaltyId) -> impl Future<Output = Result<Penalty>> + Send;

    /// Moves one overdue booking to `no_show` and records `penalty` for it.
    ///
    /// If a `no_show` penalty already references the booking, nothing is
    /// written and the booking keeps its status.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the booking does not exist
    /// - `StorageError` if the transaction fails
    fn settle_no_show(
        &self,
        booking_id: BookingId,
        penalty: Penalty,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<NoShowOutcome>> + Send;
}

/// Ratings and the running average kept on each space.
pub trait RatingStore: Send + Sync {
    /// Records a rating and folds it into the space's average.
    ///
    /// # Errors
    ///
    /// - `SpaceUnavailable` if the space is missing or inactive
    /// - `RatingNotAllowed` without a completed booking on the space
    /// - `DuplicateRating` if the user already rated the space
    fn record_rating(&self, rating: Rating) -> impl Future<Output = Result<Rating>> + Send;

    /// Lists ratings, optionally for one space, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    fn list_ratings(
        &self,
        space_id: Option<SpaceId>,
    ) -> impl Future<Output = Result<Vec<Rating>>> + Send;
}

/// Everything the reservation service needs from persistence.
pub trait ReservationStore: SpaceDirectory + BookingStore + PenaltyLedger + RatingStore {}

impl<T> ReservationStore for T where T: SpaceDirectory + BookingStore + PenaltyLedger + RatingStore {}
