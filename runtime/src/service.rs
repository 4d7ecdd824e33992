//! The reservation service: every booking, space, penalty and rating
//! operation offered to the API layer.
//!
//! The service validates requests, takes `now` from the injected clock and
//! hands each operation to the store as one atomic unit. It adds logging and
//! metrics but holds no state of its own, so it can be shared freely across
//! request handlers.

use crate::config::ReservationConfig;
use crate::health::HealthReport;
use crate::metrics::{AdmissionMetrics, LifecycleMetrics, PenaltyMetrics};
use crate::sweeper::{NoShowSweeper, SweepReport};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use study_space_core::booking::{
    Booking, BookingFilter, BookingPatch, NewBooking, Reschedule, Transition,
};
use study_space_core::environment::Clock;
use study_space_core::error::{ReservationError, Result};
use study_space_core::penalty::{NewPenalty, Penalty, PenaltyFilter, PenaltyUpdate};
use study_space_core::rating::{NewRating, Rating};
use study_space_core::space::{NewSpace, Space, SpaceUpdate};
use study_space_core::store::ReservationStore;
use study_space_core::types::{BookingId, PenaltyId, SpaceId, TimeRange, UserId};
use tracing::{debug, info, instrument};

/// Entry point for all reservation operations.
pub struct ReservationService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ReservationConfig,
    sweeper: NoShowSweeper<S>,
}

impl<S> Clone for ReservationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            sweeper: self.sweeper.clone(),
        }
    }
}

fn observe_admission<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => AdmissionMetrics::record_admitted(operation),
        Err(e) => {
            debug!(operation, kind = e.kind(), error = %e, "Booking request rejected");
            AdmissionMetrics::record_rejected(operation, e.kind());
        },
    }
    result
}

impl<S> ReservationService<S>
where
    S: ReservationStore + 'static,
{
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: ReservationConfig) -> Self {
        let sweeper = NoShowSweeper::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.sweeper.clone(),
            config.penalty.clone(),
        );
        Self {
            store,
            clock,
            config,
            sweeper,
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Configuration the service was built with.
    #[must_use]
    pub const fn config(&self) -> &ReservationConfig {
        &self.config
    }

    /// The no-show sweeper sharing this service's store, clock and health state.
    #[must_use]
    pub const fn sweeper(&self) -> &NoShowSweeper<S> {
        &self.sweeper
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Spaces
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a space.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a zero capacity or blank name, or `StorageError`.
    #[instrument(skip(self, request), fields(name = %request.name, capacity = request.capacity))]
    pub async fn register_space(&self, request: NewSpace) -> Result<Space> {
        let space = Space::create(request, self.now())?;
        self.store.insert_space(&space).await?;
        info!(space_id = %space.id, "Space registered");
        Ok(space)
    }

    /// Fetch a space.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist.
    pub async fn get_space(&self, id: SpaceId) -> Result<Space> {
        self.store
            .get_space(id)
            .await?
            .ok_or_else(|| ReservationError::not_found("space", id))
    }

    /// Change a space's capacity, status or descriptive fields.
    ///
    /// # Errors
    ///
    /// `CapacityBelowActive` or `SpaceInUse` when the change would strand
    /// live bookings, `InvalidInput` for a zero capacity, `NotFound`.
    #[instrument(skip(self, update), fields(space_id = %id))]
    pub async fn update_space(&self, id: SpaceId, update: SpaceUpdate) -> Result<Space> {
        let space = self.store.update_space(id, update, self.now()).await?;
        info!(capacity = space.capacity, status = %space.status, "Space updated");
        Ok(space)
    }

    /// Soft-delete a space.
    ///
    /// # Errors
    ///
    /// `SpaceInUse` while live bookings exist, `NotFound`.
    #[instrument(skip(self), fields(space_id = %id))]
    pub async fn deactivate_space(&self, id: SpaceId) -> Result<Space> {
        let space = self.store.deactivate_space(id, self.now()).await?;
        info!("Space deactivated");
        Ok(space)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Bookings
    // ═══════════════════════════════════════════════════════════════════════

    /// Admit and persist a new `pending` booking.
    ///
    /// # Errors
    ///
    /// `InvalidRange`, `SpaceUnavailable`, `UserOverlap`, `CapacityExceeded`.
    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, space_id = %request.space_id)
    )]
    pub async fn create_booking(&self, request: NewBooking) -> Result<Booking> {
        let result = match TimeRange::new(request.start, request.end) {
            Ok(range) => self.store.admit(Booking::pending(request, range, self.now())).await,
            Err(e) => Err(e),
        };
        let booking = observe_admission("create", result)?;
        info!(
            booking_id = %booking.id,
            start = %booking.start_time,
            end = %booking.end_time,
            "Booking created"
        );
        Ok(booking)
    }

    /// Fetch a booking.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist.
    pub async fn get_booking(&self, id: BookingId) -> Result<Booking> {
        self.store
            .get_booking(id)
            .await?
            .ok_or_else(|| ReservationError::not_found("booking", id))
    }

    /// List bookings matching `filter`.
    ///
    /// # Errors
    ///
    /// `StorageError` if the query fails.
    pub async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>> {
        self.store.list_bookings(filter).await
    }

    /// Move a `pending`/`confirmed` booking to a new interval.
    ///
    /// Omitted bounds keep their current value.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` once the booking has progressed, plus every
    /// admission error for the new interval.
    #[instrument(skip(self), fields(booking_id = %id))]
    pub async fn reschedule_booking(
        &self,
        id: BookingId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Booking> {
        let request = Reschedule {
            start,
            end,
            ..Reschedule::default()
        };
        let result = self.store.reschedule(id, request, self.now()).await;
        let booking = observe_admission("reschedule", result)?;
        info!(start = %booking.start_time, end = %booking.end_time, "Booking rescheduled");
        Ok(booking)
    }

    /// Apply a generic patch. `status` and `space_id` are refused.
    ///
    /// # Errors
    ///
    /// `FieldImmutable` for locked fields, otherwise as
    /// [`reschedule_booking`](Self::reschedule_booking).
    #[instrument(skip(self, patch), fields(booking_id = %id))]
    pub async fn update_booking(&self, id: BookingId, patch: BookingPatch) -> Result<Booking> {
        let request = patch.into_reschedule()?;
        let moves = request.start.is_some() || request.end.is_some();
        let result = self.store.reschedule(id, request, self.now()).await;
        if moves {
            observe_admission("reschedule", result)
        } else {
            result
        }
    }

    /// `pending → confirmed`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other status, `NotFound`.
    pub async fn confirm(&self, id: BookingId) -> Result<Booking> {
        self.transition(id, Transition::Confirm).await
    }

    /// `pending | confirmed → checked_in`, stamping the check-in time.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other status (including after the sweeper
    /// marked it `no_show`), `NotFound`.
    pub async fn check_in(&self, id: BookingId) -> Result<Booking> {
        self.transition(id, Transition::CheckIn).await
    }

    /// `checked_in → completed`, stamping the check-out time.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other status, `NotFound`.
    pub async fn check_out(&self, id: BookingId) -> Result<Booking> {
        self.transition(id, Transition::CheckOut).await
    }

    /// `pending | confirmed → cancelled`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other status, `NotFound`.
    pub async fn cancel(&self, id: BookingId) -> Result<Booking> {
        self.transition(id, Transition::Cancel).await
    }

    #[instrument(skip(self), fields(booking_id = %id, action = transition.action()))]
    async fn transition(&self, id: BookingId, transition: Transition) -> Result<Booking> {
        let booking = self.store.transition(id, transition, self.now()).await?;
        LifecycleMetrics::record_transition(booking.status.as_str());
        info!(status = %booking.status, "Booking status changed");
        Ok(booking)
    }

    /// Delete a booking that is still `pending`/`confirmed`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` once checked in or terminal, `NotFound`.
    #[instrument(skip(self), fields(booking_id = %id))]
    pub async fn delete_booking(&self, id: BookingId) -> Result<()> {
        self.store.delete_booking(id).await?;
        LifecycleMetrics::record_deleted();
        info!("Booking deleted");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // No-show sweep
    // ═══════════════════════════════════════════════════════════════════════

    /// Run one no-show sweep now.
    ///
    /// # Errors
    ///
    /// `StorageError` if overdue bookings could not be listed.
    pub async fn run_no_show_sweep(&self) -> Result<SweepReport> {
        self.sweeper.run_once().await
    }

    /// Health of the background components.
    pub async fn health(&self) -> HealthReport {
        HealthReport::new(vec![self.sweeper.health().await], self.now())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Penalty ledger
    // ═══════════════════════════════════════════════════════════════════════

    /// Issue a penalty and credit it to the user.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user or booking, `DuplicatePenalty` for a
    /// second `no_show` penalty on one booking.
    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, penalty_type = %request.penalty_type)
    )]
    pub async fn create_penalty(&self, request: NewPenalty) -> Result<Penalty> {
        let penalty = Penalty::issue(request, &self.config.penalty, self.now());
        let penalty = self.store.record_penalty(penalty).await?;
        PenaltyMetrics::record_issued(penalty.penalty_type.as_str(), penalty.points);
        info!(penalty_id = %penalty.id, points = penalty.points, "Penalty issued");
        Ok(penalty)
    }

    /// Change a penalty's points, reason or expiry.
    ///
    /// # Errors
    ///
    /// `FieldImmutable` for user/booking/type changes, `NotFound`.
    #[instrument(skip(self, update), fields(penalty_id = %id))]
    pub async fn update_penalty(&self, id: PenaltyId, update: PenaltyUpdate) -> Result<Penalty> {
        let amendment = update.into_amendment()?;
        let penalty = self.store.amend_penalty(id, amendment).await?;
        info!(points = penalty.points, "Penalty updated");
        Ok(penalty)
    }

    /// Delete a penalty and debit its points.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist.
    #[instrument(skip(self), fields(penalty_id = %id))]
    pub async fn delete_penalty(&self, id: PenaltyId) -> Result<Penalty> {
        let penalty = self.store.revoke_penalty(id).await?;
        PenaltyMetrics::record_revoked();
        info!(user_id = %penalty.user_id, points = penalty.points, "Penalty revoked");
        Ok(penalty)
    }

    /// Fetch a penalty.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist.
    pub async fn get_penalty(&self, id: PenaltyId) -> Result<Penalty> {
        self.store
            .get_penalty(id)
            .await?
            .ok_or_else(|| ReservationError::not_found("penalty", id))
    }

    /// List penalties matching `filter`.
    ///
    /// # Errors
    ///
    /// `StorageError` if the query fails.
    pub async fn list_penalties(&self, filter: &PenaltyFilter) -> Result<Vec<Penalty>> {
        self.store.list_penalties(filter).await
    }

    /// The user's running penalty-point balance.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user.
    pub async fn penalty_balance(&self, user_id: UserId) -> Result<u32> {
        self.store
            .get_user(user_id)
            .await?
            .map(|user| user.penalty_count)
            .ok_or_else(|| ReservationError::not_found("user", user_id))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Ratings
    // ═══════════════════════════════════════════════════════════════════════

    /// Rate a space the user has completed a booking on.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a score outside `1..=5`, `RatingNotAllowed`,
    /// `DuplicateRating`, `SpaceUnavailable`.
    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, space_id = %request.space_id, score = request.score)
    )]
    pub async fn rate_space(&self, request: NewRating) -> Result<Rating> {
        let rating = Rating::create(request, self.now())?;
        let rating = self.store.record_rating(rating).await?;
        info!(rating_id = %rating.id, "Space rated");
        Ok(rating)
    }

    /// List ratings, optionally for one space.
    ///
    /// # Errors
    ///
    /// `StorageError` if the query fails.
    pub async fn list_ratings(&self, space_id: Option<SpaceId>) -> Result<Vec<Rating>> {
        self.store.list_ratings(space_id).await
    }
}
