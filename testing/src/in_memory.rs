//! In-memory reservation store for fast, deterministic testing.
//!
//! All state sits behind one mutex and every trait method holds it for its
//! whole body, which gives each call the same all-or-nothing behaviour the
//! PostgreSQL store gets from transactions.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use study_space_core::admission::{self, Candidate};
use study_space_core::booking::{Booking, BookingFilter, Reschedule, Transition};
use study_space_core::error::{ReservationError, Result};
use study_space_core::penalty::{
    NoShowOutcome, Penalty, PenaltyAmendment, PenaltyFilter, adjust_balance,
};
use study_space_core::rating::Rating;
use study_space_core::space::{Space, SpaceUpdate};
use study_space_core::store::{BookingStore, PenaltyLedger, RatingStore, SpaceDirectory};
use study_space_core::types::{BookingId, PenaltyId, SpaceId, TimeRange, UserAccount, UserId};
use study_space_core::BookingStatus;

#[derive(Debug, Default)]
struct State {
    spaces: HashMap<SpaceId, Space>,
    bookings: HashMap<BookingId, Booking>,
    users: HashMap<UserId, UserAccount>,
    penalties: HashMap<PenaltyId, Penalty>,
    ratings: Vec<Rating>,
    failing_settlements: HashSet<BookingId>,
    fail_overdue_query: bool,
}

impl State {
    fn live_bookings(&self, space_id: SpaceId, now: DateTime<Utc>) -> Vec<Booking> {
        self.bookings
            .values()
            .filter(|b| b.space_id == space_id && b.status.is_live() && b.end_time > now)
            .cloned()
            .collect()
    }

    fn bookings_on(&self, space_id: SpaceId) -> Vec<Booking> {
        self.bookings
            .values()
            .filter(|b| b.space_id == space_id)
            .cloned()
            .collect()
    }

    fn credit(&mut self, user_id: UserId, delta: i64) {
        if let Some(user) = self.users.get_mut(&user_id) {
            user.penalty_count = adjust_balance(user.penalty_count, delta);
        }
    }

    fn has_no_show_penalty(&self, booking_id: BookingId) -> bool {
        self.penalties.values().any(|p| p.is_no_show_for(booking_id))
    }
}

/// Mutex-serialized implementation of every store trait.
///
/// Clones share the same state.
///
/// # Example
///
/// ```
/// use study_space_testing::{InMemoryReservationStore, fixtures};
///
/// let store = InMemoryReservationStore::new();
/// let user = fixtures::student();
/// store.insert_user(user.clone());
/// assert_eq!(store.user_balance(user.id), Some(0));
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryReservationStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryReservationStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Seed a user account
    pub fn insert_user(&self, user: UserAccount) {
        self.lock().users.insert(user.id, user);
    }

    /// Seed a booking as-is, bypassing admission (for arranging odd states)
    pub fn put_booking(&self, booking: Booking) {
        self.lock().bookings.insert(booking.id, booking);
    }

    /// Current `penalty_count` of a user
    #[must_use]
    pub fn user_balance(&self, user_id: UserId) -> Option<u32> {
        self.lock().users.get(&user_id).map(|u| u.penalty_count)
    }

    /// Every stored penalty, in no particular order
    #[must_use]
    pub fn penalties(&self) -> Vec<Penalty> {
        self.lock().penalties.values().cloned().collect()
    }

    /// Every stored booking, in no particular order
    #[must_use]
    pub fn bookings(&self) -> Vec<Booking> {
        self.lock().bookings.values().cloned().collect()
    }

    /// Make `settle_no_show` fail with a storage error for this booking
    pub fn fail_settlement_for(&self, booking_id: BookingId) {
        self.lock().failing_settlements.insert(booking_id);
    }

    /// Make the next `overdue_bookings` call fail with a storage error
    pub fn fail_next_overdue_query(&self) {
        self.lock().fail_overdue_query = true;
    }
}

impl SpaceDirectory for InMemoryReservationStore {
    async fn get_space(&self, id: SpaceId) -> Result<Option<Space>> {
        Ok(self.lock().spaces.get(&id).cloned())
    }

    async fn insert_space(&self, space: &Space) -> Result<()> {
        self.lock().spaces.insert(space.id, space.clone());
        Ok(())
    }

    async fn update_space(
        &self,
        id: SpaceId,
        update: SpaceUpdate,
        now: DateTime<Utc>,
    ) -> Result<Space> {
        let mut state = self.lock();
        let live = state.live_bookings(id, now);
        let mut space = state
            .spaces
            .get(&id)
            .cloned()
            .ok_or_else(|| ReservationError::not_found("space", id))?;
        space.apply_update(update, &live)?;
        state.spaces.insert(id, space.clone());
        Ok(space)
    }

    async fn deactivate_space(&self, id: SpaceId, now: DateTime<Utc>) -> Result<Space> {
        let mut state = self.lock();
        let live = state.live_bookings(id, now);
        let mut space = state
            .spaces
            .get(&id)
            .cloned()
            .ok_or_else(|| ReservationError::not_found("space", id))?;
        space.deactivate(&live)?;
        state.spaces.insert(id, space.clone());
        Ok(space)
    }
}

impl BookingStore for InMemoryReservationStore {
    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.lock().bookings.get(&id).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .lock()
            .bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| (b.start_time, b.created_at));
        Ok(bookings)
    }

    async fn admit(&self, booking: Booking) -> Result<Booking> {
        let mut state = self.lock();
        let range = TimeRange::new(booking.start_time, booking.end_time)?;
        let candidate = Candidate::create(booking.user_id, booking.space_id, range);
        admission::check(
            state.spaces.get(&booking.space_id),
            &state.bookings_on(booking.space_id),
            &candidate,
        )?;
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn reschedule(
        &self,
        id: BookingId,
        request: Reschedule,
        at: DateTime<Utc>,
    ) -> Result<Booking> {
        let mut state = self.lock();
        let mut booking = state
            .bookings
            .get(&id)
            .cloned()
            .ok_or_else(|| ReservationError::not_found("booking", id))?;
        let range = booking.plan_reschedule(&request)?;
        if let Some(range) = range {
            admission::check(
                state.spaces.get(&booking.space_id),
                &state.bookings_on(booking.space_id),
                &Candidate::reschedule(&booking, range),
            )?;
        }
        booking.apply_reschedule(request, range, at);
        state.bookings.insert(id, booking.clone());
        Ok(booking)
    }

    async fn transition(
        &self,
        id: BookingId,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> Result<Booking> {
        let mut state = self.lock();
        let booking = state
            .bookings
            .get_mut(&id)
            .ok_or_else(|| ReservationError::not_found("booking", id))?;
        booking.apply(transition, at)?;
        Ok(booking.clone())
    }

    async fn delete_booking(&self, id: BookingId) -> Result<()> {
        let mut state = self.lock();
        let booking = state
            .bookings
            .get(&id)
            .ok_or_else(|| ReservationError::not_found("booking", id))?;
        booking.ensure_editable("delete")?;
        state.bookings.remove(&id);
        Ok(())
    }

    async fn overdue_bookings(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>> {
        let mut state = self.lock();
        if std::mem::take(&mut state.fail_overdue_query) {
            return Err(ReservationError::StorageError(
                "injected overdue query failure".to_string(),
            ));
        }
        let mut overdue: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.status.is_active() && b.start_time < cutoff)
            .cloned()
            .collect();
        overdue.sort_by_key(|b| b.start_time);
        Ok(overdue)
    }
}

impl PenaltyLedger for InMemoryReservationStore {
    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn get_penalty(&self, id: PenaltyId) -> Result<Option<Penalty>> {
        Ok(self.lock().penalties.get(&id).cloned())
    }

    async fn list_penalties(&self, filter: &PenaltyFilter) -> Result<Vec<Penalty>> {
        let mut penalties: Vec<Penalty> = self
            .lock()
            .penalties
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        penalties.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(penalties
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    async fn record_penalty(&self, penalty: Penalty) -> Result<Penalty> {
        let mut state = self.lock();
        if let Some(booking_id) = penalty.booking_id {
            if !state.bookings.contains_key(&booking_id) {
                return Err(ReservationError::not_found("booking", booking_id));
            }
        }
        if !state.users.contains_key(&penalty.user_id) {
            return Err(ReservationError::not_found("user", penalty.user_id));
        }
        if let Some(booking_id) = penalty.booking_id {
            if penalty.is_no_show_for(booking_id) && state.has_no_show_penalty(booking_id) {
                return Err(ReservationError::DuplicatePenalty { booking_id });
            }
        }
        state.credit(penalty.user_id, i64::from(penalty.points));
        state.penalties.insert(penalty.id, penalty.clone());
        Ok(penalty)
    }

    async fn amend_penalty(&self, id: PenaltyId, amendment: PenaltyAmendment) -> Result<Penalty> {
        let mut state = self.lock();
        let penalty = state
            .penalties
            .get_mut(&id)
            .ok_or_else(|| ReservationError::not_found("penalty", id))?;
        let delta = penalty.amend(amendment);
        let penalty = penalty.clone();
        state.credit(penalty.user_id, delta);
        Ok(penalty)
    }

    async fn revoke_penalty(&self, id: PenaltyId) -> Result<Penalty> {
        let mut state = self.lock();
        let penalty = state
            .penalties
            .remove(&id)
            .ok_or_else(|| ReservationError::not_found("penalty", id))?;
        state.credit(penalty.user_id, -i64::from(penalty.points));
        Ok(penalty)
    }

    async fn settle_no_show(
        &self,
        booking_id: BookingId,
        penalty: Penalty,
        at: DateTime<Utc>,
    ) -> Result<NoShowOutcome> {
        let mut state = self.lock();
        if state.failing_settlements.contains(&booking_id) {
            return Err(ReservationError::StorageError(format!(
                "injected settlement failure for booking {booking_id}"
            )));
        }
        let status = state
            .bookings
            .get(&booking_id)
            .map(|b| b.status)
            .ok_or_else(|| ReservationError::not_found("booking", booking_id))?;
        if !status.is_active() {
            return Ok(NoShowOutcome::NoLongerEligible);
        }
        if state.has_no_show_penalty(booking_id) {
            return Ok(NoShowOutcome::AlreadyPenalized);
        }
        if !state.users.contains_key(&penalty.user_id) {
            return Err(ReservationError::not_found("user", penalty.user_id));
        }

        if let Some(booking) = state.bookings.get_mut(&booking_id) {
            booking.apply(Transition::MarkNoShow, at)?;
        }
        state.credit(penalty.user_id, i64::from(penalty.points));
        state.penalties.insert(penalty.id, penalty.clone());
        Ok(NoShowOutcome::Penalized(penalty))
    }
}

impl RatingStore for InMemoryReservationStore {
    async fn record_rating(&self, rating: Rating) -> Result<Rating> {
        let mut state = self.lock();
        let space_id = rating.space_id;
        let user_id = rating.user_id;
        match state.spaces.get(&space_id) {
            Some(space) if space.is_active => {},
            _ => return Err(ReservationError::SpaceUnavailable { space_id }),
        }
        let used = state.bookings.values().any(|b| {
            b.user_id == user_id && b.space_id == space_id && b.status == BookingStatus::Completed
        });
        if !used {
            return Err(ReservationError::RatingNotAllowed { user_id, space_id });
        }
        if state
            .ratings
            .iter()
            .any(|r| r.user_id == user_id && r.space_id == space_id)
        {
            return Err(ReservationError::DuplicateRating { user_id, space_id });
        }
        if let Some(space) = state.spaces.get_mut(&space_id) {
            space.record_rating(rating.score);
        }
        state.ratings.push(rating.clone());
        Ok(rating)
    }

    async fn list_ratings(&self, space_id: Option<SpaceId>) -> Result<Vec<Rating>> {
        let mut ratings: Vec<Rating> = self
            .lock()
            .ratings
            .iter()
            .filter(|r| space_id.is_none_or(|id| r.space_id == id))
            .cloned()
            .collect();
        ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ratings)
    }
}
