//! Booking admission and lifecycle tests.
//!
//! Drives `ReservationService` over the in-memory store through the
//! reference scenarios: capacity-one admission, terminal states, space
//! reconciliation and the field locks on generic updates.
//!
//! Run with: `cargo test -p study-space-runtime --test booking_lifecycle_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::Duration;
use std::sync::Arc;
use study_space_core::booking::{BookingFilter, BookingPatch};
use study_space_core::space::{SpaceStatus, SpaceUpdate};
use study_space_core::{BookingStatus, ReservationError, SpaceId, UserId};
use study_space_runtime::{ReservationConfig, ReservationService, RetryPolicy};
use study_space_testing::fixtures::{at, booking_request, new_space, student};
use study_space_testing::{InMemoryReservationStore, ManualClock};

fn service(clock: &ManualClock) -> ReservationService<InMemoryReservationStore> {
    let mut config = ReservationConfig::default();
    config.sweeper.settle_retry = RetryPolicy::none();
    ReservationService::new(
        Arc::new(InMemoryReservationStore::new()),
        Arc::new(clock.clone()),
        config,
    )
}

/// Test 1: Capacity-one space
///
/// A overlapping second booking is refused; a touching one is admitted.
#[tokio::test]
async fn test_capacity_one_admission() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(1)).await.unwrap();
    let alice = UserId::new();
    let bob = UserId::new();

    let first = service
        .create_booking(booking_request(alice, space.id, at(10, 0), at(11, 0)))
        .await
        .unwrap();
    assert_eq!(first.status, BookingStatus::Pending);

    let err = service
        .create_booking(booking_request(bob, space.id, at(10, 30), at(11, 30)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::CapacityExceeded { capacity: 1, .. }));

    let touching = service
        .create_booking(booking_request(bob, space.id, at(11, 0), at(12, 0)))
        .await
        .unwrap();
    assert_eq!(touching.status, BookingStatus::Pending);
}

/// Test 2: Empty and inverted ranges are rejected before anything else
#[tokio::test]
async fn test_invalid_range_rejected_first() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);

    // Space does not even exist: the range check still wins.
    let err = service
        .create_booking(booking_request(UserId::new(), SpaceId::new(), at(10, 0), at(10, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::InvalidRange { .. }));
}

/// Test 3: A user cannot hold two overlapping bookings on one space
#[tokio::test]
async fn test_user_overlap() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(5)).await.unwrap();
    let user = UserId::new();

    service
        .create_booking(booking_request(user, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();
    let err = service
        .create_booking(booking_request(user, space.id, at(9, 30), at(10, 30)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ReservationError::UserOverlap {
            user_id: user,
            space_id: space.id
        }
    );
}

/// Test 4: Space in maintenance or soft-deleted refuses bookings
#[tokio::test]
async fn test_unavailable_space() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(2)).await.unwrap();
    service
        .update_space(
            space.id,
            SpaceUpdate {
                status: Some(SpaceStatus::Maintenance),
                ..SpaceUpdate::default()
            },
        )
        .await
        .unwrap();

    let err = service
        .create_booking(booking_request(UserId::new(), space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::SpaceUnavailable { .. }));

    let other = service.register_space(new_space(2)).await.unwrap();
    service.deactivate_space(other.id).await.unwrap();
    let err = service
        .create_booking(booking_request(UserId::new(), other.id, at(9, 0), at(10, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::SpaceUnavailable { .. }));
}

/// Test 5: Completed bookings cannot be cancelled
#[tokio::test]
async fn test_completed_booking_rejects_cancel() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(1)).await.unwrap();
    let booking = service
        .create_booking(booking_request(UserId::new(), space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();

    clock.set(at(9, 5));
    let checked_in = service.check_in(booking.id).await.unwrap();
    assert_eq!(checked_in.status, BookingStatus::CheckedIn);
    assert_eq!(checked_in.check_in_time, Some(at(9, 5)));

    clock.set(at(9, 55));
    let completed = service.check_out(booking.id).await.unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);
    assert_eq!(completed.check_out_time, Some(at(9, 55)));

    let err = service.cancel(booking.id).await.unwrap_err();
    assert_eq!(
        err,
        ReservationError::InvalidTransition {
            from: BookingStatus::Completed,
            action: "cancel",
        }
    );
}

/// Test 6: Check-out requires check-in; confirm is pending-only
#[tokio::test]
async fn test_illegal_transitions() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(1)).await.unwrap();
    let booking = service
        .create_booking(booking_request(UserId::new(), space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();

    assert!(matches!(
        service.check_out(booking.id).await,
        Err(ReservationError::InvalidTransition { .. })
    ));

    let confirmed = service.confirm(booking.id).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert!(service.confirm(booking.id).await.is_err());

    // Confirmed bookings can still be checked in.
    service.check_in(booking.id).await.unwrap();
    assert!(matches!(
        service.cancel(booking.id).await,
        Err(ReservationError::InvalidTransition {
            from: BookingStatus::CheckedIn,
            ..
        })
    ));
}

/// Test 7: Cancelled bookings free their capacity
#[tokio::test]
async fn test_cancel_releases_capacity() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(1)).await.unwrap();
    let first = service
        .create_booking(booking_request(UserId::new(), space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();
    service.cancel(first.id).await.unwrap();

    service
        .create_booking(booking_request(UserId::new(), space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();
}

/// Test 8: Delete only while pending/confirmed
#[tokio::test]
async fn test_delete_booking() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(2)).await.unwrap();
    let user = UserId::new();

    let pending = service
        .create_booking(booking_request(user, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();
    service.delete_booking(pending.id).await.unwrap();
    assert!(matches!(
        service.get_booking(pending.id).await,
        Err(ReservationError::NotFound { entity: "booking", .. })
    ));

    let started = service
        .create_booking(booking_request(user, space.id, at(11, 0), at(12, 0)))
        .await
        .unwrap();
    service.check_in(started.id).await.unwrap();
    assert!(matches!(
        service.delete_booking(started.id).await,
        Err(ReservationError::InvalidTransition { .. })
    ));
    assert!(service.get_booking(started.id).await.is_ok());
}

/// Test 9: Reschedule re-runs admission without counting the booking itself
#[tokio::test]
async fn test_reschedule() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(1)).await.unwrap();
    let user = UserId::new();

    let booking = service
        .create_booking(booking_request(user, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();
    let other = service
        .create_booking(booking_request(UserId::new(), space.id, at(11, 0), at(12, 0)))
        .await
        .unwrap();

    // Overlaps only itself.
    let moved = service
        .reschedule_booking(booking.id, Some(at(9, 30)), Some(at(10, 30)))
        .await
        .unwrap();
    assert_eq!(moved.start_time, at(9, 30));
    assert_eq!(moved.end_time, at(10, 30));

    // Overlaps the other user's booking on a capacity-one space.
    let err = service
        .reschedule_booking(booking.id, None, Some(at(11, 30)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::CapacityExceeded { .. }));

    // Only the end moves: the merged range must stay non-empty.
    let err = service
        .reschedule_booking(booking.id, None, Some(at(9, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::InvalidRange { .. }));

    service.check_in(other.id).await.unwrap();
    let err = service
        .reschedule_booking(other.id, Some(at(12, 0)), Some(at(13, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::InvalidTransition { .. }));
}

/// Test 10: Generic updates cannot touch status or space
#[tokio::test]
async fn test_update_booking_field_locks() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(1)).await.unwrap();
    let booking = service
        .create_booking(booking_request(UserId::new(), space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();

    let err = service
        .update_booking(
            booking.id,
            BookingPatch {
                status: Some(BookingStatus::Completed),
                ..BookingPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, ReservationError::FieldImmutable { field: "status" });

    let err = service
        .update_booking(
            booking.id,
            BookingPatch {
                space_id: Some(SpaceId::new()),
                ..BookingPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, ReservationError::FieldImmutable { field: "space_id" });

    let updated = service
        .update_booking(
            booking.id,
            BookingPatch {
                notes: Some("Bring the projector adapter".to_string()),
                ..BookingPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.notes.as_deref(), Some("Bring the projector adapter"));
    assert_eq!(updated.status, BookingStatus::Pending);

    service.cancel(booking.id).await.unwrap();
    let err = service
        .update_booking(
            booking.id,
            BookingPatch {
                notes: Some("too late".to_string()),
                ..BookingPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::InvalidTransition { .. }));
}

/// Test 11: Space reconciliation against live bookings
#[tokio::test]
async fn test_space_reconciliation() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(2)).await.unwrap();
    service
        .create_booking(booking_request(UserId::new(), space.id, at(9, 0), at(11, 0)))
        .await
        .unwrap();
    service
        .create_booking(booking_request(UserId::new(), space.id, at(10, 0), at(12, 0)))
        .await
        .unwrap();

    let err = service
        .update_space(
            space.id,
            SpaceUpdate {
                capacity: Some(1),
                ..SpaceUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReservationError::CapacityBelowActive {
            requested: 1,
            active: 2,
            ..
        }
    ));

    let err = service
        .update_space(
            space.id,
            SpaceUpdate {
                status: Some(SpaceStatus::Unavailable),
                ..SpaceUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::SpaceInUse { active: 2, .. }));
    assert!(matches!(
        service.deactivate_space(space.id).await,
        Err(ReservationError::SpaceInUse { .. })
    ));

    let unchanged = service.get_space(space.id).await.unwrap();
    assert_eq!(unchanged.capacity, 2);
    assert_eq!(unchanged.status, SpaceStatus::Available);

    // Once every booking has ended the space can be closed.
    clock.set(at(12, 0));
    let closed = service
        .update_space(
            space.id,
            SpaceUpdate {
                status: Some(SpaceStatus::Unavailable),
                capacity: Some(1),
                ..SpaceUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(closed.status, SpaceStatus::Unavailable);
    assert_eq!(closed.capacity, 1);
}

/// Test 12: Listing filters by user, space and status
#[tokio::test]
async fn test_list_bookings_filters() {
    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(3)).await.unwrap();
    let user = student();

    let early = service
        .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();
    service
        .create_booking(booking_request(user.id, space.id, at(13, 0), at(14, 0)))
        .await
        .unwrap();
    service
        .create_booking(booking_request(UserId::new(), space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();
    service.cancel(early.id).await.unwrap();

    let mine = service
        .list_bookings(&BookingFilter {
            user_id: Some(user.id),
            ..BookingFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine[0].start_time < mine[1].start_time);

    let cancelled = service
        .list_bookings(&BookingFilter {
            status: Some(BookingStatus::Cancelled),
            ..BookingFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, early.id);

    let all = service
        .list_bookings(&BookingFilter {
            space_id: Some(space.id),
            ..BookingFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

/// Test 13: Ratings need a completed booking and are one per user and space
#[tokio::test]
async fn test_rate_space() {
    use study_space_core::rating::NewRating;

    let clock = ManualClock::new(at(8, 0));
    let service = service(&clock);
    let space = service.register_space(new_space(2)).await.unwrap();
    let user = UserId::new();
    let rating = |score| NewRating {
        user_id: user,
        space_id: space.id,
        score,
        comment: None,
    };

    assert!(matches!(
        service.rate_space(rating(5)).await,
        Err(ReservationError::RatingNotAllowed { .. })
    ));

    let booking = service
        .create_booking(booking_request(user, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();
    service.check_in(booking.id).await.unwrap();
    clock.advance(Duration::hours(2));
    service.check_out(booking.id).await.unwrap();

    assert!(matches!(
        service.rate_space(rating(6)).await,
        Err(ReservationError::InvalidInput(_))
    ));
    service.rate_space(rating(4)).await.unwrap();
    assert!(matches!(
        service.rate_space(rating(5)).await,
        Err(ReservationError::DuplicateRating { .. })
    ));

    let rated = service.get_space(space.id).await.unwrap();
    assert_eq!(rated.total_ratings, 1);
    assert!((rated.average_rating - 4.0).abs() < f64::EPSILON);
    assert_eq!(service.list_ratings(Some(space.id)).await.unwrap().len(), 1);
}
