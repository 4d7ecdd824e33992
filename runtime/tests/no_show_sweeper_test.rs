//! No-show sweeper tests.
//!
//! Grace-period boundaries, exactly-once penalties, per-booking failure
//! isolation, health reporting and the spawned loop's shutdown.
//!
//! Run with: `cargo test -p study-space-runtime --test no_show_sweeper_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::Duration;
use std::sync::Arc;
use study_space_core::booking::Booking;
use study_space_core::penalty::{NewPenalty, PenaltyFilter, PenaltyType};
use study_space_core::types::TimeRange;
use study_space_core::{BookingStatus, ReservationError};
use study_space_runtime::{HealthStatus, ReservationConfig, ReservationService, RetryPolicy};
use study_space_testing::fixtures::{at, booking_request, new_space, student};
use study_space_testing::{InMemoryReservationStore, ManualClock};
use tokio::sync::broadcast;

struct Harness {
    service: ReservationService<InMemoryReservationStore>,
    store: Arc<InMemoryReservationStore>,
    clock: ManualClock,
}

fn harness() -> Harness {
    study_space_testing::init_test_tracing();
    let clock = ManualClock::new(at(8, 0));
    let store = Arc::new(InMemoryReservationStore::new());
    let mut config = ReservationConfig::default();
    config.sweeper.settle_retry = RetryPolicy::none();
    config.sweeper.interval = std::time::Duration::from_millis(20);
    let service = ReservationService::new(Arc::clone(&store), Arc::new(clock.clone()), config);
    Harness {
        service,
        store,
        clock,
    }
}

/// Test 1: Grace period boundary and idempotent re-runs
///
/// Booking 09:00–10:00 with a 15 minute grace period: untouched at 09:10,
/// swept at 09:16 with exactly one penalty, unchanged at 09:20.
#[tokio::test]
async fn test_grace_period_and_idempotence() {
    let h = harness();
    let user = student();
    h.store.insert_user(user.clone());
    let space = h.service.register_space(new_space(1)).await.unwrap();
    let booking = h
        .service
        .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();

    h.clock.set(at(9, 10));
    let report = h.service.run_no_show_sweep().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(
        h.service.get_booking(booking.id).await.unwrap().status,
        BookingStatus::Pending
    );

    // Exactly at the cutoff the booking is still within grace.
    h.clock.set(at(9, 15));
    assert_eq!(h.service.run_no_show_sweep().await.unwrap().processed, 0);

    h.clock.set(at(9, 16));
    let report = h.service.run_no_show_sweep().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.failed.is_empty());
    assert_eq!(
        h.service.get_booking(booking.id).await.unwrap().status,
        BookingStatus::NoShow
    );

    let penalties = h
        .service
        .list_penalties(&PenaltyFilter {
            booking_id: Some(booking.id),
            ..PenaltyFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(penalties.len(), 1);
    assert_eq!(penalties[0].penalty_type, PenaltyType::NoShow);
    assert_eq!(penalties[0].points, 1);
    assert_eq!(
        penalties[0].reason.as_deref(),
        Some("did not check in within grace period")
    );
    assert_eq!(penalties[0].expires_at, at(9, 16) + Duration::days(30));
    assert_eq!(h.service.penalty_balance(user.id).await.unwrap(), 1);

    h.clock.set(at(9, 20));
    let report = h.service.run_no_show_sweep().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(h.store.penalties().len(), 1);
    assert_eq!(h.service.penalty_balance(user.id).await.unwrap(), 1);
}

/// Test 2: Check-in after the sweep is refused
#[tokio::test]
async fn test_check_in_after_no_show_fails() {
    let h = harness();
    let user = student();
    h.store.insert_user(user.clone());
    let space = h.service.register_space(new_space(1)).await.unwrap();
    let booking = h
        .service
        .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();

    h.clock.set(at(9, 30));
    h.service.run_no_show_sweep().await.unwrap();

    let err = h.service.check_in(booking.id).await.unwrap_err();
    assert_eq!(
        err,
        ReservationError::InvalidTransition {
            from: BookingStatus::NoShow,
            action: "check in",
        }
    );
}

/// Test 3: Checked-in and cancelled bookings are never swept
#[tokio::test]
async fn test_only_pending_and_confirmed_are_swept() {
    let h = harness();
    let user = student();
    h.store.insert_user(user.clone());
    let space = h.service.register_space(new_space(3)).await.unwrap();

    let arrived = h
        .service
        .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();
    let dropped = h
        .service
        .create_booking(booking_request(user.id, space.id, at(10, 0), at(11, 0)))
        .await
        .unwrap();
    let confirmed = h
        .service
        .create_booking(booking_request(user.id, space.id, at(11, 0), at(12, 0)))
        .await
        .unwrap();
    h.service.check_in(arrived.id).await.unwrap();
    h.service.cancel(dropped.id).await.unwrap();
    h.service.confirm(confirmed.id).await.unwrap();

    h.clock.set(at(13, 0));
    let report = h.service.run_no_show_sweep().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(
        h.service.get_booking(confirmed.id).await.unwrap().status,
        BookingStatus::NoShow
    );
    assert_eq!(
        h.service.get_booking(arrived.id).await.unwrap().status,
        BookingStatus::CheckedIn
    );
}

/// Test 4: One failing booking does not abort the batch
#[tokio::test]
async fn test_failure_isolation() {
    let h = harness();
    let users: Vec<_> = (0..3).map(|_| student()).collect();
    for user in &users {
        h.store.insert_user(user.clone());
    }
    let space = h.service.register_space(new_space(3)).await.unwrap();
    let mut bookings = Vec::new();
    for user in &users {
        bookings.push(
            h.service
                .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
                .await
                .unwrap(),
        );
    }
    h.store.fail_settlement_for(bookings[1].id);

    h.clock.set(at(9, 30));
    let report = h.service.run_no_show_sweep().await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, vec![bookings[1].id]);

    assert_eq!(
        h.service.get_booking(bookings[1].id).await.unwrap().status,
        BookingStatus::Pending
    );
    assert_eq!(h.service.penalty_balance(users[1].id).await.unwrap(), 0);
    assert_eq!(h.service.penalty_balance(users[0].id).await.unwrap(), 1);
    assert_eq!(h.service.penalty_balance(users[2].id).await.unwrap(), 1);

    let health = h.service.health().await;
    assert_eq!(health.status, HealthStatus::Degraded);

    // The failed booking is picked up again on the next run.
    let report = h.service.run_no_show_sweep().await.unwrap();
    assert_eq!(report.failed, vec![bookings[1].id]);
}

/// Test 5: A booking that already carries a no-show penalty is left untouched
#[tokio::test]
async fn test_existing_penalty_is_not_duplicated() {
    let h = harness();
    let user = student();
    h.store.insert_user(user.clone());
    let space = h.service.register_space(new_space(1)).await.unwrap();
    let booking = h
        .service
        .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();

    h.service
        .create_penalty(NewPenalty {
            user_id: user.id,
            booking_id: Some(booking.id),
            penalty_type: PenaltyType::NoShow,
            points: Some(2),
            reason: Some("recorded by front desk".to_string()),
            expires_at: None,
        })
        .await
        .unwrap();

    h.clock.set(at(9, 30));
    let report = h.service.run_no_show_sweep().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        h.service.get_booking(booking.id).await.unwrap().status,
        BookingStatus::Pending
    );
    assert_eq!(h.store.penalties().len(), 1);
    assert_eq!(h.service.penalty_balance(user.id).await.unwrap(), 2);

    // Later runs keep skipping it.
    h.clock.set(at(9, 45));
    let report = h.service.run_no_show_sweep().await.unwrap();
    assert_eq!((report.processed, report.skipped), (0, 1));
    assert_eq!(
        h.service.get_booking(booking.id).await.unwrap().status,
        BookingStatus::Pending
    );
    assert_eq!(h.store.penalties().len(), 1);
}

/// Test 6: A run that cannot list bookings marks the sweeper unhealthy
#[tokio::test]
async fn test_run_level_failure_is_unhealthy() {
    let h = harness();
    assert_eq!(h.service.health().await.status, HealthStatus::Healthy);

    h.store.fail_next_overdue_query();
    assert!(matches!(
        h.service.run_no_show_sweep().await,
        Err(ReservationError::StorageError(_))
    ));
    assert_eq!(h.service.health().await.status, HealthStatus::Unhealthy);

    h.service.run_no_show_sweep().await.unwrap();
    assert_eq!(h.service.health().await.status, HealthStatus::Healthy);
}

/// Test 7: Concurrent sweeps penalize each booking once
#[tokio::test]
async fn test_overlapping_sweeps_penalize_once() {
    let h = harness();
    let space = h.service.register_space(new_space(10)).await.unwrap();
    let mut users = Vec::new();
    for _ in 0..10 {
        let user = student();
        h.store.insert_user(user.clone());
        h.service
            .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
            .await
            .unwrap();
        users.push(user);
    }

    h.clock.set(at(9, 30));
    let runs: Vec<_> = (0..4)
        .map(|_| {
            let service = h.service.clone();
            tokio::spawn(async move { service.run_no_show_sweep().await })
        })
        .collect();
    let reports = futures::future::join_all(runs).await;
    let processed: usize = reports
        .into_iter()
        .map(|r| r.unwrap().unwrap().processed)
        .sum();

    assert_eq!(processed, 10);
    assert_eq!(h.store.penalties().len(), 10);
    for user in &users {
        assert_eq!(h.store.user_balance(user.id), Some(1));
    }
}

/// Test 8: Racing check-in and sweep never both succeed
#[tokio::test]
async fn test_check_in_races_sweep() {
    for _ in 0..20 {
        let h = harness();
        let user = student();
        h.store.insert_user(user.clone());
        let booking = Booking::pending(
            booking_request(user.id, study_space_core::SpaceId::new(), at(9, 0), at(10, 0)),
            TimeRange::new(at(9, 0), at(10, 0)).unwrap(),
            at(8, 0),
        );
        h.store.put_booking(booking.clone());
        h.clock.set(at(9, 20));

        let sweeping = {
            let service = h.service.clone();
            tokio::spawn(async move { service.run_no_show_sweep().await })
        };
        let checking_in = {
            let service = h.service.clone();
            tokio::spawn(async move { service.check_in(booking.id).await })
        };
        let report = sweeping.await.unwrap().unwrap();
        let check_in = checking_in.await.unwrap();

        let status = h.service.get_booking(booking.id).await.unwrap().status;
        match status {
            BookingStatus::CheckedIn => {
                assert!(check_in.is_ok());
                assert_eq!(report.processed, 0);
                assert!(h.store.penalties().is_empty());
            },
            BookingStatus::NoShow => {
                assert!(matches!(check_in, Err(ReservationError::InvalidTransition { .. })));
                assert_eq!(report.processed, 1);
                assert_eq!(h.store.user_balance(user.id), Some(1));
            },
            other => unreachable!("unexpected status {other}"),
        }
    }
}

/// Test 9: The spawned loop sweeps on its own and stops on shutdown
#[tokio::test]
async fn test_spawned_sweeper_runs_and_shuts_down() {
    let h = harness();
    let user = student();
    h.store.insert_user(user.clone());
    let space = h.service.register_space(new_space(1)).await.unwrap();
    let booking = h
        .service
        .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();
    h.clock.set(at(9, 30));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = h.service.sweeper().spawn(shutdown_rx);

    let mut swept = false;
    for _ in 0..100 {
        if h.service.get_booking(booking.id).await.unwrap().status == BookingStatus::NoShow {
            swept = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(swept, "sweeper did not process the overdue booking");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("sweeper should stop after shutdown")
        .unwrap();
    assert_eq!(h.store.penalties().len(), 1);
}

/// Test 10: A negative grace period never sweeps bookings that have not started
#[tokio::test]
async fn test_negative_grace_is_treated_as_zero() {
    let clock = ManualClock::new(at(8, 0));
    let store = Arc::new(InMemoryReservationStore::new());
    let mut config = ReservationConfig::default();
    config.sweeper.settle_retry = RetryPolicy::none();
    config.sweeper.grace_period = Duration::minutes(-120);
    let service = ReservationService::new(Arc::clone(&store), Arc::new(clock.clone()), config);

    let user = student();
    store.insert_user(user.clone());
    let space = service.register_space(new_space(1)).await.unwrap();
    let booking = service
        .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
        .await
        .unwrap();

    let report = service.run_no_show_sweep().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(
        service.get_booking(booking.id).await.unwrap().status,
        BookingStatus::Pending
    );

    clock.set(at(9, 0));
    assert_eq!(service.run_no_show_sweep().await.unwrap().processed, 0);

    clock.set(at(9, 1));
    assert_eq!(service.run_no_show_sweep().await.unwrap().processed, 1);
}
