//! Concurrent admission tests.
//!
//! Many tasks race for the same window; the number admitted must never
//! exceed the space's capacity.
//!
//! Run with: `cargo test -p study-space-runtime --test concurrency_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use futures::future::join_all;
use proptest::prelude::*;
use std::sync::Arc;
use study_space_core::ReservationError;
use study_space_core::booking::BookingFilter;
use study_space_core::space::{SpaceUpdate, peak_concurrency};
use study_space_runtime::{ReservationConfig, ReservationService};
use study_space_testing::fixtures::{at, booking_request, new_space, student};
use study_space_testing::properties::quarter_hour_range;
use study_space_testing::{InMemoryReservationStore, ManualClock};

fn service() -> ReservationService<InMemoryReservationStore> {
    ReservationService::new(
        Arc::new(InMemoryReservationStore::new()),
        Arc::new(ManualClock::new(at(8, 0))),
        ReservationConfig::default(),
    )
}

async fn race(
    service: &ReservationService<InMemoryReservationStore>,
    capacity: u32,
    contenders: usize,
) -> (usize, usize) {
    let space = service.register_space(new_space(capacity)).await.unwrap();
    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let service = service.clone();
            let user = student();
            tokio::spawn(async move {
                service
                    .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
                    .await
            })
        })
        .collect();

    let mut admitted = 0;
    let mut rejected = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(_) => admitted += 1,
            Err(ReservationError::CapacityExceeded { .. }) => rejected += 1,
            Err(other) => unreachable!("unexpected error {other}"),
        }
    }
    (admitted, rejected)
}

/// Test 1: Fifty contenders for one seat
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_seat_race() {
    let service = service();
    let (admitted, rejected) = race(&service, 1, 50).await;
    assert_eq!(admitted, 1);
    assert_eq!(rejected, 49);
}

/// Test 2: Capacity N admits exactly N
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_race() {
    for capacity in [2, 5, 10] {
        let service = service();
        let (admitted, rejected) = race(&service, capacity, 40).await;
        assert_eq!(admitted, capacity as usize);
        assert_eq!(rejected, 40 - capacity as usize);
        assert_eq!(
            service.list_bookings(&BookingFilter::default()).await.unwrap().len(),
            capacity as usize
        );
    }
}

/// Test 3: Capacity cuts racing admissions never strand the space over capacity
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_update_races_admission() {
    let service = service();
    let space = service.register_space(new_space(4)).await.unwrap();

    let shrink = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .update_space(
                    space.id,
                    SpaceUpdate {
                        capacity: Some(2),
                        ..SpaceUpdate::default()
                    },
                )
                .await
        })
    };
    let bookings: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let user = student();
            tokio::spawn(async move {
                service
                    .create_booking(booking_request(user.id, space.id, at(9, 0), at(10, 0)))
                    .await
            })
        })
        .collect();

    let shrink = shrink.await.unwrap();
    let admitted = join_all(bookings)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    let capacity = service.get_space(space.id).await.unwrap().capacity as usize;
    assert!(admitted <= capacity, "{admitted} admitted with capacity {capacity}");
    match shrink {
        Ok(_) => assert_eq!(capacity, 2),
        Err(ReservationError::CapacityBelowActive { .. }) => assert_eq!(capacity, 4),
        Err(other) => unreachable!("unexpected error {other}"),
    }
}

proptest! {
    /// Whatever mix of windows is requested, the admitted bookings never
    /// overlap more than `capacity` deep.
    #[test]
    fn prop_admitted_bookings_fit_capacity(
        capacity in 1u32..4,
        ranges in prop::collection::vec(quarter_hour_range(at(8, 0)), 1..30),
    ) {
        tokio_test::block_on(async {
            let service = service();
            let space = service.register_space(new_space(capacity)).await.unwrap();
            for range in ranges {
                let user = student();
                let _ = service
                    .create_booking(booking_request(user.id, space.id, range.start(), range.end()))
                    .await;
            }

            let admitted = service
                .list_bookings(&BookingFilter {
                    space_id: Some(space.id),
                    ..BookingFilter::default()
                })
                .await
                .unwrap();
            assert!(peak_concurrency(&admitted) <= capacity as usize);
        });
    }
}
