//! Bookable spaces and the guards that keep them consistent with live bookings.

use crate::booking::Booking;
use crate::error::{ReservationError, Result};
use crate::types::SpaceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Availability state of a space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceStatus {
    /// Open for bookings
    Available,
    /// Closed for bookings
    Unavailable,
    /// Temporarily closed for maintenance
    Maintenance,
}

impl SpaceStatus {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for SpaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SpaceStatus {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(Self::Available),
            "unavailable" => Ok(Self::Unavailable),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(ReservationError::InvalidInput(format!(
                "unknown space status `{other}`"
            ))),
        }
    }
}

/// A bookable space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Space {
    /// Space ID
    pub id: SpaceId,
    /// Display name
    pub name: String,
    /// Maximum number of concurrently overlapping active bookings
    pub capacity: u32,
    /// Availability state
    pub status: SpaceStatus,
    /// `false` once soft-deleted
    pub is_active: bool,
    /// Where to find it
    pub location: Option<String>,
    /// Free-text description
    pub description: Option<String>,
    /// Running mean of all rating scores
    pub average_rating: f64,
    /// Number of ratings folded into `average_rating`
    pub total_ratings: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Space {
    /// Builds a new active space from an admin request.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::InvalidInput`] if capacity is zero or the name is blank.
    pub fn create(request: NewSpace, now: DateTime<Utc>) -> Result<Self> {
        validate_capacity(request.capacity)?;
        if request.name.trim().is_empty() {
            return Err(ReservationError::InvalidInput(
                "space name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id: SpaceId::new(),
            name: request.name,
            capacity: request.capacity,
            status: request.status,
            is_active: true,
            location: request.location,
            description: request.description,
            average_rating: 0.0,
            total_ratings: 0,
            created_at: now,
        })
    }

    /// Active and `available`: the only state that admits new bookings.
    #[must_use]
    pub fn accepts_bookings(&self) -> bool {
        self.is_active && self.status == SpaceStatus::Available
    }

    /// Checks `update` against the space's live bookings and applies it.
    ///
    /// `live` must hold every `pending`/`confirmed`/`checked_in` booking on
    /// this space that has not ended yet, read in the same atomic unit as
    /// the write that follows.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidInput`] for a zero capacity or blank name
    /// - [`ReservationError::CapacityBelowActive`] if capacity would drop below
    ///   the peak number of overlapping live bookings
    /// - [`ReservationError::SpaceInUse`] if the space would leave `available`
    ///   while live bookings exist
    pub fn apply_update(&mut self, update: SpaceUpdate, live: &[Booking]) -> Result<()> {
        if let Some(capacity) = update.capacity {
            validate_capacity(capacity)?;
            let active = peak_concurrency(live);
            if (capacity as usize) < active {
                return Err(ReservationError::CapacityBelowActive {
                    space_id: self.id,
                    requested: capacity,
                    active,
                });
            }
        }
        if let Some(status) = update.status {
            if status != SpaceStatus::Available && !live.is_empty() {
                return Err(ReservationError::SpaceInUse {
                    space_id: self.id,
                    active: live.len(),
                });
            }
        }
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(ReservationError::InvalidInput(
                    "space name must not be empty".to_string(),
                ));
            }
        }

        if let Some(capacity) = update.capacity {
            self.capacity = capacity;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(location) = update.location {
            self.location = Some(location);
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        Ok(())
    }

    /// Soft-deletes the space unless live bookings exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::SpaceInUse`] if `live` is non-empty.
    pub fn deactivate(&mut self, live: &[Booking]) -> Result<()> {
        if !live.is_empty() {
            return Err(ReservationError::SpaceInUse {
                space_id: self.id,
                active: live.len(),
            });
        }
        self.is_active = false;
        Ok(())
    }

    /// Folds a new score into the running average.
    pub fn record_rating(&mut self, score: u8) {
        let total = self.total_ratings.saturating_add(1);
        let previous = f64::from(total - 1);
        self.average_rating = self.average_rating.mul_add(previous, f64::from(score)) / f64::from(total);
        self.total_ratings = total;
    }
}

/// Admin request to create a space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSpace {
    /// Display name
    pub name: String,
    /// Capacity (must be ≥ 1)
    pub capacity: u32,
    /// Initial availability
    pub status: SpaceStatus,
    /// Location
    pub location: Option<String>,
    /// Description
    pub description: Option<String>,
}

/// Admin request to modify a space. `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceUpdate {
    /// New display name
    pub name: Option<String>,
    /// New capacity
    pub capacity: Option<u32>,
    /// New availability
    pub status: Option<SpaceStatus>,
    /// New location
    pub location: Option<String>,
    /// New description
    pub description: Option<String>,
}

fn validate_capacity(capacity: u32) -> Result<()> {
    if capacity == 0 {
        return Err(ReservationError::InvalidInput(
            "capacity must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// Largest number of bookings in `bookings` whose intervals all overlap at one instant.
///
/// Intervals are half-open, so a booking ending at `t` and another starting
/// at `t` never count together.
#[must_use]
pub fn peak_concurrency(bookings: &[Booking]) -> usize {
    // Ends sort before starts at the same instant (false < true).
    let mut edges: Vec<(DateTime<Utc>, bool)> = bookings
        .iter()
        .flat_map(|b| [(b.start_time, true), (b.end_time, false)])
        .collect();
    edges.sort_unstable();

    let mut current = 0usize;
    let mut peak = 0usize;
    for (_, is_start) in edges {
        if is_start {
            current += 1;
            peak = peak.max(current);
        } else {
            current = current.saturating_sub(1);
        }
    }
    peak
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::booking::{BookingStatus, NewBooking};
    use crate::types::{TimeRange, UserId};
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    fn space(capacity: u32) -> Space {
        Space::create(
            NewSpace {
                name: "Quiet room".to_string(),
                capacity,
                status: SpaceStatus::Available,
                location: None,
                description: None,
            },
            at(0, 0),
        )
        .unwrap()
    }

    fn booking(space: &Space, start: DateTime<Utc>, end: DateTime<Utc>) -> Booking {
        Booking::pending(
            NewBooking {
                user_id: UserId::new(),
                space_id: space.id,
                start,
                end,
                notes: None,
                qr_code_data: None,
            },
            TimeRange::new(start, end).unwrap(),
            at(0, 0),
        )
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = Space::create(
            NewSpace {
                name: "Broom cupboard".to_string(),
                capacity: 0,
                status: SpaceStatus::Available,
                location: None,
                description: None,
            },
            at(0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, ReservationError::InvalidInput(_)));
    }

    #[test]
    fn peak_concurrency_ignores_touching_intervals() {
        let s = space(3);
        let bookings = vec![
            booking(&s, at(9, 0), at(10, 0)),
            booking(&s, at(10, 0), at(11, 0)),
            booking(&s, at(10, 30), at(12, 0)),
        ];
        assert_eq!(peak_concurrency(&bookings), 2);
        assert_eq!(peak_concurrency(&[]), 0);
    }

    #[test]
    fn capacity_cannot_drop_below_overlapping_bookings() {
        let mut s = space(3);
        let live = vec![
            booking(&s, at(9, 0), at(11, 0)),
            booking(&s, at(10, 0), at(12, 0)),
        ];
        let err = s
            .apply_update(
                SpaceUpdate {
                    capacity: Some(1),
                    ..SpaceUpdate::default()
                },
                &live,
            )
            .unwrap_err();
        assert_eq!(
            err,
            ReservationError::CapacityBelowActive {
                space_id: s.id,
                requested: 1,
                active: 2,
            }
        );
        assert_eq!(s.capacity, 3);

        s.apply_update(
            SpaceUpdate {
                capacity: Some(2),
                ..SpaceUpdate::default()
            },
            &live,
        )
        .unwrap();
        assert_eq!(s.capacity, 2);
    }

    #[test]
    fn cannot_close_space_with_live_bookings() {
        let mut s = space(1);
        let mut live = vec![booking(&s, at(9, 0), at(10, 0))];
        live[0].status = BookingStatus::CheckedIn;
        for status in [SpaceStatus::Unavailable, SpaceStatus::Maintenance] {
            let err = s
                .apply_update(
                    SpaceUpdate {
                        status: Some(status),
                        ..SpaceUpdate::default()
                    },
                    &live,
                )
                .unwrap_err();
            assert!(matches!(err, ReservationError::SpaceInUse { active: 1, .. }));
        }
        assert!(s.deactivate(&live).is_err());
        assert!(s.is_active);

        s.deactivate(&[]).unwrap();
        assert!(!s.accepts_bookings());
    }

    #[test]
    fn running_average_matches_mean() {
        let mut s = space(1);
        for score in [5, 4, 3] {
            s.record_rating(score);
        }
        assert_eq!(s.total_ratings, 3);
        assert!((s.average_rating - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rating_count_saturates() {
        let mut s = space(1);
        s.total_ratings = u32::MAX;
        s.average_rating = 3.0;
        s.record_rating(3);
        assert_eq!(s.total_ratings, u32::MAX);
        assert!((s.average_rating - 3.0).abs() < 1e-9);
        s.record_rating(5);
        assert!(s.average_rating > 3.0 && s.average_rating < 3.001);
    }
}
