//! Post-use space ratings.

use crate::error::{ReservationError, Result};
use crate::types::{RatingId, SpaceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest accepted score.
pub const MIN_SCORE: u8 = 1;
/// Highest accepted score.
pub const MAX_SCORE: u8 = 5;

/// A user's rating of a space they have used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    /// Rating ID
    pub id: RatingId,
    /// Author
    pub user_id: UserId,
    /// Rated space
    pub space_id: SpaceId,
    /// Score in `1..=5`
    pub score: u8,
    /// Optional comment
    pub comment: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Request to rate a space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRating {
    /// Author
    pub user_id: UserId,
    /// Rated space
    pub space_id: SpaceId,
    /// Score in `1..=5`
    pub score: u8,
    /// Optional comment
    pub comment: Option<String>,
}

impl Rating {
    /// Validates the score and builds the rating.
    ///
    /// Eligibility (completed booking, one rating per user and space) is
    /// checked by the store, which holds the data.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::InvalidInput`] if the score is outside `1..=5`.
    pub fn create(request: NewRating, now: DateTime<Utc>) -> Result<Self> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&request.score) {
            return Err(ReservationError::InvalidInput(format!(
                "score must be between {MIN_SCORE} and {MAX_SCORE}, got {}",
                request.score
            )));
        }
        Ok(Self {
            id: RatingId::new(),
            user_id: request.user_id,
            space_id: request.space_id,
            score: request.score,
            comment: request.comment,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn score_bounds_are_inclusive() {
        for score in [0u8, 6, 255] {
            let err = Rating::create(
                NewRating {
                    user_id: UserId::new(),
                    space_id: SpaceId::new(),
                    score,
                    comment: None,
                },
                Utc::now(),
            )
            .unwrap_err();
            assert!(matches!(err, ReservationError::InvalidInput(_)));
        }
        for score in MIN_SCORE..=MAX_SCORE {
            assert!(
                Rating::create(
                    NewRating {
                        user_id: UserId::new(),
                        space_id: SpaceId::new(),
                        score,
                        comment: None,
                    },
                    Utc::now(),
                )
                .is_ok()
            );
        }
    }
}
