//! Space ratings and the running average kept on the space row.

use crate::PostgresReservationStore;
use crate::rows::{self, RATING_COLUMNS, is_unique_violation, storage};
use crate::spaces::{lock_space, write_space};
use sqlx::Row;
use study_space_core::error::{ReservationError, Result};
use study_space_core::rating::Rating;
use study_space_core::store::RatingStore;
use study_space_core::types::SpaceId;

impl RatingStore for PostgresReservationStore {
    async fn record_rating(&self, rating: Rating) -> Result<Rating> {
        let user_id = rating.user_id;
        let space_id = rating.space_id;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let mut space = match lock_space(&mut *tx, space_id).await? {
            Some(space) if space.is_active => space,
            _ => return Err(ReservationError::SpaceUnavailable { space_id }),
        };

        let used: bool = sqlx::query(
            r"
            SELECT EXISTS(
                SELECT 1 FROM bookings
                WHERE user_id = $1 AND space_id = $2 AND status = 'completed'
            ) AS used
            ",
        )
        .bind(user_id.as_uuid())
        .bind(space_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(storage("Failed to check completed bookings"))?
        .try_get("used")
        .map_err(|e| ReservationError::StorageError(format!("Failed to decode `used`: {e}")))?;
        if !used {
            return Err(ReservationError::RatingNotAllowed { user_id, space_id });
        }

        sqlx::query(
            r"
            INSERT INTO ratings (id, user_id, space_id, score, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(rating.id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(space_id.as_uuid())
        .bind(i16::from(rating.score))
        .bind(&rating.comment)
        .bind(rating.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ReservationError::DuplicateRating { user_id, space_id }
            } else {
                storage("Failed to insert rating")(e)
            }
        })?;

        space.record_rating(rating.score);
        write_space(&mut *tx, &space).await?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit rating"))?;
        Ok(rating)
    }

    async fn list_ratings(&self, space_id: Option<SpaceId>) -> Result<Vec<Rating>> {
        let sql = format!(
            "SELECT {RATING_COLUMNS} FROM ratings \
             WHERE ($1::uuid IS NULL OR space_id = $1) \
             ORDER BY created_at DESC"
        );
        sqlx::query(&sql)
            .bind(space_id.map(|id| *id.as_uuid()))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list ratings"))?
            .iter()
            .map(rows::rating)
            .collect()
    }
}
