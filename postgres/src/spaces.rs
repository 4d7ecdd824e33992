//! Space directory: registration, updates and soft deletion.

use crate::PostgresReservationStore;
use crate::rows::{self, SPACE_COLUMNS, storage, to_i32};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use study_space_core::booking::Booking;
use study_space_core::error::{ReservationError, Result};
use study_space_core::space::{Space, SpaceUpdate};
use study_space_core::store::SpaceDirectory;
use study_space_core::types::SpaceId;

/// Lock a space row for the rest of the transaction.
pub(crate) async fn lock_space(conn: &mut PgConnection, id: SpaceId) -> Result<Option<Space>> {
    let sql = format!("SELECT {SPACE_COLUMNS} FROM spaces WHERE id = $1 FOR UPDATE");
    sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(storage("Failed to lock space"))?
        .as_ref()
        .map(rows::space)
        .transpose()
}

/// Bookings that still hold the space: live and not yet ended.
async fn live_bookings(
    conn: &mut PgConnection,
    id: SpaceId,
    now: DateTime<Utc>,
) -> Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {} FROM bookings \
         WHERE space_id = $1 AND status IN ('pending', 'confirmed', 'checked_in') AND end_time > $2",
        rows::BOOKING_COLUMNS
    );
    sqlx::query(&sql)
        .bind(id.as_uuid())
        .bind(now)
        .fetch_all(conn)
        .await
        .map_err(storage("Failed to load live bookings"))?
        .iter()
        .map(rows::booking)
        .collect()
}

pub(crate) async fn write_space(conn: &mut PgConnection, space: &Space) -> Result<()> {
    sqlx::query(
        r"
        UPDATE spaces
        SET name = $2, capacity = $3, status = $4, is_active = $5,
            location = $6, description = $7, average_rating = $8, total_ratings = $9
        WHERE id = $1
        ",
    )
    .bind(space.id.as_uuid())
    .bind(&space.name)
    .bind(to_i32(space.capacity, "capacity")?)
    .bind(space.status.as_str())
    .bind(space.is_active)
    .bind(&space.location)
    .bind(&space.description)
    .bind(space.average_rating)
    .bind(to_i32(space.total_ratings, "total_ratings")?)
    .execute(conn)
    .await
    .map_err(storage("Failed to update space"))?;
    Ok(())
}

impl PostgresReservationStore {
    /// Lock the space, check `guard` against its live bookings and persist.
    async fn guarded_space_change<F>(
        &self,
        id: SpaceId,
        now: DateTime<Utc>,
        guard: F,
    ) -> Result<Space>
    where
        F: FnOnce(&mut Space, &[Booking]) -> Result<()> + Send,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        let mut space = lock_space(&mut *tx, id)
            .await?
            .ok_or_else(|| ReservationError::not_found("space", id))?;
        let live = live_bookings(&mut *tx, id, now).await?;
        guard(&mut space, &live)?;
        write_space(&mut *tx, &space).await?;
        tx.commit()
            .await
            .map_err(storage("Failed to commit space change"))?;
        Ok(space)
    }
}

impl SpaceDirectory for PostgresReservationStore {
    async fn get_space(&self, id: SpaceId) -> Result<Option<Space>> {
        let sql = format!("SELECT {SPACE_COLUMNS} FROM spaces WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to get space"))?
            .as_ref()
            .map(rows::space)
            .transpose()
    }

    async fn insert_space(&self, space: &Space) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO spaces
                (id, name, capacity, status, is_active, location, description,
                 average_rating, total_ratings, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(space.id.as_uuid())
        .bind(&space.name)
        .bind(to_i32(space.capacity, "capacity")?)
        .bind(space.status.as_str())
        .bind(space.is_active)
        .bind(&space.location)
        .bind(&space.description)
        .bind(space.average_rating)
        .bind(to_i32(space.total_ratings, "total_ratings")?)
        .bind(space.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to insert space"))?;
        Ok(())
    }

    async fn update_space(
        &self,
        id: SpaceId,
        update: SpaceUpdate,
        now: DateTime<Utc>,
    ) -> Result<Space> {
        self.guarded_space_change(id, now, move |space, live| space.apply_update(update, live))
            .await
    }

    async fn deactivate_space(&self, id: SpaceId, now: DateTime<Utc>) -> Result<Space> {
        self.guarded_space_change(id, now, |space, live| space.deactivate(live))
            .await
    }
}
