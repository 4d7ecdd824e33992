//! Booking admission, lifecycle transitions and the overdue query.

use crate::PostgresReservationStore;
use crate::rows::{self, BOOKING_COLUMNS, is_foreign_key_violation, storage};
use crate::spaces::lock_space;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use study_space_core::admission::{self, Candidate};
use study_space_core::booking::{Booking, BookingFilter, Reschedule, Transition};
use study_space_core::error::{ReservationError, Result};
use study_space_core::store::BookingStore;
use study_space_core::types::{BookingId, SpaceId, TimeRange};
use study_space_core::BookingStatus;
use tracing::debug;

/// Lock a booking row for the rest of the transaction.
pub(crate) async fn lock_booking(conn: &mut PgConnection, id: BookingId) -> Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
    sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(storage("Failed to lock booking"))?
        .as_ref()
        .map(rows::booking)
        .transpose()
}

/// Active bookings on `space_id` overlapping `range`.
///
/// Must run after the space row is locked.
async fn competing_bookings(
    conn: &mut PgConnection,
    space_id: SpaceId,
    range: &TimeRange,
) -> Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings \
         WHERE space_id = $1 AND status IN ('pending', 'confirmed') \
           AND start_time < $2 AND end_time > $3"
    );
    sqlx::query(&sql)
        .bind(space_id.as_uuid())
        .bind(range.end())
        .bind(range.start())
        .fetch_all(conn)
        .await
        .map_err(storage("Failed to load overlapping bookings"))?
        .iter()
        .map(rows::booking)
        .collect()
}

/// Persist every mutable column, conditional on the status that was read.
///
/// Returns `false` if the row was no longer in `expected`.
pub(crate) async fn write_booking(
    conn: &mut PgConnection,
    booking: &Booking,
    expected: BookingStatus,
) -> Result<bool> {
    let result = sqlx::query(
        r"
        UPDATE bookings
        SET start_time = $3, end_time = $4, status = $5, check_in_time = $6,
            check_out_time = $7, notes = $8, qr_code_data = $9, updated_at = $10
        WHERE id = $1 AND status = $2
        ",
    )
    .bind(booking.id.as_uuid())
    .bind(expected.as_str())
    .bind(booking.start_time)
    .bind(booking.end_time)
    .bind(booking.status.as_str())
    .bind(booking.check_in_time)
    .bind(booking.check_out_time)
    .bind(&booking.notes)
    .bind(&booking.qr_code_data)
    .bind(booking.updated_at)
    .execute(conn)
    .await
    .map_err(storage("Failed to update booking"))?;
    Ok(result.rows_affected() == 1)
}

impl BookingStore for PostgresReservationStore {
    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to get booking"))?
            .as_ref()
            .map(rows::booking)
            .transpose()
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE ($1::uuid IS NULL OR user_id = $1) \
               AND ($2::uuid IS NULL OR space_id = $2) \
               AND ($3::text IS NULL OR status = $3) \
             ORDER BY start_time, created_at"
        );
        sqlx::query(&sql)
            .bind(filter.user_id.map(|id| *id.as_uuid()))
            .bind(filter.space_id.map(|id| *id.as_uuid()))
            .bind(filter.status.map(BookingStatus::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list bookings"))?
            .iter()
            .map(rows::booking)
            .collect()
    }

    async fn admit(&self, booking: Booking) -> Result<Booking> {
        let range = TimeRange::new(booking.start_time, booking.end_time)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let space = lock_space(&mut *tx, booking.space_id).await?;
        let competing = competing_bookings(&mut *tx, booking.space_id, &range).await?;
        admission::check(
            space.as_ref(),
            &competing,
            &Candidate::create(booking.user_id, booking.space_id, range),
        )?;

        sqlx::query(
            r"
            INSERT INTO bookings
                (id, user_id, space_id, start_time, end_time, status, check_in_time,
                 check_out_time, notes, qr_code_data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.user_id.as_uuid())
        .bind(booking.space_id.as_uuid())
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.status.as_str())
        .bind(booking.check_in_time)
        .bind(booking.check_out_time)
        .bind(&booking.notes)
        .bind(&booking.qr_code_data)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                ReservationError::not_found("user", booking.user_id)
            } else {
                storage("Failed to insert booking")(e)
            }
        })?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit admission"))?;
        debug!(booking_id = %booking.id, competing = competing.len(), "Booking admitted");
        Ok(booking)
    }

    async fn reschedule(
        &self,
        id: BookingId,
        request: Reschedule,
        at: DateTime<Utc>,
    ) -> Result<Booking> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        let mut booking = lock_booking(&mut *tx, id)
            .await?
            .ok_or_else(|| ReservationError::not_found("booking", id))?;

        let range = booking.plan_reschedule(&request)?;
        if let Some(range) = range {
            let space = lock_space(&mut *tx, booking.space_id).await?;
            let competing = competing_bookings(&mut *tx, booking.space_id, &range).await?;
            admission::check(
                space.as_ref(),
                &competing,
                &Candidate::reschedule(&booking, range),
            )?;
        }

        let expected = booking.status;
        booking.apply_reschedule(request, range, at);
        if !write_booking(&mut *tx, &booking, expected).await? {
            return Err(ReservationError::InvalidTransition {
                from: expected,
                action: "reschedule",
            });
        }
        tx.commit()
            .await
            .map_err(storage("Failed to commit reschedule"))?;
        Ok(booking)
    }

    async fn transition(
        &self,
        id: BookingId,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> Result<Booking> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        let mut booking = lock_booking(&mut *tx, id)
            .await?
            .ok_or_else(|| ReservationError::not_found("booking", id))?;

        let from = booking.status;
        booking.apply(transition, at)?;
        if !write_booking(&mut *tx, &booking, from).await? {
            return Err(ReservationError::InvalidTransition {
                from,
                action: transition.action(),
            });
        }
        tx.commit()
            .await
            .map_err(storage("Failed to commit transition"))?;
        Ok(booking)
    }

    async fn delete_booking(&self, id: BookingId) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        let booking = lock_booking(&mut *tx, id)
            .await?
            .ok_or_else(|| ReservationError::not_found("booking", id))?;
        booking.ensure_editable("delete")?;

        sqlx::query("DELETE FROM bookings WHERE id = $1 AND status = $2")
            .bind(id.as_uuid())
            .bind(booking.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to delete booking"))?;
        tx.commit()
            .await
            .map_err(storage("Failed to commit booking deletion"))?;
        Ok(())
    }

    async fn overdue_bookings(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status IN ('pending', 'confirmed') AND start_time < $1 \
             ORDER BY start_time"
        );
        sqlx::query(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list overdue bookings"))?
            .iter()
            .map(rows::booking)
            .collect()
    }
}
