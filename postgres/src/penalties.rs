//! Penalty ledger: penalties and the users' running balance, always written
//! in the same transaction.

use crate::PostgresReservationStore;
use crate::bookings::{lock_booking, write_booking};
use crate::rows::{
    self, PENALTY_COLUMNS, is_unique_violation, storage, to_i32, violated_foreign_key,
};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use study_space_core::booking::Transition;
use study_space_core::error::{ReservationError, Result};
use study_space_core::penalty::{NoShowOutcome, Penalty, PenaltyAmendment, PenaltyFilter};
use study_space_core::store::PenaltyLedger;
use study_space_core::types::{BookingId, PenaltyId, UserAccount, UserId};
use tracing::debug;

/// Add `delta` to the user's balance, floored at zero.
async fn credit(conn: &mut PgConnection, user_id: UserId, delta: i64) -> Result<()> {
    let result = sqlx::query(
        r"
        UPDATE users
        SET penalty_count = LEAST(GREATEST(penalty_count::BIGINT + $2, 0), 2147483647)::INTEGER
        WHERE id = $1
        ",
    )
    .bind(user_id.as_uuid())
    .bind(delta)
    .execute(conn)
    .await
    .map_err(storage("Failed to update penalty balance"))?;
    if result.rows_affected() == 0 {
        return Err(ReservationError::not_found("user", user_id));
    }
    Ok(())
}

async fn insert_penalty(conn: &mut PgConnection, penalty: &Penalty) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO penalties
            (id, user_id, booking_id, penalty_type, points, reason, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(penalty.id.as_uuid())
    .bind(penalty.user_id.as_uuid())
    .bind(penalty.booking_id.map(|id| *id.as_uuid()))
    .bind(penalty.penalty_type.as_str())
    .bind(to_i32(penalty.points, "points")?)
    .bind(&penalty.reason)
    .bind(penalty.expires_at)
    .bind(penalty.created_at)
    .execute(conn)
    .await
    .map_err(|e| {
        if let Some(constraint) = violated_foreign_key(&e) {
            return missing_reference(constraint, penalty);
        }
        match penalty.booking_id {
            Some(booking_id) if is_unique_violation(&e) => {
                ReservationError::DuplicatePenalty { booking_id }
            },
            _ => storage("Failed to insert penalty")(e),
        }
    })?;
    Ok(())
}

/// Which reference a foreign key violation on `penalties` points at.
fn missing_reference(constraint: &str, penalty: &Penalty) -> ReservationError {
    match penalty.booking_id {
        Some(booking_id) if constraint == BOOKING_FOREIGN_KEY => {
            ReservationError::not_found("booking", booking_id)
        },
        _ => ReservationError::not_found("user", penalty.user_id),
    }
}

const BOOKING_FOREIGN_KEY: &str = "penalties_booking_id_fkey";

async fn has_no_show_penalty(conn: &mut PgConnection, booking_id: BookingId) -> Result<bool> {
    let row = sqlx::query(
        r"
        SELECT EXISTS(
            SELECT 1 FROM penalties WHERE booking_id = $1 AND penalty_type = 'no_show'
        ) AS penalized
        ",
    )
    .bind(booking_id.as_uuid())
    .fetch_one(conn)
    .await
    .map_err(storage("Failed to check existing penalties"))?;
    row.try_get("penalized")
        .map_err(|e| ReservationError::StorageError(format!("Failed to decode `penalized`: {e}")))
}

async fn lock_user(conn: &mut PgConnection, user_id: UserId) -> Result<bool> {
    let row = sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(storage("Failed to lock user"))?;
    Ok(row.is_some())
}

impl PenaltyLedger for PostgresReservationStore {
    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>> {
        sqlx::query("SELECT id, role, is_active, penalty_count FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to get user"))?
            .as_ref()
            .map(rows::user)
            .transpose()
    }

    async fn get_penalty(&self, id: PenaltyId) -> Result<Option<Penalty>> {
        let sql = format!("SELECT {PENALTY_COLUMNS} FROM penalties WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to get penalty"))?
            .as_ref()
            .map(rows::penalty)
            .transpose()
    }

    async fn list_penalties(&self, filter: &PenaltyFilter) -> Result<Vec<Penalty>> {
        let sql = format!(
            "SELECT {PENALTY_COLUMNS} FROM penalties \
             WHERE ($1::uuid IS NULL OR user_id = $1) \
               AND ($2::uuid IS NULL OR booking_id = $2) \
               AND ($3::text IS NULL OR penalty_type = $3) \
             ORDER BY created_at DESC, id \
             OFFSET $4 LIMIT $5"
        );
        #[allow(clippy::cast_possible_wrap)] // Paging values are small
        let (offset, limit) = (filter.offset as i64, filter.limit as i64);
        sqlx::query(&sql)
            .bind(filter.user_id.map(|id| *id.as_uuid()))
            .bind(filter.booking_id.map(|id| *id.as_uuid()))
            .bind(filter.penalty_type.map(|t| t.as_str()))
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list penalties"))?
            .iter()
            .map(rows::penalty)
            .collect()
    }

    async fn record_penalty(&self, penalty: Penalty) -> Result<Penalty> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        // Booking before user, the same order the sweeper locks them in.
        if let Some(booking_id) = penalty.booking_id {
            if lock_booking(&mut *tx, booking_id).await?.is_none() {
                return Err(ReservationError::not_found("booking", booking_id));
            }
        }
        if !lock_user(&mut *tx, penalty.user_id).await? {
            return Err(ReservationError::not_found("user", penalty.user_id));
        }
        insert_penalty(&mut *tx, &penalty).await?;
        credit(&mut *tx, penalty.user_id, i64::from(penalty.points)).await?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit penalty"))?;
        Ok(penalty)
    }

    async fn amend_penalty(&self, id: PenaltyId, amendment: PenaltyAmendment) -> Result<Penalty> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        let sql = format!("SELECT {PENALTY_COLUMNS} FROM penalties WHERE id = $1 FOR UPDATE");
        let mut penalty = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage("Failed to lock penalty"))?
            .as_ref()
            .map(rows::penalty)
            .transpose()?
            .ok_or_else(|| ReservationError::not_found("penalty", id))?;

        let delta = penalty.amend(amendment);
        sqlx::query("UPDATE penalties SET points = $2, reason = $3, expires_at = $4 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(to_i32(penalty.points, "points")?)
            .bind(&penalty.reason)
            .bind(penalty.expires_at)
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to update penalty"))?;
        if delta != 0 {
            credit(&mut *tx, penalty.user_id, delta).await?;
        }

        tx.commit()
            .await
            .map_err(storage("Failed to commit penalty update"))?;
        Ok(penalty)
    }

    async fn revoke_penalty(&self, id: PenaltyId) -> Result<Penalty> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        let sql = format!("DELETE FROM penalties WHERE id = $1 RETURNING {PENALTY_COLUMNS}");
        let penalty = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage("Failed to delete penalty"))?
            .as_ref()
            .map(rows::penalty)
            .transpose()?
            .ok_or_else(|| ReservationError::not_found("penalty", id))?;
        credit(&mut *tx, penalty.user_id, -i64::from(penalty.points)).await?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit penalty deletion"))?;
        Ok(penalty)
    }

    async fn settle_no_show(
        &self,
        booking_id: BookingId,
        penalty: Penalty,
        at: DateTime<Utc>,
    ) -> Result<NoShowOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        let mut booking = lock_booking(&mut *tx, booking_id)
            .await?
            .ok_or_else(|| ReservationError::not_found("booking", booking_id))?;
        if !booking.status.is_active() {
            debug!(booking_id = %booking_id, status = %booking.status, "Booking no longer eligible");
            return Ok(NoShowOutcome::NoLongerEligible);
        }

        if has_no_show_penalty(&mut *tx, booking_id).await? {
            debug!(booking_id = %booking_id, "Booking already carries a no-show penalty");
            return Ok(NoShowOutcome::AlreadyPenalized);
        }

        let from = booking.status;
        booking.apply(Transition::MarkNoShow, at)?;
        if !write_booking(&mut *tx, &booking, from).await? {
            return Ok(NoShowOutcome::NoLongerEligible);
        }
        insert_penalty(&mut *tx, &penalty).await?;
        credit(&mut *tx, penalty.user_id, i64::from(penalty.points)).await?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit no-show settlement"))?;
        Ok(NoShowOutcome::Penalized(penalty))
    }
}
