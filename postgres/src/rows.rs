//! Row decoding and driver error mapping.

use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use std::str::FromStr;
use study_space_core::booking::Booking;
use study_space_core::error::{ReservationError, Result};
use study_space_core::penalty::Penalty;
use study_space_core::rating::Rating;
use study_space_core::space::Space;
use study_space_core::types::{BookingId, PenaltyId, RatingId, SpaceId, UserAccount, UserId};

pub(crate) const BOOKING_COLUMNS: &str = "id, user_id, space_id, start_time, end_time, status, \
     check_in_time, check_out_time, notes, qr_code_data, created_at, updated_at";

pub(crate) const SPACE_COLUMNS: &str = "id, name, capacity, status, is_active, location, \
     description, average_rating, total_ratings, created_at";

pub(crate) const PENALTY_COLUMNS: &str =
    "id, user_id, booking_id, penalty_type, points, reason, expires_at, created_at";

pub(crate) const RATING_COLUMNS: &str = "id, user_id, space_id, score, comment, created_at";

/// Maps a driver error to `StorageError`, counting it by operation.
pub(crate) fn storage(context: &'static str) -> impl Fn(sqlx::Error) -> ReservationError {
    move |e| {
        tracing::error!(error = %e, "{context}");
        metrics::counter!("study_space.store.errors", "operation" => context).increment(1);
        ReservationError::StorageError(format!("{context}: {e}"))
    }
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Name of the violated foreign key constraint, if `error` is one.
pub(crate) fn violated_foreign_key(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            Some(db.constraint().unwrap_or_default())
        },
        _ => None,
    }
}

/// Counters are `INTEGER` columns.
pub(crate) fn to_i32(value: u32, field: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| ReservationError::InvalidInput(format!("{field} {value} is out of range")))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| ReservationError::StorageError(format!("Failed to decode `{name}`: {e}")))
}

fn unsigned(row: &PgRow, name: &str) -> Result<u32> {
    let value: i32 = column(row, name)?;
    u32::try_from(value)
        .map_err(|_| ReservationError::StorageError(format!("Negative `{name}`: {value}")))
}

fn parsed<T>(row: &PgRow, name: &str) -> Result<T>
where
    T: FromStr<Err = ReservationError>,
{
    let value: String = column(row, name)?;
    value
        .parse()
        .map_err(|e| ReservationError::StorageError(format!("Invalid `{name}`: {e}")))
}

pub(crate) fn booking(row: &PgRow) -> Result<Booking> {
    Ok(Booking {
        id: BookingId::from_uuid(column(row, "id")?),
        user_id: UserId::from_uuid(column(row, "user_id")?),
        space_id: SpaceId::from_uuid(column(row, "space_id")?),
        start_time: column(row, "start_time")?,
        end_time: column(row, "end_time")?,
        status: parsed(row, "status")?,
        check_in_time: column(row, "check_in_time")?,
        check_out_time: column(row, "check_out_time")?,
        notes: column(row, "notes")?,
        qr_code_data: column(row, "qr_code_data")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn space(row: &PgRow) -> Result<Space> {
    Ok(Space {
        id: SpaceId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        capacity: unsigned(row, "capacity")?,
        status: parsed(row, "status")?,
        is_active: column(row, "is_active")?,
        location: column(row, "location")?,
        description: column(row, "description")?,
        average_rating: column(row, "average_rating")?,
        total_ratings: unsigned(row, "total_ratings")?,
        created_at: column(row, "created_at")?,
    })
}

pub(crate) fn penalty(row: &PgRow) -> Result<Penalty> {
    let booking_id: Option<uuid::Uuid> = column(row, "booking_id")?;
    Ok(Penalty {
        id: PenaltyId::from_uuid(column(row, "id")?),
        user_id: UserId::from_uuid(column(row, "user_id")?),
        booking_id: booking_id.map(BookingId::from_uuid),
        penalty_type: parsed(row, "penalty_type")?,
        points: unsigned(row, "points")?,
        reason: column(row, "reason")?,
        expires_at: column(row, "expires_at")?,
        created_at: column(row, "created_at")?,
    })
}

pub(crate) fn rating(row: &PgRow) -> Result<Rating> {
    let score: i16 = column(row, "score")?;
    Ok(Rating {
        id: RatingId::from_uuid(column(row, "id")?),
        user_id: UserId::from_uuid(column(row, "user_id")?),
        space_id: SpaceId::from_uuid(column(row, "space_id")?),
        score: u8::try_from(score)
            .map_err(|_| ReservationError::StorageError(format!("Invalid `score`: {score}")))?,
        comment: column(row, "comment")?,
        created_at: column(row, "created_at")?,
    })
}

pub(crate) fn user(row: &PgRow) -> Result<UserAccount> {
    Ok(UserAccount {
        id: UserId::from_uuid(column(row, "id")?),
        role: parsed(row, "role")?,
        is_active: column(row, "is_active")?,
        penalty_count: unsigned(row, "penalty_count")?,
    })
}
