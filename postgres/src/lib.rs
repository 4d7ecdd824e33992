//! `PostgreSQL` store for study-space reservations.
//!
//! [`PostgresReservationStore`] implements every store trait from
//! `study-space-core` on top of a sqlx connection pool. Each trait method
//! runs in a single transaction:
//!
//! - admission and reschedule lock the space row (`SELECT ... FOR UPDATE`)
//!   before reading overlapping bookings, so admissions on one space are
//!   serialized
//! - status changes lock the booking row and update conditionally on the
//!   status that was read
//! - penalty writes and the user's `penalty_count` commit together; a partial
//!   unique index keeps at most one `no_show` penalty per booking
//!
//! # Example
//!
//! ```no_run
//! use study_space_postgres::PostgresReservationStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresReservationStore::connect("postgres://localhost/study_space").await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bookings;
mod penalties;
mod ratings;
mod rows;
mod spaces;

use sqlx::PgPool;
use study_space_core::error::{ReservationError, Result};
use study_space_core::types::UserAccount;

/// sqlx-backed implementation of the reservation store traits.
#[derive(Clone, Debug)]
pub struct PostgresReservationStore {
    pool: PgPool,
}

impl PostgresReservationStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// `StorageError` if the database is unreachable.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(rows::storage("Failed to connect to database"))?;
        Ok(Self::from_pool(pool))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the bundled migrations.
    ///
    /// # Errors
    ///
    /// `StorageError` if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ReservationError::StorageError(format!("Migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Mirror a user account from the identity service.
    ///
    /// Role and active flag are overwritten; the penalty balance of an
    /// existing row is left untouched.
    ///
    /// # Errors
    ///
    /// `StorageError` if the upsert fails.
    pub async fn register_user(&self, user: &UserAccount) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO users (id, role, is_active, penalty_count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET role = EXCLUDED.role, is_active = EXCLUDED.is_active
            ",
        )
        .bind(user.id.as_uuid())
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(rows::to_i32(user.penalty_count, "penalty_count")?)
        .execute(&self.pool)
        .await
        .map_err(rows::storage("Failed to register user"))?;
        Ok(())
    }
}
