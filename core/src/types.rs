//! Identifiers and time ranges shared by every part of the reservation model.

use crate::error::{ReservationError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a booking
    BookingId
);
define_id!(
    /// Unique identifier for a bookable space
    SpaceId
);
define_id!(
    /// Unique identifier for a user (owned by the identity service)
    UserId
);
define_id!(
    /// Unique identifier for a penalty ledger entry
    PenaltyId
);
define_id!(
    /// Unique identifier for a space rating
    RatingId
);

// ============================================================================
// Time ranges
// ============================================================================

/// Half-open booking interval `[start, end)`.
///
/// Construction guarantees `start < end`, so every `TimeRange` in the system
/// is non-empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new range.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::InvalidRange`] when `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(ReservationError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Inclusive start instant.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end instant.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Two ranges overlap iff `s1 < e2 && s2 < e1`.
    ///
    /// A range ending exactly when another starts does not overlap it.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Length of the range.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Role of the acting principal, as resolved by the identity service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Administrator: manages spaces, users and penalties
    Admin,
    /// Student account
    Student,
    /// Tutor account
    Tutor,
}

impl Role {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Student => "student",
            Self::Tutor => "tutor",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "student" => Ok(Self::Student),
            "tutor" => Ok(Self::Tutor),
            other => Err(ReservationError::InvalidInput(format!("unknown role `{other}`"))),
        }
    }
}

/// A user as seen by the reservation core.
///
/// Users are created and deleted elsewhere; the core only reads them and
/// maintains the running `penalty_count`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// User ID
    pub id: UserId,
    /// Role resolved by the identity service
    pub role: Role,
    /// Whether the account is active (not banned)
    pub is_active: bool,
    /// Running penalty-point balance
    pub penalty_count: u32,
}

impl UserAccount {
    /// Creates an active account with a zero balance.
    #[must_use]
    pub const fn new(id: UserId, role: Role) -> Self {
        Self {
            id,
            role,
            is_active: true,
            penalty_count: 0,
        }
    }
}
