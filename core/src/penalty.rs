//! Penalty ledger entries and the balance arithmetic applied to users.

use crate::error::{ReservationError, Result};
use crate::types::{BookingId, PenaltyId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason category of a penalty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyType {
    /// Did not check in within the grace period
    NoShow,
    /// Overstayed the booking
    LateCheckout,
    /// Damaged the space or its equipment
    Damage,
    /// Used a space without a booking
    UnauthorizedUse,
}

impl PenaltyType {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoShow => "no_show",
            Self::LateCheckout => "late_checkout",
            Self::Damage => "damage",
            Self::UnauthorizedUse => "unauthorized_use",
        }
    }
}

impl fmt::Display for PenaltyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PenaltyType {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no_show" => Ok(Self::NoShow),
            "late_checkout" => Ok(Self::LateCheckout),
            "damage" => Ok(Self::Damage),
            "unauthorized_use" => Ok(Self::UnauthorizedUse),
            other => Err(ReservationError::InvalidInput(format!(
                "unknown penalty type `{other}`"
            ))),
        }
    }
}

/// Defaults applied when issuing penalties.
///
/// Loaded once at startup and injected into the service and the sweeper.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyPolicy {
    /// Points charged when the request does not specify any
    pub default_points: u32,
    /// Lifetime of a penalty when no expiry is given
    pub expiry: Duration,
    /// Reason recorded on sweeper-issued no-show penalties
    pub no_show_reason: String,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            default_points: 1,
            expiry: Duration::days(30),
            no_show_reason: "did not check in within grace period".to_string(),
        }
    }
}

/// A ledger entry debiting a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Penalty {
    /// Penalty ID
    pub id: PenaltyId,
    /// Penalized user (immutable)
    pub user_id: UserId,
    /// Booking the penalty refers to (immutable)
    pub booking_id: Option<BookingId>,
    /// Category (immutable)
    pub penalty_type: PenaltyType,
    /// Points added to the user's balance
    pub points: u32,
    /// Free-text reason
    pub reason: Option<String>,
    /// When the penalty stops counting
    pub expires_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Penalty {
    /// Materializes a request, filling in policy defaults.
    #[must_use]
    pub fn issue(request: NewPenalty, policy: &PenaltyPolicy, now: DateTime<Utc>) -> Self {
        Self {
            id: PenaltyId::new(),
            user_id: request.user_id,
            booking_id: request.booking_id,
            penalty_type: request.penalty_type,
            points: request.points.unwrap_or(policy.default_points),
            reason: request.reason,
            expires_at: request.expires_at.unwrap_or_else(|| {
                now.checked_add_signed(policy.expiry)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }),
            created_at: now,
        }
    }

    /// The no-show penalty the sweeper issues for an overdue booking.
    #[must_use]
    pub fn no_show(
        user_id: UserId,
        booking_id: BookingId,
        policy: &PenaltyPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self::issue(
            NewPenalty {
                user_id,
                booking_id: Some(booking_id),
                penalty_type: PenaltyType::NoShow,
                points: None,
                reason: Some(policy.no_show_reason.clone()),
                expires_at: None,
            },
            policy,
            now,
        )
    }

    /// Whether this entry blocks another no-show penalty for `booking_id`.
    #[must_use]
    pub fn is_no_show_for(&self, booking_id: BookingId) -> bool {
        self.penalty_type == PenaltyType::NoShow && self.booking_id == Some(booking_id)
    }

    /// Applies an amendment and returns the signed change in points.
    pub fn amend(&mut self, amendment: PenaltyAmendment) -> i64 {
        let delta = amendment
            .points
            .map_or(0, |points| i64::from(points) - i64::from(self.points));
        if let Some(points) = amendment.points {
            self.points = points;
        }
        if let Some(reason) = amendment.reason {
            self.reason = Some(reason);
        }
        if let Some(expires_at) = amendment.expires_at {
            self.expires_at = expires_at;
        }
        delta
    }
}

/// Admin request to issue a penalty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPenalty {
    /// Penalized user
    pub user_id: UserId,
    /// Optional booking reference
    pub booking_id: Option<BookingId>,
    /// Category
    pub penalty_type: PenaltyType,
    /// Points (policy default if `None`)
    pub points: Option<u32>,
    /// Reason
    pub reason: Option<String>,
    /// Expiry (now + policy expiry if `None`)
    pub expires_at: Option<DateTime<Utc>>,
}

/// Generic penalty update as it arrives from the API layer.
///
/// Reference fields are present so attempts to change them can be rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyUpdate {
    /// New point value
    pub points: Option<u32>,
    /// New reason
    pub reason: Option<String>,
    /// New expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Always rejected
    pub user_id: Option<UserId>,
    /// Always rejected
    pub booking_id: Option<BookingId>,
    /// Always rejected
    pub penalty_type: Option<PenaltyType>,
}

impl PenaltyUpdate {
    /// Strips the update down to the mutable fields.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::FieldImmutable`] if a reference field is set.
    pub fn into_amendment(self) -> Result<PenaltyAmendment> {
        if self.user_id.is_some() {
            return Err(ReservationError::FieldImmutable { field: "user_id" });
        }
        if self.booking_id.is_some() {
            return Err(ReservationError::FieldImmutable { field: "booking_id" });
        }
        if self.penalty_type.is_some() {
            return Err(ReservationError::FieldImmutable {
                field: "penalty_type",
            });
        }
        Ok(PenaltyAmendment {
            points: self.points,
            reason: self.reason,
            expires_at: self.expires_at,
        })
    }
}

/// Validated change to a penalty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyAmendment {
    /// New point value
    pub points: Option<u32>,
    /// New reason
    pub reason: Option<String>,
    /// New expiry
    pub expires_at: Option<DateTime<Utc>>,
}

/// Filters for listing penalties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyFilter {
    /// Only this user's penalties
    pub user_id: Option<UserId>,
    /// Only penalties referencing this booking
    pub booking_id: Option<BookingId>,
    /// Only this category
    pub penalty_type: Option<PenaltyType>,
    /// Rows to skip
    pub offset: usize,
    /// Maximum rows to return
    pub limit: usize,
}

impl Default for PenaltyFilter {
    fn default() -> Self {
        Self {
            user_id: None,
            booking_id: None,
            penalty_type: None,
            offset: 0,
            limit: 100,
        }
    }
}

impl PenaltyFilter {
    /// Whether `penalty` passes the field filters (paging is applied separately).
    #[must_use]
    pub fn matches(&self, penalty: &Penalty) -> bool {
        self.user_id.is_none_or(|id| penalty.user_id == id)
            && self.booking_id.is_none_or(|id| penalty.booking_id == Some(id))
            && self.penalty_type.is_none_or(|t| penalty.penalty_type == t)
    }
}

/// Adds a signed delta to a balance, flooring at zero and saturating at `u32::MAX`.
#[must_use]
pub fn adjust_balance(balance: u32, delta: i64) -> u32 {
    let next = i64::from(balance).saturating_add(delta).max(0);
    u32::try_from(next).unwrap_or(u32::MAX)
}

/// Result of settling one overdue booking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoShowOutcome {
    /// Booking moved to `no_show` and the penalty was recorded.
    Penalized(Penalty),
    /// A no-show penalty already referenced the booking; nothing was written.
    AlreadyPenalized,
    /// Booking left `pending`/`confirmed` before the sweep reached it.
    NoLongerEligible,
}
