//! Injected configuration for the service and the sweeper.
//!
//! Loaded once at startup (see the server's `Config::from_env`) and passed
//! down; nothing in the runtime reads the environment itself.

use crate::retry::RetryPolicy;
use chrono::Duration as ChronoDuration;
use std::time::Duration;
use study_space_core::PenaltyPolicy;

/// No-show sweeper settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SweeperConfig {
    /// Time between runs
    pub interval: Duration,
    /// How long after `start_time` check-in is still accepted
    pub grace_period: ChronoDuration,
    /// Retries for one booking's settlement on storage errors
    pub settle_retry: RetryPolicy,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            grace_period: ChronoDuration::minutes(15),
            settle_retry: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(50))
                .build(),
        }
    }
}

/// Everything the reservation service is configured with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationConfig {
    /// Penalty defaults
    pub penalty: PenaltyPolicy,
    /// Sweeper settings
    pub sweeper: SweeperConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ReservationConfig::default();
        assert_eq!(config.sweeper.interval, Duration::from_secs(60));
        assert_eq!(config.sweeper.grace_period, ChronoDuration::minutes(15));
        assert_eq!(config.penalty.default_points, 1);
        assert_eq!(config.penalty.expiry, ChronoDuration::days(30));
    }
}
