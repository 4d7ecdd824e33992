//! Health reporting for long-running components.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Health check status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is running but its last unit of work partially failed
    Degraded,

    /// Component cannot do its work
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health of a single component
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Component name (e.g. `no_show_sweeper`)
    pub component: &'static str,

    /// Current status
    pub status: HealthStatus,

    /// What is wrong, when something is
    pub message: Option<String>,

    /// Extra key/value details (last run time, counters)
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub const fn healthy(component: &'static str) -> Self {
        Self {
            component,
            status: HealthStatus::Healthy,
            message: None,
            metadata: Vec::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            component,
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            component,
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.push((key.into(), value.to_string()));
        self
    }
}

/// Combined health of the process
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Worst status among the checks
    pub status: HealthStatus,

    /// Individual component checks
    pub checks: Vec<HealthCheck>,

    /// When the report was assembled
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// Combine checks taken at `timestamp`.
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>, timestamp: DateTime<Utc>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);
        Self {
            status,
            checks,
            timestamp,
        }
    }
}
