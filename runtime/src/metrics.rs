//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for:
//! - Booking admission (admitted / rejected by kind)
//! - Lifecycle transitions
//! - Penalty issuance and revocation
//! - No-show sweep runs
//!
//! # Example
//!
//! ```rust,no_run
//! use study_space_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and serves `/metrics` on `addr`.
pub struct MetricsServer {
    addr: SocketAddr,
    started: bool,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            started: false,
        }
    }

    /// Address the exporter listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether this instance installed the recorder.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Register metric descriptions, install the recorder and start the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests) this logs a
    /// warning and succeeds without serving.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install() {
            Ok(()) => {
                self.started = true;
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Admission
    describe_counter!(
        "bookings_admitted_total",
        "Bookings created or rescheduled after passing admission"
    );
    describe_counter!(
        "bookings_rejected_total",
        "Booking requests rejected, labelled by error kind"
    );

    // Lifecycle
    describe_counter!(
        "booking_transitions_total",
        "Booking status transitions, labelled by target status"
    );
    describe_counter!(
        "bookings_deleted_total",
        "Pending or confirmed bookings deleted"
    );

    // Penalties
    describe_counter!(
        "penalties_issued_total",
        "Penalties recorded, labelled by type"
    );
    describe_counter!(
        "penalty_points_issued_total",
        "Penalty points credited to user balances"
    );
    describe_counter!("penalties_revoked_total", "Penalties deleted");

    // No-show sweeper
    describe_counter!("no_show_sweeps_total", "Completed no-show sweep runs");
    describe_counter!(
        "no_show_sweep_errors_total",
        "Sweep runs aborted before processing any booking"
    );
    describe_counter!(
        "no_show_bookings_processed_total",
        "Bookings moved to no_show with a new penalty"
    );
    describe_counter!(
        "no_show_bookings_skipped_total",
        "Overdue bookings settled without a new penalty or no longer eligible"
    );
    describe_counter!(
        "no_show_bookings_failed_total",
        "Overdue bookings whose settlement failed"
    );
    describe_gauge!(
        "no_show_last_sweep_failed",
        "Bookings that failed in the most recent sweep"
    );
    describe_histogram!(
        "no_show_sweep_duration_seconds",
        "Time taken by one sweep run"
    );
}

/// Admission metrics recorder.
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    /// Record an admitted booking.
    pub fn record_admitted(operation: &'static str) {
        counter!("bookings_admitted_total", "operation" => operation).increment(1);
    }

    /// Record a rejected request.
    pub fn record_rejected(operation: &'static str, kind: &'static str) {
        counter!("bookings_rejected_total", "operation" => operation, "kind" => kind).increment(1);
    }
}

/// Lifecycle metrics recorder.
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    /// Record a status change.
    pub fn record_transition(to: &'static str) {
        counter!("booking_transitions_total", "to" => to).increment(1);
    }

    /// Record a deleted booking.
    pub fn record_deleted() {
        counter!("bookings_deleted_total").increment(1);
    }
}

/// Penalty ledger metrics recorder.
pub struct PenaltyMetrics;

impl PenaltyMetrics {
    /// Record a new penalty.
    pub fn record_issued(penalty_type: &'static str, points: u32) {
        counter!("penalties_issued_total", "type" => penalty_type).increment(1);
        counter!("penalty_points_issued_total").increment(u64::from(points));
    }

    /// Record a deleted penalty.
    pub fn record_revoked() {
        counter!("penalties_revoked_total").increment(1);
    }
}

/// No-show sweep metrics recorder.
pub struct SweepMetrics;

impl SweepMetrics {
    /// Record a completed run.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_run(processed: usize, skipped: usize, failed: usize, duration: Duration) {
        counter!("no_show_sweeps_total").increment(1);
        counter!("no_show_bookings_processed_total").increment(processed as u64);
        counter!("no_show_bookings_skipped_total").increment(skipped as u64);
        counter!("no_show_bookings_failed_total").increment(failed as u64);
        gauge!("no_show_last_sweep_failed").set(failed as f64);
        histogram!("no_show_sweep_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a run that could not list overdue bookings.
    pub fn record_error() {
        counter!("no_show_sweep_errors_total").increment(1);
    }
}
