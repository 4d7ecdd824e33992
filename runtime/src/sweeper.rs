//! Recurring no-show sweep.
//!
//! Each run selects `pending`/`confirmed` bookings whose start plus the grace
//! period lies before now and settles them one at a time. Every booking is
//! its own atomic unit: a failure is recorded in the report and the run moves
//! on to the next booking.

use crate::config::SweeperConfig;
use crate::health::HealthCheck;
use crate::metrics::{PenaltyMetrics, SweepMetrics};
use crate::retry::retry_with_predicate;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use study_space_core::environment::Clock;
use study_space_core::penalty::{NoShowOutcome, Penalty, PenaltyPolicy};
use study_space_core::store::{BookingStore, PenaltyLedger};
use study_space_core::{BookingId, ReservationError, Result};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "no_show_sweeper";

/// Outcome of one sweep run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// `now` as seen by the run
    pub started_at: DateTime<Utc>,
    /// Bookings moved to `no_show` with a new penalty
    pub processed: usize,
    /// Overdue bookings that needed no new penalty
    pub skipped: usize,
    /// Bookings whose settlement failed; retried on the next run
    pub failed: Vec<BookingId>,
}

impl SweepReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            processed: 0,
            skipped: 0,
            failed: Vec::new(),
        }
    }

    /// `true` when no booking failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct SweepState {
    runs: u64,
    last_report: Option<SweepReport>,
    last_error: Option<String>,
}

/// Moves overdue bookings to `no_show` and penalizes them exactly once.
pub struct NoShowSweeper<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
    policy: PenaltyPolicy,
    state: Arc<RwLock<SweepState>>,
}

impl<S> Clone for NoShowSweeper<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            policy: self.policy.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<S> NoShowSweeper<S>
where
    S: BookingStore + PenaltyLedger + 'static,
{
    /// Create a sweeper. Clones share health state.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: SweeperConfig,
        policy: PenaltyPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            policy,
            state: Arc::new(RwLock::new(SweepState::default())),
        }
    }

    /// Run one sweep.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only if the overdue bookings could not be
    /// listed. Per-booking failures are reported in [`SweepReport::failed`].
    #[tracing::instrument(skip(self), name = "no_show_sweep")]
    pub async fn run_once(&self) -> Result<SweepReport> {
        let timer = Instant::now();
        let now = self.clock.now();
        // A negative grace would sweep bookings before they start.
        let grace = self.config.grace_period.max(ChronoDuration::zero());
        let cutoff = now.checked_sub_signed(grace).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let overdue = match self.store.overdue_bookings(cutoff).await {
            Ok(overdue) => overdue,
            Err(e) => {
                error!(error = %e, "Failed to list overdue bookings");
                SweepMetrics::record_error();
                let mut state = self.state.write().await;
                state.runs += 1;
                state.last_error = Some(e.to_string());
                return Err(e);
            },
        };

        let mut report = SweepReport::new(now);
        let store: &S = &self.store;
        for booking in overdue {
            let booking_id = booking.id;
            let penalty = Penalty::no_show(booking.user_id, booking_id, &self.policy, now);
            let outcome = retry_with_predicate(
                self.config.settle_retry.clone(),
                || store.settle_no_show(booking_id, penalty.clone(), now),
                |e: &ReservationError| !e.is_client_error(),
            )
            .await;

            match outcome {
                Ok(NoShowOutcome::Penalized(penalty)) => {
                    info!(
                        booking_id = %booking_id,
                        user_id = %penalty.user_id,
                        points = penalty.points,
                        "Booking marked as no-show"
                    );
                    PenaltyMetrics::record_issued(penalty.penalty_type.as_str(), penalty.points);
                    report.processed += 1;
                },
                Ok(NoShowOutcome::AlreadyPenalized) => {
                    debug!(booking_id = %booking_id, "No-show penalty already recorded");
                    report.skipped += 1;
                },
                Ok(NoShowOutcome::NoLongerEligible) => {
                    debug!(booking_id = %booking_id, "Booking left pending/confirmed before sweep");
                    report.skipped += 1;
                },
                Err(e) => {
                    warn!(booking_id = %booking_id, error = %e, "Failed to settle overdue booking");
                    report.failed.push(booking_id);
                },
            }
        }

        SweepMetrics::record_run(
            report.processed,
            report.skipped,
            report.failed.len(),
            timer.elapsed(),
        );
        if report.processed > 0 || !report.is_clean() {
            info!(
                processed = report.processed,
                skipped = report.skipped,
                failed = report.failed.len(),
                "No-show sweep finished"
            );
        }

        let mut state = self.state.write().await;
        state.runs += 1;
        state.last_error = None;
        state.last_report = Some(report.clone());
        Ok(report)
    }

    /// Health derived from the most recent run.
    ///
    /// Unhealthy if the last run could not list bookings, degraded if some
    /// bookings failed, healthy otherwise (including before the first run).
    pub async fn health(&self) -> HealthCheck {
        let state = self.state.read().await;
        let check = if let Some(error) = &state.last_error {
            HealthCheck::unhealthy(COMPONENT, error.clone())
        } else if let Some(report) = state.last_report.as_ref().filter(|r| !r.is_clean()) {
            HealthCheck::degraded(
                COMPONENT,
                format!("{} booking(s) failed in the last sweep", report.failed.len()),
            )
        } else {
            HealthCheck::healthy(COMPONENT)
        };
        let check = check.with_metadata("runs", state.runs);
        match &state.last_report {
            Some(report) => check.with_metadata("last_run", report.started_at.to_rfc3339()),
            None => check,
        }
    }

    /// Run the sweep every `interval` until `shutdown` fires.
    ///
    /// The first run starts immediately. Missed ticks are skipped, so a slow
    /// run never causes a burst of catch-up runs.
    #[must_use]
    pub fn spawn(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweeper.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval = ?sweeper.config.interval, "No-show sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("No-show sweeper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        // Run-level failures are already logged and reflected in health.
                        let _ = sweeper.run_once().await;
                    }
                }
            }

            info!("No-show sweeper stopped");
        })
    }
}
