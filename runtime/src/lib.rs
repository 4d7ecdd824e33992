//! # Study Space Runtime
//!
//! Runtime for the study-space reservation engine.
//!
//! This crate wires the pure rules of `study-space-core` to a store and a
//! clock, and runs the background work.
//!
//! ## Core Components
//!
//! - **`ReservationService`**: every booking, space, penalty and rating operation
//! - **`NoShowSweeper`**: recurring task that settles overdue bookings
//! - **Health**: component checks aggregated into a report
//! - **Metrics**: Prometheus counters and histograms
//!
//! ## Example
//!
//! ```ignore
//! use study_space_runtime::{ReservationConfig, ReservationService};
//! use study_space_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! let service = ReservationService::new(store, Arc::new(SystemClock), ReservationConfig::default());
//!
//! let booking = service.create_booking(request).await?;
//! service.check_in(booking.id).await?;
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//! let sweeper = service.sweeper().spawn(shutdown_rx);
//! ```

/// Injected service and sweeper configuration
pub mod config;

/// Health checks and reports
pub mod health;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry with exponential backoff for transient failures
pub mod retry;

/// Reservation operations
pub mod service;

/// Recurring no-show sweep
pub mod sweeper;

pub use config::{ReservationConfig, SweeperConfig};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use retry::RetryPolicy;
pub use service::ReservationService;
pub use sweeper::{NoShowSweeper, SweepReport};
