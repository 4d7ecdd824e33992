//! Study-space reservation server.
//!
//! Connects to `PostgreSQL`, applies migrations, starts the Prometheus
//! exporter and runs the no-show sweeper until Ctrl+C or SIGTERM.

mod config;

use anyhow::Context;
use config::Config;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use study_space_core::environment::SystemClock;
use study_space_postgres::PostgresReservationStore;
use study_space_runtime::metrics::MetricsServer;
use study_space_runtime::retry::retry_with_backoff;
use study_space_runtime::{ReservationService, RetryPolicy};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("study_space={}", config.server.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting study-space reservation server");
    info!(
        grace_minutes = config.reservations.grace_minutes,
        sweep_interval_secs = config.reservations.sweep_interval_secs,
        max_connections = config.postgres.max_connections,
        "Configuration loaded"
    );

    // Metrics exporter
    let metrics_addr = config
        .metrics_addr()
        .context("Invalid METRICS_HOST/METRICS_PORT")?;
    let mut metrics_server = MetricsServer::new(metrics_addr);
    metrics_server.start()?;

    // Database, retried while the database comes up
    info!("Connecting to database...");
    let connect_policy = RetryPolicy::builder()
        .max_retries(5)
        .initial_delay(Duration::from_millis(500))
        .max_delay(Duration::from_secs(10))
        .build();
    let pool = retry_with_backoff(connect_policy, || {
        PgPoolOptions::new()
            .max_connections(config.postgres.max_connections)
            .min_connections(config.postgres.min_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.postgres.url)
    })
    .await
    .context("Failed to connect to database")?;
    info!("Database connected");

    let store = PostgresReservationStore::from_pool(pool);
    store.migrate().await?;

    let service = ReservationService::new(
        Arc::new(store),
        Arc::new(SystemClock),
        config.reservation_config(),
    );

    // Background tasks
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sweeper = service.sweeper().spawn(shutdown_rx);
    info!("No-show sweeper started");

    shutdown_signal().await;

    info!("Initiating graceful shutdown...");
    let _ = shutdown_tx.send(());
    match tokio::time::timeout(config.shutdown_timeout(), sweeper).await {
        Ok(Ok(())) => info!("Sweeper stopped gracefully"),
        Ok(Err(e)) => warn!(error = %e, "Sweeper task failed"),
        Err(_) => warn!("Sweeper shutdown timed out"),
    }

    let health = service.health().await;
    info!(status = ?health.status, "Graceful shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
