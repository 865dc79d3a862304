//! apiwatch -- threshold-based anomaly detection for monitored HTTP APIs.
//!
//! Samples of each API's error rate and response time are checked against a
//! [`detect::ThresholdPolicy`]; every violation is stored once as a
//! severity-classified anomaly and sent to the configured notifiers. Detection
//! runs on a fixed-delay schedule and on demand over HTTP.

pub mod api;
pub mod config;
pub mod detect;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::detect::AnomalyDetector;
use crate::storage::{Pool, SqliteAnomalyStore, SqliteMetricSource};

/// Wire the detector to the SQLite source and store and the configured notifiers.
pub fn build_detector(config: &AppConfig, pool: Pool) -> Result<AnomalyDetector> {
    let notifier = notify::from_config(&config.notify).context("failed to build notifiers")?;
    Ok(AnomalyDetector::new(
        Arc::new(SqliteMetricSource::new(pool.clone())),
        Arc::new(SqliteAnomalyStore::new(pool)),
        notifier,
        config
            .thresholds
            .policy()
            .context("invalid [thresholds] section")?,
    ))
}

/// Start the apiwatch daemon: API server and scheduled detection.
pub async fn serve(config: AppConfig) -> Result<()> {
    // 1. Initialize Storage
    tracing::info!(db_path = %config.storage.db_path.display(), "Initializing database");
    let pool = storage::open_pool(&config.storage.db_path)?;

    // 2. Build the detector shared by both triggers
    let detector = build_detector(&config, pool.clone())?;

    // 3. Bind the API listener
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    // 4. Start the scheduled trigger (background task)
    let shutdown = CancellationToken::new();
    let scheduler_task = if config.schedule.enabled {
        Some(tokio::spawn(scheduler::run_detection_loop(
            detector.clone(),
            config.schedule.detection_schedule(),
            shutdown.clone(),
        )))
    } else {
        tracing::info!("Scheduled detection disabled");
        None
    };

    // 5. Start API Server
    let state = api::state::AppState::new(pool, detector, config.schedule.manual_window());
    let app = api::router(state);

    tracing::info!(%addr, "apiwatch listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // 6. Let an in-flight scheduled run finish its window, even if the server failed
    shutdown.cancel();
    if let Some(task) = scheduler_task {
        task.await.context("scheduler task panicked")?;
    }
    served.context("API server failed")?;
    tracing::info!("apiwatch stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serve_fails_when_address_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

        let mut config = AppConfig::default();
        config.storage.db_path = dir.path().join("apiwatch.db");
        config.server.bind = taken.local_addr().unwrap().to_string();
        config.notify.log = false;

        let err = serve(config).await.unwrap_err();
        assert!(format!("{:#}", err).contains("failed to bind"), "{:#}", err);
    }

    #[test]
    fn test_build_detector_rejects_invalid_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let pool = storage::open_pool(dir.path().join("apiwatch.db")).unwrap();
        let mut config = AppConfig::default();
        config.thresholds.error_rate = 3.0;

        assert!(build_detector(&config, pool).is_err());
    }
}
