//! Best-effort notification sinks for newly recorded anomalies.

pub mod webhook;

pub use self::webhook::WebhookNotifier;

use crate::config::NotifyConfig;
use crate::detect::{Anomaly, Severity};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// An external channel told about each new anomaly.
///
/// Callers treat failures as non-fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, anomaly: &Anomaly) -> Result<(), NotifyError>;
}

/// One-line human summary of an anomaly.
pub fn summary_line(anomaly: &Anomaly) -> String {
    format!(
        "[{}] {} on API {} (sample {}) at {}",
        anomaly.severity,
        anomaly.kind,
        anomaly.api_id,
        anomaly.sample_id,
        anomaly.detected_at.to_rfc3339()
    )
}

/// Writes anomalies to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, anomaly: &Anomaly) -> Result<(), NotifyError> {
        match anomaly.severity {
            Severity::Critical => warn!(
                anomaly_id = anomaly.id,
                api_id = anomaly.api_id,
                sample_id = anomaly.sample_id,
                kind = %anomaly.kind,
                "Critical anomaly detected"
            ),
            Severity::Warning => info!(
                anomaly_id = anomaly.id,
                api_id = anomaly.api_id,
                sample_id = anomaly.sample_id,
                kind = %anomaly.kind,
                "Anomaly detected"
            ),
        }
        Ok(())
    }
}

/// Sends to every sink, even when an earlier one fails; reports the first error.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, anomaly: &Anomaly) -> Result<(), NotifyError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.notify(anomaly).await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Build the notifier chain described by the `[notify]` config section.
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    let mut sinks: Vec<Arc<dyn Notifier>> = Vec::new();
    if config.log {
        sinks.push(Arc::new(LogNotifier));
    }
    if let Some(url) = &config.webhook_url {
        let timeout = Duration::from_secs(config.timeout_secs);
        let webhook = WebhookNotifier::new(url.clone(), timeout)?;
        info!(url = webhook.url(), "Webhook notifications enabled");
        sinks.push(Arc::new(webhook));
    }
    let fanout = FanoutNotifier::new(sinks);
    if fanout.is_empty() {
        info!("No anomaly notifiers configured");
    }
    Ok(Arc::new(fanout))
}
