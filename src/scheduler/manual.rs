//! On-demand detection over a trailing window.

use crate::detect::{AnomalyDetector, DetectError, DetectionSummary};
use crate::metrics::Window;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Success,
}

/// Result payload of a manual trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub status: ScanStatus,
    pub anomalies_found: usize,
    pub scan_window_start: DateTime<Utc>,
    pub scan_window_end: DateTime<Utc>,
    #[serde(skip)]
    pub summary: DetectionSummary,
}

/// Scan the `length` of time ending now.
pub async fn trigger_manual_detection(
    detector: &AnomalyDetector,
    length: chrono::Duration,
) -> Result<ScanReport, DetectError> {
    let window = Window::trailing(Utc::now(), length);
    let summary = detector.detect(window).await?;

    info!(
        run_id = %summary.run_id,
        anomalies = summary.created,
        failures = summary.failures.len(),
        "Manual detection complete"
    );

    Ok(ScanReport {
        status: ScanStatus::Success,
        anomalies_found: summary.created,
        scan_window_start: window.start,
        scan_window_end: window.end,
        summary,
    })
}
