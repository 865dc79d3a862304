use crate::detect::{
    Anomaly, AnomalyStore, DetectError, NewAnomaly, StoreError, ThresholdPolicy, Violation,
};
use crate::metrics::{MetricSource, Sample, Window};
use crate::notify::Notifier;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

/// A sample whose anomaly could not be persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleFailure {
    pub sample_id: i64,
    pub error: String,
}

/// Outcome of one `detect` pass over a window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSummary {
    pub run_id: Uuid,
    pub window: Window,
    pub samples_scanned: usize,
    /// Newly created anomalies. This is the count reported to triggers.
    pub created: usize,
    /// Violations skipped because the same (sample, type) was already recorded.
    pub duplicates: usize,
    pub failures: Vec<SampleFailure>,
}

impl DetectionSummary {
    fn new(run_id: Uuid, window: Window) -> Self {
        Self {
            run_id,
            window,
            samples_scanned: 0,
            created: 0,
            duplicates: 0,
            failures: Vec::new(),
        }
    }
}

/// Evaluates samples against a [`ThresholdPolicy`] and records each distinct
/// violation exactly once.
#[derive(Clone)]
pub struct AnomalyDetector {
    source: Arc<dyn MetricSource>,
    store: Arc<dyn AnomalyStore>,
    notifier: Arc<dyn Notifier>,
    policy: ThresholdPolicy,
}

impl AnomalyDetector {
    pub fn new(
        source: Arc<dyn MetricSource>,
        store: Arc<dyn AnomalyStore>,
        notifier: Arc<dyn Notifier>,
        policy: ThresholdPolicy,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            policy,
        }
    }

    /// Scan every sample in `window` and record new anomalies.
    ///
    /// A fetch failure aborts the whole pass. Persistence failures are
    /// isolated to their sample and reported in [`DetectionSummary::failures`].
    pub async fn detect(&self, window: Window) -> Result<DetectionSummary, DetectError> {
        if window.is_inverted() {
            return Err(DetectError::InvalidWindow {
                start: window.start,
                end: window.end,
            });
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("detect", %run_id, start = %window.start, end = %window.end);
        self.scan(run_id, window).instrument(span).await
    }

    async fn scan(&self, run_id: Uuid, window: Window) -> Result<DetectionSummary, DetectError> {
        let mut summary = DetectionSummary::new(run_id, window);
        if window.is_empty() {
            return Ok(summary);
        }

        let samples = self.source.fetch(window).await?;
        summary.samples_scanned = samples.len();
        debug!(samples = samples.len(), "Fetched samples");

        for sample in &samples {
            let Some(violation) = self.policy.evaluate(sample) else {
                continue;
            };

            match self.record(sample, &violation).await {
                Ok(Some(_)) => summary.created += 1,
                Ok(None) => {
                    debug!(sample_id = sample.id, kind = %violation.kind(), "Anomaly already recorded");
                    summary.duplicates += 1;
                }
                Err(e) => {
                    error!(sample_id = sample.id, error = %e, "Failed to record anomaly");
                    summary.failures.push(SampleFailure {
                        sample_id: sample.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }

    /// Create-if-absent, then notify. Notification errors are logged only.
    async fn record(
        &self,
        sample: &Sample,
        violation: &Violation,
    ) -> Result<Option<Anomaly>, StoreError> {
        let candidate = NewAnomaly {
            api_id: sample.api_id,
            sample_id: sample.id,
            kind: violation.kind(),
            severity: violation.severity,
            detected_at: Utc::now(),
        };

        let Some(anomaly) = self.store.create_if_absent(candidate).await? else {
            return Ok(None);
        };

        if let Err(e) = self.notifier.notify(&anomaly).await {
            warn!(anomaly_id = anomaly.id, error = %e, "Anomaly notification failed");
        }

        Ok(Some(anomaly))
    }
}
