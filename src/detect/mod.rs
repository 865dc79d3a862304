//! Threshold-based anomaly detection.

pub mod engine;
pub mod policy;
pub mod store;

pub use engine::{AnomalyDetector, DetectionSummary, SampleFailure};
pub use policy::{ThresholdPolicy, Violation};
pub use store::{AnomalyStore, StoreError};

use crate::metrics::SourceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid scan window: start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("failed to fetch samples: {0}")]
    Source(#[from] SourceError),
}

/// Severity of a recorded anomaly. Ordered: `Critical` outranks `Warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// An anomaly that has been evaluated but not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnomaly {
    pub api_id: i64,
    pub sample_id: i64,
    /// Violation labels joined with `"; "`. Together with `sample_id` this is
    /// the dedup key.
    pub kind: String,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
}

impl NewAnomaly {
    pub fn with_id(self, id: i64) -> Anomaly {
        Anomaly {
            id,
            api_id: self.api_id,
            sample_id: self.sample_id,
            kind: self.kind,
            severity: self.severity,
            detected_at: self.detected_at,
        }
    }
}

/// A recorded, deduplicated rule violation for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: i64,
    pub api_id: i64,
    pub sample_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
}
