//! Performance samples and the source the detector reads them from.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("metric source unavailable: {0}")]
    Unavailable(String),
}

/// One timestamped measurement of an API's error rate and/or response time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: i64,
    pub api_id: i64,
    pub timestamp: DateTime<Utc>,
    /// Fraction of failed requests, 0.0 to 1.0.
    pub error_rate: Option<f64>,
    pub response_time_ms: Option<f64>,
}

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window of `length` ending at `end`.
    pub fn trailing(end: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start: end - length,
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Supplies the samples recorded inside a window.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Samples with `window.start <= timestamp < window.end`, in any order.
    async fn fetch(&self, window: Window) -> Result<Vec<Sample>, SourceError>;
}
