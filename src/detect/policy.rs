//! Threshold policy and per-sample rule evaluation.

use crate::detect::Severity;
use crate::metrics::Sample;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HIGH_ERROR_RATE: &str = "High Error Rate";
pub const SLOW_RESPONSE_TIME: &str = "Slow Response Time";

const LABEL_SEPARATOR: &str = "; ";

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("error rate limit must be a fraction between 0 and 1, got {0}")]
    ErrorRateLimit(f64),
    #[error("response time limit must be a non-negative number of milliseconds, got {0}")]
    ResponseTimeLimit(f64),
}

/// Limits a sample is compared against. Values strictly above a limit violate it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub error_rate_limit: f64,
    pub response_time_limit_ms: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            error_rate_limit: 0.1,
            response_time_limit_ms: 800.0,
        }
    }
}

/// The rules a single sample broke, in check order.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub labels: Vec<&'static str>,
    pub severity: Severity,
}

impl Violation {
    /// The composed `type` string used for storage and deduplication.
    pub fn kind(&self) -> String {
        self.labels.join(LABEL_SEPARATOR)
    }
}

impl ThresholdPolicy {
    pub fn new(error_rate_limit: f64, response_time_limit_ms: f64) -> Result<Self, PolicyError> {
        let policy = Self {
            error_rate_limit,
            response_time_limit_ms,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.error_rate_limit.is_finite() || !(0.0..=1.0).contains(&self.error_rate_limit) {
            return Err(PolicyError::ErrorRateLimit(self.error_rate_limit));
        }
        if !self.response_time_limit_ms.is_finite() || self.response_time_limit_ms < 0.0 {
            return Err(PolicyError::ResponseTimeLimit(self.response_time_limit_ms));
        }
        Ok(())
    }

    /// Check a sample against both limits. Absent fields never violate.
    ///
    /// The error-rate check runs first and sets `Critical`; the response-time
    /// check only sets `Warning` when nothing was set before it, so severity
    /// never goes down.
    pub fn evaluate(&self, sample: &Sample) -> Option<Violation> {
        let mut labels = Vec::with_capacity(2);
        let mut severity = None;

        if let Some(rate) = sample.error_rate {
            if rate > self.error_rate_limit {
                labels.push(HIGH_ERROR_RATE);
                severity = Some(Severity::Critical);
            }
        }

        if let Some(ms) = sample.response_time_ms {
            if ms > self.response_time_limit_ms {
                labels.push(SLOW_RESPONSE_TIME);
                severity.get_or_insert(Severity::Warning);
            }
        }

        severity.map(|severity| Violation { labels, severity })
    }
}
