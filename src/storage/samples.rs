//! Sample ingest and the SQLite-backed [`MetricSource`].

use super::{
    apis, ceil_millis, from_millis, is_foreign_key_violation, with_conn, Pool, StorageError,
};
use crate::metrics::{MetricSource, Sample, SourceError, Window};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Deserialize;

/// A sample as handed over by a collector, before it gets an id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSample {
    pub api_id: i64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_rate: Option<f64>,
    #[serde(default)]
    pub response_time_ms: Option<f64>,
}

impl NewSample {
    pub fn validate(&self) -> Result<(), StorageError> {
        if let Some(rate) = self.error_rate {
            if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
                return Err(StorageError::Invalid(format!(
                    "errorRate must be a fraction between 0 and 1, got {}",
                    rate
                )));
            }
        }
        if let Some(ms) = self.response_time_ms {
            if !ms.is_finite() || ms < 0.0 {
                return Err(StorageError::Invalid(format!(
                    "responseTimeMs must be a non-negative number, got {}",
                    ms
                )));
            }
        }
        Ok(())
    }
}

/// Store one sample. The timestamp defaults to now.
pub async fn record(pool: &Pool, sample: NewSample) -> Result<Sample, StorageError> {
    sample.validate()?;
    let timestamp = sample.timestamp.unwrap_or_else(Utc::now);

    with_conn(pool, move |conn| {
        let tx = conn.transaction()?;
        if apis::find(&tx, sample.api_id)?.is_none() {
            return Err(StorageError::UnknownApi(sample.api_id));
        }

        let inserted = tx.execute(
            "INSERT INTO samples (api_id, recorded_at_ms, error_rate, response_time_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                sample.api_id,
                timestamp.timestamp_millis(),
                sample.error_rate,
                sample.response_time_ms
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(StorageError::UnknownApi(sample.api_id))
            }
            Err(e) => return Err(e.into()),
        }
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Sample {
            id,
            api_id: sample.api_id,
            timestamp: from_millis(1, timestamp.timestamp_millis())?,
            error_rate: sample.error_rate,
            response_time_ms: sample.response_time_ms,
        })
    })
    .await
}

fn row_to_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        id: row.get(0)?,
        api_id: row.get(1)?,
        timestamp: from_millis(2, row.get(2)?)?,
        error_rate: row.get(3)?,
        response_time_ms: row.get(4)?,
    })
}

/// Reads samples straight from the `samples` table.
#[derive(Clone)]
pub struct SqliteMetricSource {
    pool: Pool,
}

impl SqliteMetricSource {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricSource for SqliteMetricSource {
    async fn fetch(&self, window: Window) -> Result<Vec<Sample>, SourceError> {
        let start = ceil_millis(window.start);
        let end = ceil_millis(window.end);

        let samples = with_conn(&self.pool, move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, api_id, recorded_at_ms, error_rate, response_time_ms
                 FROM samples
                 WHERE recorded_at_ms >= ?1 AND recorded_at_ms < ?2
                 ORDER BY recorded_at_ms, id",
            )?;
            let samples = stmt
                .query_map(params![start, end], row_to_sample)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(samples)
        })
        .await?;

        Ok(samples)
    }
}
