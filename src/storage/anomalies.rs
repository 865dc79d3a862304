//! SQLite-backed [`AnomalyStore`] and read-side queries.

use super::{is_unique_violation, parse_rfc3339, with_conn, Pool, StorageError};
use crate::detect::{Anomaly, AnomalyStore, NewAnomaly, Severity, StoreError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

const SELECT_ANOMALY: &str =
    "SELECT id, api_id, sample_id, type, severity, detected_at FROM anomalies";

fn row_to_anomaly(row: &rusqlite::Row<'_>) -> rusqlite::Result<Anomaly> {
    let severity: String = row.get(4)?;
    Ok(Anomaly {
        id: row.get(0)?,
        api_id: row.get(1)?,
        sample_id: row.get(2)?,
        kind: row.get(3)?,
        severity: severity.parse::<Severity>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?,
        detected_at: parse_rfc3339(5, &row.get::<_, String>(5)?)?,
    })
}

fn exists_in(conn: &Connection, sample_id: i64, kind: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM anomalies WHERE sample_id = ?1 AND type = ?2)",
        params![sample_id, kind],
        |row| row.get(0),
    )
}

/// Inserts the row; `Ok(None)` when the dedup key is already taken.
fn insert(conn: &Connection, anomaly: &NewAnomaly) -> rusqlite::Result<Option<i64>> {
    let inserted = conn.execute(
        "INSERT INTO anomalies (api_id, sample_id, type, severity, detected_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            anomaly.api_id,
            anomaly.sample_id,
            anomaly.kind,
            anomaly.severity.as_str(),
            anomaly.detected_at.to_rfc3339()
        ],
    );
    match inserted {
        Ok(_) => Ok(Some(conn.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Clone)]
pub struct SqliteAnomalyStore {
    pool: Pool,
}

impl SqliteAnomalyStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Most recently detected first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Anomaly>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        with_conn(&self.pool, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY detected_at DESC, id DESC LIMIT ?1",
                SELECT_ANOMALY
            ))?;
            let anomalies = stmt
                .query_map(params![limit], row_to_anomaly)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(anomalies)
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Anomaly>, StorageError> {
        with_conn(&self.pool, move |conn| {
            let anomaly = conn
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_ANOMALY),
                    params![id],
                    row_to_anomaly,
                )
                .optional()?;
            Ok(anomaly)
        })
        .await
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        with_conn(&self.pool, |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM anomalies", [], |row| row.get(0))?)
        })
        .await
    }
}

#[async_trait]
impl AnomalyStore for SqliteAnomalyStore {
    async fn exists(&self, sample_id: i64, kind: &str) -> Result<bool, StoreError> {
        let kind = kind.to_string();
        let found = with_conn(&self.pool, move |conn| Ok(exists_in(conn, sample_id, &kind)?)).await?;
        Ok(found)
    }

    async fn save(&self, anomaly: NewAnomaly) -> Result<Anomaly, StoreError> {
        let (sample_id, kind) = (anomaly.sample_id, anomaly.kind.clone());
        let saved = with_conn(&self.pool, move |conn| {
            Ok(insert(conn, &anomaly)?.map(|id| anomaly.with_id(id)))
        })
        .await?;
        saved.ok_or(StoreError::Duplicate { sample_id, kind })
    }

    /// Check and insert inside one IMMEDIATE transaction; the write lock is
    /// taken before the existence check, and the UNIQUE constraint backs it up.
    async fn create_if_absent(&self, anomaly: NewAnomaly) -> Result<Option<Anomaly>, StoreError> {
        let created = with_conn(&self.pool, move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if exists_in(&tx, anomaly.sample_id, &anomaly.kind)? {
                return Ok(None);
            }
            let Some(id) = insert(&tx, &anomaly)? else {
                return Ok(None);
            };
            tx.commit()?;
            Ok(Some(anomaly.with_id(id)))
        })
        .await?;
        Ok(created)
    }
}
