//! Registry of monitored APIs.

use super::{is_unique_violation, parse_rfc3339, with_conn, Pool, StorageError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredApi {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

fn row_to_api(row: &rusqlite::Row<'_>) -> rusqlite::Result<MonitoredApi> {
    Ok(MonitoredApi {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        created_at: parse_rfc3339(3, &row.get::<_, String>(3)?)?,
    })
}

pub async fn register(pool: &Pool, name: &str, url: &str) -> Result<MonitoredApi, StorageError> {
    let name = name.trim().to_string();
    let url = url.trim().to_string();
    if name.is_empty() {
        return Err(StorageError::Invalid("API name must not be empty".to_string()));
    }
    if url.is_empty() {
        return Err(StorageError::Invalid("API url must not be empty".to_string()));
    }

    with_conn(pool, move |conn| {
        let created_at = Utc::now();
        let inserted = conn.execute(
            "INSERT INTO apis (name, url, created_at) VALUES (?1, ?2, ?3)",
            params![name, url, created_at.to_rfc3339()],
        );
        match inserted {
            Ok(_) => Ok(MonitoredApi {
                id: conn.last_insert_rowid(),
                name,
                url,
                created_at,
            }),
            Err(e) if is_unique_violation(&e) => Err(StorageError::DuplicateApi(name)),
            Err(e) => Err(e.into()),
        }
    })
    .await
}

pub async fn list(pool: &Pool) -> Result<Vec<MonitoredApi>, StorageError> {
    with_conn(pool, |conn| {
        let mut stmt = conn.prepare("SELECT id, name, url, created_at FROM apis ORDER BY id")?;
        let apis = stmt
            .query_map([], row_to_api)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(apis)
    })
    .await
}

pub(crate) fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<MonitoredApi>> {
    conn.query_row(
        "SELECT id, name, url, created_at FROM apis WHERE id = ?1",
        params![id],
        row_to_api,
    )
    .optional()
}
