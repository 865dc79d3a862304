//! Database schema and migrations.

use anyhow::Result;
use rusqlite::{params, Connection};

pub const SCHEMA_VERSION: i64 = 1;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS apis (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            url TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS samples (
            id INTEGER PRIMARY KEY,
            api_id INTEGER NOT NULL REFERENCES apis(id),
            recorded_at_ms INTEGER NOT NULL,
            error_rate REAL,
            response_time_ms REAL
        );

        CREATE TABLE IF NOT EXISTS anomalies (
            id INTEGER PRIMARY KEY,
            api_id INTEGER NOT NULL REFERENCES apis(id),
            sample_id INTEGER NOT NULL REFERENCES samples(id),
            type TEXT NOT NULL,
            severity TEXT NOT NULL CHECK (severity IN ('WARNING', 'CRITICAL')),
            detected_at TEXT NOT NULL,
            UNIQUE (sample_id, type)
        );

        CREATE INDEX IF NOT EXISTS idx_samples_recorded ON samples(recorded_at_ms);
        CREATE INDEX IF NOT EXISTS idx_anomalies_detected ON anomalies(detected_at);",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        params![SCHEMA_VERSION],
    )?;

    Ok(())
}
