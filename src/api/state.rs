use crate::detect::AnomalyDetector;
use crate::storage::{Pool, SqliteAnomalyStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub detector: AnomalyDetector,
    pub anomalies: SqliteAnomalyStore,
    /// Length of the window scanned by `POST /api/anomalies/detect`.
    pub manual_window: chrono::Duration,
}

impl AppState {
    pub fn new(pool: Pool, detector: AnomalyDetector, manual_window: chrono::Duration) -> Self {
        Self {
            anomalies: SqliteAnomalyStore::new(pool.clone()),
            pool,
            detector,
            manual_window,
        }
    }
}
