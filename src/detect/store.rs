//! Persistence contract for anomalies.

use crate::detect::{Anomaly, NewAnomaly};
use crate::storage::StorageError;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("anomaly already recorded for sample {sample_id} ({kind})")]
    Duplicate { sample_id: i64, kind: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Where anomalies are persisted.
///
/// `(sample_id, kind)` is unique across all stored anomalies.
#[async_trait]
pub trait AnomalyStore: Send + Sync {
    async fn exists(&self, sample_id: i64, kind: &str) -> Result<bool, StoreError>;

    /// Persist a new anomaly and return it with its assigned id.
    /// Fails with [`StoreError::Duplicate`] if the dedup key is taken.
    async fn save(&self, anomaly: NewAnomaly) -> Result<Anomaly, StoreError>;

    /// Atomically create the anomaly unless its dedup key already exists.
    /// Returns `None` when it existed.
    ///
    /// The default composes `exists` and `save` and relies on `save` rejecting
    /// duplicates; stores with transactions should override it.
    async fn create_if_absent(&self, anomaly: NewAnomaly) -> Result<Option<Anomaly>, StoreError> {
        if self.exists(anomaly.sample_id, &anomaly.kind).await? {
            return Ok(None);
        }
        match self.save(anomaly).await {
            Ok(saved) => Ok(Some(saved)),
            Err(StoreError::Duplicate { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
