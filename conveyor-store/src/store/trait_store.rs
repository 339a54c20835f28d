use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::store::types::*;

/// Durable per-(run, candidate, stage) completion state.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Write a terminal stage state. A succeeded checkpoint is never replaced.
    async fn record(
        &self,
        key: &CheckpointKey,
        status: CheckpointStatus,
        output_ref: Option<&str>,
    ) -> Result<RecordOutcome, StoreError>;

    async fn get_checkpoint(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, StoreError>;

    /// True iff a succeeded checkpoint exists for the key.
    async fn is_completed(&self, key: &CheckpointKey) -> Result<bool, StoreError> {
        Ok(self
            .get_checkpoint(key)
            .await?
            .is_some_and(|c| c.status == CheckpointStatus::Succeeded))
    }

    /// Checkpoints of one run, ordered by timestamp.
    async fn list_run_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, StoreError>;

    /// Stage ids a candidate has succeeded in, across all runs.
    async fn completed_stages(&self, candidate_id: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Terminal status per stage for a candidate, across all runs. A
    /// succeeded checkpoint wins; otherwise the most recent one does.
    async fn settled_stages(
        &self,
        candidate_id: &str,
    ) -> Result<BTreeMap<String, CheckpointStatus>, StoreError>;

    /// Park an output awaiting acceptance. Overwrites any earlier staged output.
    async fn save_staged_output(
        &self,
        key: &CheckpointKey,
        output_ref: &str,
    ) -> Result<(), StoreError>;

    async fn load_staged_output(
        &self,
        key: &CheckpointKey,
    ) -> Result<Option<StagedOutput>, StoreError>;

    /// Drop a parked output. Returns false when none was parked.
    async fn clear_staged_output(&self, key: &CheckpointKey) -> Result<bool, StoreError>;
}

/// Circuit breaker state that outlives a process.
#[async_trait]
pub trait BreakerStore: Send + Sync {
    async fn load_breaker(&self, stage_id: &str) -> Result<Option<BreakerRecord>, StoreError>;

    async fn save_breaker(&self, record: &BreakerRecord) -> Result<(), StoreError>;

    async fn list_breakers(&self) -> Result<Vec<BreakerRecord>, StoreError>;

    /// Returns false when no record existed.
    async fn delete_breaker(&self, stage_id: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Other(String),
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialization(String),
    #[error("invalid store url `{0}`")]
    InvalidUrl(String),
    #[error("corrupt store record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Other(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
