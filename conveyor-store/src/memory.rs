use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::store::{
    BreakerRecord, BreakerStore, Checkpoint, CheckpointKey, CheckpointStatus, CheckpointStore,
    RecordOutcome, StagedOutput, StoreError, StoreState,
};

/// Process-local store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn record(
        &self,
        key: &CheckpointKey,
        status: CheckpointStatus,
        output_ref: Option<&str>,
    ) -> Result<RecordOutcome, StoreError> {
        Ok(self.state.lock().await.record(key, status, output_ref))
    }

    async fn get_checkpoint(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.state.lock().await.get(key))
    }

    async fn list_run_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        Ok(self.state.lock().await.list_run(run_id))
    }

    async fn completed_stages(&self, candidate_id: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.state.lock().await.completed_stages(candidate_id))
    }

    async fn settled_stages(
        &self,
        candidate_id: &str,
    ) -> Result<BTreeMap<String, CheckpointStatus>, StoreError> {
        Ok(self.state.lock().await.settled_stages(candidate_id))
    }

    async fn save_staged_output(
        &self,
        key: &CheckpointKey,
        output_ref: &str,
    ) -> Result<(), StoreError> {
        self.state.lock().await.save_staged(key, output_ref);
        Ok(())
    }

    async fn load_staged_output(
        &self,
        key: &CheckpointKey,
    ) -> Result<Option<StagedOutput>, StoreError> {
        Ok(self.state.lock().await.load_staged(key))
    }

    async fn clear_staged_output(&self, key: &CheckpointKey) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.clear_staged(key))
    }
}

#[async_trait]
impl BreakerStore for MemoryStore {
    async fn load_breaker(&self, stage_id: &str) -> Result<Option<BreakerRecord>, StoreError> {
        Ok(self.state.lock().await.load_breaker(stage_id))
    }

    async fn save_breaker(&self, record: &BreakerRecord) -> Result<(), StoreError> {
        self.state.lock().await.save_breaker(record);
        Ok(())
    }

    async fn list_breakers(&self) -> Result<Vec<BreakerRecord>, StoreError> {
        Ok(self.state.lock().await.list_breakers())
    }

    async fn delete_breaker(&self, stage_id: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.delete_breaker(stage_id))
    }
}
