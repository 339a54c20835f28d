use std::collections::{BTreeMap, BTreeSet};

use sqlx::PgPool;

use crate::store::{
    BreakerRecord, BreakerStore, Checkpoint, CheckpointKey, CheckpointStatus, CheckpointStore,
    RecordOutcome, StagedOutput, StoreError,
};

use super::breakers;
use super::checkpoints;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl CheckpointStore for PostgresStore {
    async fn record(
        &self,
        key: &CheckpointKey,
        status: CheckpointStatus,
        output_ref: Option<&str>,
    ) -> Result<RecordOutcome, StoreError> {
        let outcome = checkpoints::record(&self.pool, key, status, output_ref).await?;
        tracing::debug!(%key, status = status.as_str(), ?outcome, "recorded checkpoint");
        Ok(outcome)
    }

    async fn get_checkpoint(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, StoreError> {
        checkpoints::get_checkpoint(&self.pool, key).await
    }

    async fn is_completed(&self, key: &CheckpointKey) -> Result<bool, StoreError> {
        checkpoints::is_completed(&self.pool, key).await
    }

    async fn list_run_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        checkpoints::list_run_checkpoints(&self.pool, run_id).await
    }

    async fn completed_stages(&self, candidate_id: &str) -> Result<BTreeSet<String>, StoreError> {
        checkpoints::completed_stages(&self.pool, candidate_id).await
    }

    async fn settled_stages(
        &self,
        candidate_id: &str,
    ) -> Result<BTreeMap<String, CheckpointStatus>, StoreError> {
        checkpoints::settled_stages(&self.pool, candidate_id).await
    }

    async fn save_staged_output(
        &self,
        key: &CheckpointKey,
        output_ref: &str,
    ) -> Result<(), StoreError> {
        checkpoints::save_staged_output(&self.pool, key, output_ref).await
    }

    async fn load_staged_output(
        &self,
        key: &CheckpointKey,
    ) -> Result<Option<StagedOutput>, StoreError> {
        checkpoints::load_staged_output(&self.pool, key).await
    }

    async fn clear_staged_output(&self, key: &CheckpointKey) -> Result<bool, StoreError> {
        checkpoints::clear_staged_output(&self.pool, key).await
    }
}

#[async_trait::async_trait]
impl BreakerStore for PostgresStore {
    async fn load_breaker(&self, stage_id: &str) -> Result<Option<BreakerRecord>, StoreError> {
        breakers::load_breaker(&self.pool, stage_id).await
    }

    async fn save_breaker(&self, record: &BreakerRecord) -> Result<(), StoreError> {
        breakers::save_breaker(&self.pool, record).await
    }

    async fn list_breakers(&self) -> Result<Vec<BreakerRecord>, StoreError> {
        breakers::list_breakers(&self.pool).await
    }

    async fn delete_breaker(&self, stage_id: &str) -> Result<bool, StoreError> {
        breakers::delete_breaker(&self.pool, stage_id).await
    }
}
