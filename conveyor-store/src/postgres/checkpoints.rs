use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::store::{
    Checkpoint, CheckpointKey, CheckpointStatus, RecordOutcome, StagedOutput, StoreError,
};

#[derive(Debug, sqlx::FromRow)]
struct CheckpointRow {
    run_id: String,
    candidate_id: String,
    stage_id: String,
    status: String,
    output_ref: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<CheckpointRow> for Checkpoint {
    type Error = StoreError;

    fn try_from(row: CheckpointRow) -> Result<Self, StoreError> {
        let status = CheckpointStatus::try_from(row.status.as_str()).map_err(StoreError::Corrupt)?;
        Ok(Checkpoint {
            run_id: row.run_id,
            candidate_id: row.candidate_id,
            stage_id: row.stage_id,
            status,
            timestamp: row.recorded_at,
            output_ref: row.output_ref,
        })
    }
}

pub async fn record(
    pool: &PgPool,
    key: &CheckpointKey,
    status: CheckpointStatus,
    output_ref: Option<&str>,
) -> Result<RecordOutcome, StoreError> {
    let result = sqlx::query(
        r#"
INSERT INTO checkpoints (run_id, candidate_id, stage_id, status, output_ref, recorded_at)
VALUES ($1, $2, $3, $4, $5, now())
ON CONFLICT (run_id, candidate_id, stage_id) DO UPDATE
SET status = EXCLUDED.status, output_ref = EXCLUDED.output_ref, recorded_at = EXCLUDED.recorded_at
WHERE checkpoints.status <> 'succeeded'
        "#,
    )
    .bind(&key.run_id)
    .bind(&key.candidate_id)
    .bind(&key.stage_id)
    .bind(status.as_str())
    .bind(output_ref)
    .execute(pool)
    .await?;

    Ok(if result.rows_affected() == 0 {
        RecordOutcome::Unchanged
    } else {
        RecordOutcome::Written
    })
}

pub async fn get_checkpoint(
    pool: &PgPool,
    key: &CheckpointKey,
) -> Result<Option<Checkpoint>, StoreError> {
    let row = sqlx::query_as::<_, CheckpointRow>(
        r#"
SELECT run_id, candidate_id, stage_id, status, output_ref, recorded_at
FROM checkpoints WHERE run_id = $1 AND candidate_id = $2 AND stage_id = $3
        "#,
    )
    .bind(&key.run_id)
    .bind(&key.candidate_id)
    .bind(&key.stage_id)
    .fetch_optional(pool)
    .await?;
    row.map(Checkpoint::try_from).transpose()
}

pub async fn is_completed(pool: &PgPool, key: &CheckpointKey) -> Result<bool, StoreError> {
    let rec: (bool,) = sqlx::query_as(
        r#"
SELECT EXISTS (
  SELECT 1 FROM checkpoints
  WHERE run_id = $1 AND candidate_id = $2 AND stage_id = $3 AND status = 'succeeded'
)
        "#,
    )
    .bind(&key.run_id)
    .bind(&key.candidate_id)
    .bind(&key.stage_id)
    .fetch_one(pool)
    .await?;
    Ok(rec.0)
}

pub async fn list_run_checkpoints(pool: &PgPool, run_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
    let rows = sqlx::query_as::<_, CheckpointRow>(
        r#"
SELECT run_id, candidate_id, stage_id, status, output_ref, recorded_at
FROM checkpoints WHERE run_id = $1 ORDER BY recorded_at, stage_id
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Checkpoint::try_from).collect()
}

pub async fn completed_stages(pool: &PgPool, candidate_id: &str) -> Result<BTreeSet<String>, StoreError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"SELECT DISTINCT stage_id FROM checkpoints WHERE candidate_id = $1 AND status = 'succeeded'"#,
    )
    .bind(candidate_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn settled_stages(
    pool: &PgPool,
    candidate_id: &str,
) -> Result<BTreeMap<String, CheckpointStatus>, StoreError> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
SELECT DISTINCT ON (stage_id) stage_id, status
FROM checkpoints
WHERE candidate_id = $1 AND status IN ('succeeded', 'failed', 'skipped')
ORDER BY stage_id, (status = 'succeeded') DESC, recorded_at DESC
        "#,
    )
    .bind(candidate_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|(stage_id, status)| {
            let status = CheckpointStatus::try_from(status.as_str()).map_err(StoreError::Corrupt)?;
            Ok((stage_id, status))
        })
        .collect()
}

pub async fn save_staged_output(
    pool: &PgPool,
    key: &CheckpointKey,
    output_ref: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
INSERT INTO staged_outputs (run_id, candidate_id, stage_id, output_ref, saved_at)
VALUES ($1, $2, $3, $4, now())
ON CONFLICT (run_id, candidate_id, stage_id) DO UPDATE
SET output_ref = EXCLUDED.output_ref, saved_at = EXCLUDED.saved_at
        "#,
    )
    .bind(&key.run_id)
    .bind(&key.candidate_id)
    .bind(&key.stage_id)
    .bind(output_ref)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_staged_output(
    pool: &PgPool,
    key: &CheckpointKey,
) -> Result<Option<StagedOutput>, StoreError> {
    let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
        r#"
SELECT output_ref, saved_at FROM staged_outputs
WHERE run_id = $1 AND candidate_id = $2 AND stage_id = $3
        "#,
    )
    .bind(&key.run_id)
    .bind(&key.candidate_id)
    .bind(&key.stage_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(output_ref, saved_at)| StagedOutput {
        key: key.clone(),
        output_ref,
        saved_at,
    }))
}

pub async fn clear_staged_output(pool: &PgPool, key: &CheckpointKey) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"DELETE FROM staged_outputs WHERE run_id = $1 AND candidate_id = $2 AND stage_id = $3"#,
    )
    .bind(&key.run_id)
    .bind(&key.candidate_id)
    .bind(&key.stage_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
