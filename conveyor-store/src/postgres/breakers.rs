use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::store::{BreakerRecord, BreakerState, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct BreakerRow {
    stage_id: String,
    state: String,
    consecutive_failures: i32,
    opened_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BreakerRow> for BreakerRecord {
    type Error = StoreError;

    fn try_from(row: BreakerRow) -> Result<Self, StoreError> {
        Ok(BreakerRecord {
            state: BreakerState::try_from(row.state.as_str()).map_err(StoreError::Corrupt)?,
            stage_id: row.stage_id,
            consecutive_failures: u32::try_from(row.consecutive_failures).unwrap_or(0),
            opened_at: row.opened_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn load_breaker(pool: &PgPool, stage_id: &str) -> Result<Option<BreakerRecord>, StoreError> {
    let row = sqlx::query_as::<_, BreakerRow>(
        r#"
SELECT stage_id, state, consecutive_failures, opened_at, updated_at
FROM circuit_breakers WHERE stage_id = $1
        "#,
    )
    .bind(stage_id)
    .fetch_optional(pool)
    .await?;
    row.map(BreakerRecord::try_from).transpose()
}

pub async fn save_breaker(pool: &PgPool, record: &BreakerRecord) -> Result<(), StoreError> {
    let failures = i32::try_from(record.consecutive_failures).unwrap_or(i32::MAX);
    sqlx::query(
        r#"
INSERT INTO circuit_breakers (stage_id, state, consecutive_failures, opened_at, updated_at)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (stage_id) DO UPDATE
SET state = EXCLUDED.state,
    consecutive_failures = EXCLUDED.consecutive_failures,
    opened_at = EXCLUDED.opened_at,
    updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&record.stage_id)
    .bind(record.state.as_str())
    .bind(failures)
    .bind(record.opened_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_breakers(pool: &PgPool) -> Result<Vec<BreakerRecord>, StoreError> {
    let rows = sqlx::query_as::<_, BreakerRow>(
        r#"
SELECT stage_id, state, consecutive_failures, opened_at, updated_at
FROM circuit_breakers ORDER BY stage_id
        "#,
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(BreakerRecord::try_from).collect()
}

pub async fn delete_breaker(pool: &PgPool, stage_id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query(r#"DELETE FROM circuit_breakers WHERE stage_id = $1"#)
        .bind(stage_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
