use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    ExecutionError,
    AcceptanceUnmet,
    Cancelled,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::ExecutionError => "execution_error",
            AttemptOutcome::AcceptanceUnmet => "acceptance_unmet",
            AttemptOutcome::Cancelled => "cancelled",
        }
    }
}

/// One invocation of a stage body. `attempt_no` is 1-based and counts every
/// invocation of the stage within a run, acceptance re-runs included.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExecutionAttempt {
    pub stage_id: String,
    pub attempt_no: u32,
    pub outcome: AttemptOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionAttempt {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}
