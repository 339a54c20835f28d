use std::time::Duration;

use crate::types::ExecutionAttempt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    InProgress,
    Completed,
    Aborted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not_started",
            RunState::InProgress => "in_progress",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        }
    }
}

/// Terminal failure of a stage (or of the run, for cancellation).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunError {
    #[error("stage `{stage}` failed after {attempts} attempt(s): {message}")]
    ExecutionFailed {
        stage: String,
        attempts: u32,
        message: String,
    },
    #[error("stage `{stage}` did not meet acceptance after {attempts} attempt(s)")]
    AcceptanceUnmet { stage: String, attempts: u32 },
    #[error("circuit breaker for stage `{stage}` is open")]
    CircuitOpen { stage: String },
    #[error("run cancelled")]
    Cancelled { stage: Option<String> },
}

impl RunError {
    pub fn stage(&self) -> Option<&str> {
        match self {
            RunError::ExecutionFailed { stage, .. }
            | RunError::AcceptanceUnmet { stage, .. }
            | RunError::CircuitOpen { stage } => Some(stage),
            RunError::Cancelled { stage } => stage.as_deref(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub candidate_id: String,
    pub success: bool,
    pub state: RunState,
    pub executed_stages: Vec<String>,
    pub failed_stages: Vec<String>,
    pub skipped_stages: Vec<String>,
    /// Stages satisfied from a succeeded checkpoint of an earlier invocation.
    pub resumed_stages: Vec<String>,
    pub attempts: Vec<ExecutionAttempt>,
    /// Set when the run aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    /// Every terminal stage failure, including ones tolerated by `continue_on_error`.
    pub failures: Vec<RunError>,
    pub total_duration_ms: u64,
}

impl RunResult {
    pub fn new(run_id: impl Into<String>, candidate_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            candidate_id: candidate_id.into(),
            success: false,
            state: RunState::NotStarted,
            executed_stages: Vec::new(),
            failed_stages: Vec::new(),
            skipped_stages: Vec::new(),
            resumed_stages: Vec::new(),
            attempts: Vec::new(),
            error: None,
            failures: Vec::new(),
            total_duration_ms: 0,
        }
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.total_duration_ms)
    }

    pub fn attempts_for(&self, stage_id: &str) -> impl Iterator<Item = &ExecutionAttempt> {
        let stage_id = stage_id.to_string();
        self.attempts.iter().filter(move |a| a.stage_id == stage_id)
    }
}
