use std::fmt;

use chrono::{DateTime, Utc};

/// Identity of one stage execution for one candidate within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CheckpointKey {
    pub run_id: String,
    pub candidate_id: String,
    pub stage_id: String,
}

impl CheckpointKey {
    pub fn new(
        run_id: impl Into<String>,
        candidate_id: impl Into<String>,
        stage_id: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            candidate_id: candidate_id.into(),
            stage_id: stage_id.into(),
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.run_id, self.candidate_id, self.stage_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Running => "running",
            CheckpointStatus::Succeeded => "succeeded",
            CheckpointStatus::Failed => "failed",
            CheckpointStatus::Skipped => "skipped",
        }
    }

    /// Succeeded, failed or skipped: the stage will not make progress on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckpointStatus::Succeeded | CheckpointStatus::Failed | CheckpointStatus::Skipped
        )
    }
}

impl TryFrom<&str> for CheckpointStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, String> {
        match value {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("unknown checkpoint status: {value}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub candidate_id: String,
    pub stage_id: String,
    pub status: CheckpointStatus,
    pub timestamp: DateTime<Utc>,
    /// Serialized stage output; present for succeeded stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
}

impl Checkpoint {
    pub fn key(&self) -> CheckpointKey {
        CheckpointKey::new(&self.run_id, &self.candidate_id, &self.stage_id)
    }

    pub fn matches(&self, key: &CheckpointKey) -> bool {
        self.run_id == key.run_id
            && self.candidate_id == key.candidate_id
            && self.stage_id == key.stage_id
    }
}

/// Whether a `record` call changed anything. Succeeded checkpoints are
/// never replaced, so recording over one reports `Unchanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Written,
    Unchanged,
}

/// Output produced by a `run` action, waiting for acceptance.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StagedOutput {
    pub key: CheckpointKey,
    pub output_ref: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl TryFrom<&str> for BreakerState {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, String> {
        match value {
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            "half_open" | "half-open" => Ok(Self::HalfOpen),
            _ => Err(format!("unknown breaker state: {value}")),
        }
    }
}

/// Persisted circuit breaker state for one stage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BreakerRecord {
    pub stage_id: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl BreakerRecord {
    pub fn closed(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            updated_at: Utc::now(),
        }
    }
}
