use conveyor_core::{ExecutionAttempt, RunError, StageOutput};
use conveyor_store::StoreError;

use crate::breaker::BreakerConfig;
use crate::executor::execution_loop::Backoff;
use crate::selector::SelectorError;

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub breaker: BreakerConfig,
    pub backoff: Backoff,
    /// Retry without sleeping; for tests.
    pub skip_delays: bool,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Generated (UUID v4) when absent. Reuse an id to resume a run.
    pub run_id: Option<String>,
    /// Asked from the candidate selector when absent.
    pub candidate_id: Option<String>,
    /// Treat succeeded checkpoints of this run as already done.
    pub resume: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_id: None,
            candidate_id: None,
            resume: true,
        }
    }
}

impl RunOptions {
    pub fn candidate(candidate_id: impl Into<String>) -> Self {
        Self {
            candidate_id: Some(candidate_id.into()),
            ..Self::default()
        }
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}

/// Result of executing one stage as a standalone process action.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// A succeeded checkpoint already exists; nothing ran.
    AlreadyCompleted,
    /// The stage's condition is false; a skipped checkpoint was written.
    Skipped,
    /// Execution succeeded; the output awaits an acceptance check.
    Staged {
        output: StageOutput,
        attempts: Vec<ExecutionAttempt>,
    },
    Failed {
        error: RunError,
        attempts: Vec<ExecutionAttempt>,
    },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceOutcome {
    Accepted,
    AlreadyCompleted,
    Unmet,
    /// No output was staged by a preceding run action.
    NothingStaged,
    /// The check was abandoned; the staged output is kept.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no candidate available")]
    NoCandidate,
    #[error("unknown stage `{0}`")]
    UnknownStage(String),
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
