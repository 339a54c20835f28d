use tokio_util::sync::CancellationToken;

use conveyor_core::{
    AttemptOutcome, ExecutionAttempt, RunContext, StageDefinition, StageError, StageOutput,
};

use crate::executor::events::{Event, RetryKind};
use crate::executor::execution_loop::{ExecutionLoop, LoopError};

#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError {
    #[error("acceptance not met after {checks} check(s)")]
    Unmet { checks: u32 },
    #[error(transparent)]
    Execution(#[from] LoopError),
}

/// Second retry loop: re-executes the whole stage while its output is not
/// accepted. The acceptance budget is independent of the execution budget;
/// each re-execution starts with a fresh execution budget.
pub struct AcceptanceGate<'a> {
    exec: &'a ExecutionLoop,
}

impl<'a> AcceptanceGate<'a> {
    pub fn new(exec: &'a ExecutionLoop) -> Self {
        Self { exec }
    }

    pub async fn check_with_retry(
        &self,
        stage: &StageDefinition,
        mut output: StageOutput,
        ctx: &RunContext,
        cancel: &CancellationToken,
        attempts: &mut Vec<ExecutionAttempt>,
    ) -> Result<StageOutput, GateError> {
        let mut checks: u32 = 0;
        loop {
            checks += 1;
            match judge(stage, &output, cancel).await {
                Some(true) => return Ok(output),
                Some(false) => {}
                None => return Err(GateError::Execution(LoopError::Cancelled)),
            }
            mark_last_unmet(attempts, &stage.id);
            tracing::info!(stage_id = %stage.id, checks, "stage output not accepted");

            if checks > stage.max_acceptance_retries {
                return Err(GateError::Unmet { checks });
            }

            self.exec
                .sink()
                .emit(Event::RetryScheduled {
                    run_id: ctx.run_id().to_string(),
                    stage_id: stage.id.clone(),
                    kind: RetryKind::Acceptance,
                    delay_ms: stage.retry_delay.as_millis() as u64,
                })
                .await;
            if self.exec.pause(stage.retry_delay, cancel).await {
                return Err(GateError::Execution(LoopError::Cancelled));
            }
            output = self.exec.run_with_retry(stage, ctx, cancel, attempts).await?;
        }
    }
}

/// Full acceptance verdict for one output; `None` when cancelled mid-check.
pub(crate) async fn judge(
    stage: &StageDefinition,
    output: &StageOutput,
    cancel: &CancellationToken,
) -> Option<bool> {
    match stage.verify_output(output, cancel).await {
        Ok(accepted) => Some(accepted),
        Err(StageError::Cancelled) => None,
        Err(e) => {
            tracing::warn!(stage_id = %stage.id, error = %e, "acceptance check failed");
            Some(false)
        }
    }
}

fn mark_last_unmet(attempts: &mut [ExecutionAttempt], stage_id: &str) {
    if let Some(last) = attempts.iter_mut().rev().find(|a| a.stage_id == stage_id) {
        last.outcome = AttemptOutcome::AcceptanceUnmet;
    }
}
