use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use conveyor_core::{
    AttemptOutcome, ExecutionAttempt, RunContext, StageDefinition, StageError, StageOutput,
};

use crate::executor::events::{Event, EventSink, RetryKind};
use crate::retry::{decide_retry, RetryDecision, RetryPolicy};

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoopError {
    #[error("execution failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: StageError },
    #[error("cancelled")]
    Cancelled,
}

/// Delay shape applied on top of each stage's own retry count and delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub factor: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            factor: 1.0,
            max_delay: Duration::from_secs(300),
            jitter: false,
        }
    }
}

/// Runs a stage body with bounded retry on error.
pub struct ExecutionLoop {
    sink: Arc<dyn EventSink>,
    backoff: Backoff,
    skip_delays: bool,
}

impl ExecutionLoop {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            backoff: Backoff::default(),
            skip_delays: false,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Retry immediately instead of sleeping. Intended for tests.
    pub fn skip_delays(mut self, skip: bool) -> Self {
        self.skip_delays = skip;
        self
    }

    pub(crate) fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub fn policy_for(&self, stage: &StageDefinition) -> RetryPolicy {
        RetryPolicy::fixed(stage.max_execution_retries, stage.retry_delay)
            .with_backoff(self.backoff.factor, self.backoff.max_delay.max(stage.retry_delay))
            .with_jitter(self.backoff.jitter)
    }

    /// Invoke the stage until it succeeds or its execution budget is spent.
    ///
    /// Every invocation is appended to `attempts`; attempt numbers continue
    /// from whatever the log already holds for this stage.
    pub async fn run_with_retry(
        &self,
        stage: &StageDefinition,
        ctx: &RunContext,
        cancel: &CancellationToken,
        attempts: &mut Vec<ExecutionAttempt>,
    ) -> Result<StageOutput, LoopError> {
        let Some(body) = stage.body.as_ref() else {
            return Err(LoopError::Exhausted {
                attempts: 0,
                last_error: StageError::msg(format!("stage `{}` has no execute body", stage.id)),
            });
        };
        let policy = self.policy_for(stage);
        let mut tries: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(LoopError::Cancelled);
            }

            tries += 1;
            let attempt_no = next_attempt_no(attempts, &stage.id);
            self.sink
                .emit(Event::AttemptStarted {
                    run_id: ctx.run_id().to_string(),
                    stage_id: stage.id.clone(),
                    attempt_no,
                })
                .await;

            let started_at = Utc::now();
            let clock = Instant::now();
            let result = body.execute(ctx, cancel).await;
            let duration_ms = clock.elapsed().as_millis() as u64;

            let (outcome, error) = match &result {
                Ok(_) => (AttemptOutcome::Success, None),
                Err(_) if cancel.is_cancelled() => (AttemptOutcome::Cancelled, None),
                Err(e) => (AttemptOutcome::ExecutionError, Some(e.to_string())),
            };
            attempts.push(ExecutionAttempt {
                stage_id: stage.id.clone(),
                attempt_no,
                outcome,
                started_at,
                duration_ms,
                error,
            });
            self.sink
                .emit(Event::AttemptFinished {
                    run_id: ctx.run_id().to_string(),
                    stage_id: stage.id.clone(),
                    attempt_no,
                    succeeded: outcome == AttemptOutcome::Success,
                    duration_ms,
                })
                .await;

            let err = match result {
                Ok(output) => return Ok(output),
                Err(_) if outcome == AttemptOutcome::Cancelled => return Err(LoopError::Cancelled),
                Err(e) => e,
            };
            tracing::debug!(stage_id = %stage.id, attempt_no, error = %err, "stage attempt failed");

            match decide_retry(&policy, tries, || fastrand::u64(..)) {
                RetryDecision::Stop { .. } => {
                    return Err(LoopError::Exhausted {
                        attempts: tries,
                        last_error: err,
                    });
                }
                RetryDecision::RetryAfter { delay, .. } => {
                    self.sink
                        .emit(Event::RetryScheduled {
                            run_id: ctx.run_id().to_string(),
                            stage_id: stage.id.clone(),
                            kind: RetryKind::Execution,
                            delay_ms: delay.as_millis() as u64,
                        })
                        .await;
                    if self.pause(delay, cancel).await {
                        return Err(LoopError::Cancelled);
                    }
                }
            }
        }
    }

    /// Sleep unless delays are skipped. Returns true when cancelled meanwhile.
    pub(crate) async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if self.skip_delays || delay.is_zero() {
            return cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}

pub(crate) fn next_attempt_no(attempts: &[ExecutionAttempt], stage_id: &str) -> u32 {
    attempts.iter().filter(|a| a.stage_id == stage_id).count() as u32 + 1
}
