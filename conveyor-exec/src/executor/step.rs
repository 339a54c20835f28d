//! Single-stage actions for driving a pipeline one process invocation at a
//! time: `execute_stage` runs a stage and parks its output, then
//! `check_acceptance` promotes the parked output to a succeeded checkpoint.

use tokio_util::sync::CancellationToken;

use conveyor_core::{RunContext, RunError, StageDefinition, StageOutput};
use conveyor_store::{CheckpointKey, CheckpointStatus, StoreError};

use crate::executor::acceptance::judge;
use crate::executor::events::{Event, SkipReason};
use crate::executor::execution_loop::LoopError;
use crate::executor::orchestrator::Orchestrator;
use crate::executor::types::{AcceptanceOutcome, OrchestratorError, StepOutcome};

impl Orchestrator {
    fn stage(&self, stage_id: &str) -> Result<&StageDefinition, OrchestratorError> {
        self.registry
            .get(stage_id)
            .ok_or_else(|| OrchestratorError::UnknownStage(stage_id.to_string()))
    }

    /// Ask the selector for a candidate ready for `stage_id`. Without a
    /// selector there is never one.
    pub async fn pick_candidate(&self, stage_id: &str) -> Result<Option<String>, OrchestratorError> {
        self.stage(stage_id)?;
        let Some(selector) = &self.selector else {
            return Ok(None);
        };
        Ok(selector.pick_one(stage_id).await?)
    }

    /// Rebuild a run's context from the succeeded checkpoints of its
    /// planned stages, in plan order.
    pub async fn load_context(
        &self,
        run_id: &str,
        candidate_id: &str,
    ) -> Result<RunContext, OrchestratorError> {
        let mut ctx = RunContext::new(run_id, candidate_id);
        for stage in self.registry.planned_stages() {
            let key = CheckpointKey::new(run_id, candidate_id, &stage.id);
            if let Some(output) = self.completed_output(&key).await? {
                ctx.insert_output(&stage.id, output);
            }
        }
        Ok(ctx)
    }

    /// Run one stage with its execution retry budget and stage the output
    /// for a later acceptance check.
    pub async fn execute_stage(
        &self,
        stage_id: &str,
        run_id: &str,
        candidate_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, OrchestratorError> {
        let stage = self.stage(stage_id)?;
        let key = CheckpointKey::new(run_id, candidate_id, stage_id);

        if self.checkpoints.is_completed(&key).await? {
            self.emit_skipped(run_id, stage_id, SkipReason::AlreadyCompleted)
                .await;
            return Ok(StepOutcome::AlreadyCompleted);
        }

        let ctx = self.load_context(run_id, candidate_id).await?;
        if !stage.should_run(&ctx) {
            self.checkpoints
                .record(&key, CheckpointStatus::Skipped, None)
                .await?;
            self.emit_skipped(run_id, stage_id, SkipReason::ConditionFalse)
                .await;
            return Ok(StepOutcome::Skipped);
        }

        if !self.breaker.should_attempt(stage_id).await? {
            let error = RunError::CircuitOpen {
                stage: stage_id.to_string(),
            };
            self.fail_stage(stage, &key, &error, false).await?;
            return Ok(StepOutcome::Failed {
                error,
                attempts: Vec::new(),
            });
        }

        self.sink
            .emit(Event::StageStarted {
                run_id: run_id.to_string(),
                stage_id: stage_id.to_string(),
            })
            .await;

        let mut attempts = Vec::new();
        let exec = self.execution_loop();
        match exec.run_with_retry(stage, &ctx, cancel, &mut attempts).await {
            Ok(output) => {
                // The verdict arrives with a later acceptance check.
                self.breaker.release_probe(stage_id).await;
                self.checkpoints
                    .save_staged_output(&key, &output.to_output_ref())
                    .await?;
                tracing::info!(%stage_id, %candidate_id, "stage output staged for acceptance");
                Ok(StepOutcome::Staged { output, attempts })
            }
            Err(LoopError::Cancelled) => {
                self.breaker.release_probe(stage_id).await;
                Ok(StepOutcome::Cancelled)
            }
            Err(LoopError::Exhausted { last_error, .. }) => {
                let error = RunError::ExecutionFailed {
                    stage: stage_id.to_string(),
                    attempts: attempts.len() as u32,
                    message: last_error.to_string(),
                };
                self.checkpoints.clear_staged_output(&key).await?;
                self.fail_stage(stage, &key, &error, true).await?;
                Ok(StepOutcome::Failed { error, attempts })
            }
        }
    }

    /// Evaluate acceptance over the staged output. Accepted output becomes a
    /// succeeded checkpoint; an unmet check leaves the stage open for
    /// another `execute_stage`.
    pub async fn check_acceptance(
        &self,
        stage_id: &str,
        run_id: &str,
        candidate_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AcceptanceOutcome, OrchestratorError> {
        let stage = self.stage(stage_id)?;
        let key = CheckpointKey::new(run_id, candidate_id, stage_id);

        if self.checkpoints.is_completed(&key).await? {
            return Ok(AcceptanceOutcome::AlreadyCompleted);
        }
        let Some(staged) = self.checkpoints.load_staged_output(&key).await? else {
            return Ok(AcceptanceOutcome::NothingStaged);
        };
        let output = StageOutput::from_output_ref(&staged.output_ref)
            .map_err(|e| StoreError::Corrupt(format!("staged output of {key}: {e}")))?;

        match judge(stage, &output, cancel).await {
            Some(true) => {}
            Some(false) => {
                tracing::info!(%stage_id, %candidate_id, "staged output not accepted");
                return Ok(AcceptanceOutcome::Unmet);
            }
            None => return Ok(AcceptanceOutcome::Cancelled),
        }
        self.stage_succeeded(stage, &key, &output, 1).await?;
        self.checkpoints.clear_staged_output(&key).await?;
        Ok(AcceptanceOutcome::Accepted)
    }

    /// Give up on a stage whose acceptance retries are spent across
    /// separate `execute_stage`/`check_acceptance` invocations.
    pub async fn abandon_stage(
        &self,
        stage_id: &str,
        run_id: &str,
        candidate_id: &str,
        tries: u32,
    ) -> Result<RunError, OrchestratorError> {
        let stage = self.stage(stage_id)?;
        let key = CheckpointKey::new(run_id, candidate_id, stage_id);
        let error = RunError::AcceptanceUnmet {
            stage: stage_id.to_string(),
            attempts: tries,
        };
        self.checkpoints.clear_staged_output(&key).await?;
        self.fail_stage(stage, &key, &error, true).await?;
        Ok(error)
    }
}
