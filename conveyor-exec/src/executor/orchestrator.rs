use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use conveyor_core::{
    build_plan, Plan, RunContext, RunError, RunResult, RunState, StageDefinition, StageOutput,
    StageRegistry,
};
use conveyor_store::{CheckpointKey, CheckpointStatus, CheckpointStore, StoreError};

use crate::breaker::CircuitBreaker;
use crate::executor::acceptance::{AcceptanceGate, GateError};
use crate::executor::events::{Event, EventSink, NoOpEventSink, SkipReason};
use crate::executor::execution_loop::{ExecutionLoop, LoopError};
use crate::executor::types::{OrchestratorConfig, OrchestratorError, RunOptions};
use crate::selector::CandidateSelector;

/// Walks the stage plan for one candidate per run.
///
/// Runs are independent; one orchestrator may serve several concurrently.
/// The breaker is shared across all of them.
pub struct Orchestrator {
    pub(crate) registry: Arc<StageRegistry>,
    pub(crate) checkpoints: Arc<dyn CheckpointStore>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) selector: Option<Arc<dyn CandidateSelector>>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) config: OrchestratorConfig,
}

enum StageVerdict {
    Continue,
    Abort,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<StageRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            breaker: Arc::new(CircuitBreaker::new(config.breaker)),
            registry,
            checkpoints,
            selector: None,
            sink: Arc::new(NoOpEventSink),
            config,
        }
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn CandidateSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn plan(&self) -> Plan {
        build_plan(&self.registry)
    }

    pub(crate) fn execution_loop(&self) -> ExecutionLoop {
        ExecutionLoop::new(self.sink.clone())
            .with_backoff(self.config.backoff)
            .skip_delays(self.config.skip_delays)
    }

    pub async fn run(
        &self,
        opts: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunResult, OrchestratorError> {
        let candidate_id = match opts.candidate_id.clone() {
            Some(c) => c,
            None => self.select_candidate().await?,
        };
        let run_id = opts
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = tracing::info_span!("run", %run_id, %candidate_id);
        self.run_inner(run_id, candidate_id, opts.resume, cancel)
            .instrument(span)
            .await
    }

    async fn select_candidate(&self) -> Result<String, OrchestratorError> {
        let selector = self.selector.as_ref().ok_or(OrchestratorError::NoCandidate)?;
        let first = self
            .registry
            .planned_stages()
            .first()
            .map(|s| s.id.clone())
            .ok_or(OrchestratorError::NoCandidate)?;
        selector
            .pick_one(&first)
            .await?
            .ok_or(OrchestratorError::NoCandidate)
    }

    async fn run_inner(
        &self,
        run_id: String,
        candidate_id: String,
        resume: bool,
        cancel: &CancellationToken,
    ) -> Result<RunResult, OrchestratorError> {
        let clock = Instant::now();
        let exec = self.execution_loop();
        let mut ctx = RunContext::new(&run_id, &candidate_id);
        let mut result = RunResult::new(&run_id, &candidate_id);
        result.state = RunState::InProgress;

        tracing::info!("run started");
        self.sink
            .emit(Event::RunStarted {
                run_id: run_id.clone(),
                candidate_id: candidate_id.clone(),
            })
            .await;

        let mut aborted = false;
        for stage in self.registry.planned_stages() {
            if cancel.is_cancelled() {
                result.error = Some(RunError::Cancelled { stage: None });
                aborted = true;
                break;
            }
            let key = CheckpointKey::new(&run_id, &candidate_id, &stage.id);

            if resume {
                if let Some(output) = self.completed_output(&key).await? {
                    tracing::debug!(stage_id = %stage.id, "resumed from checkpoint");
                    ctx.insert_output(&stage.id, output);
                    result.resumed_stages.push(stage.id.clone());
                    self.emit_skipped(&run_id, &stage.id, SkipReason::AlreadyCompleted)
                        .await;
                    continue;
                }
            }

            if !stage.should_run(&ctx) {
                self.checkpoints
                    .record(&key, CheckpointStatus::Skipped, None)
                    .await?;
                result.skipped_stages.push(stage.id.clone());
                self.emit_skipped(&run_id, &stage.id, SkipReason::ConditionFalse)
                    .await;
                continue;
            }

            if !self.breaker.should_attempt(&stage.id).await? {
                tracing::warn!(stage_id = %stage.id, "circuit open, not attempting stage");
                let error = RunError::CircuitOpen {
                    stage: stage.id.clone(),
                };
                match self.stage_failed(stage, &key, error, &mut result, false).await? {
                    StageVerdict::Continue => continue,
                    StageVerdict::Abort => {
                        aborted = true;
                        break;
                    }
                }
            }

            self.sink
                .emit(Event::StageStarted {
                    run_id: run_id.clone(),
                    stage_id: stage.id.clone(),
                })
                .await;

            let outcome = match exec
                .run_with_retry(stage, &ctx, cancel, &mut result.attempts)
                .await
            {
                Ok(output) => {
                    AcceptanceGate::new(&exec)
                        .check_with_retry(stage, output, &ctx, cancel, &mut result.attempts)
                        .await
                }
                Err(e) => Err(GateError::Execution(e)),
            };
            let attempts = result.attempts_for(&stage.id).count() as u32;

            let error = match outcome {
                Ok(output) => {
                    self.stage_succeeded(stage, &key, &output, attempts).await?;
                    ctx.insert_output(&stage.id, output);
                    result.executed_stages.push(stage.id.clone());
                    continue;
                }
                Err(GateError::Execution(LoopError::Cancelled)) => {
                    tracing::info!(stage_id = %stage.id, "run cancelled");
                    self.breaker.release_probe(&stage.id).await;
                    result.error = Some(RunError::Cancelled {
                        stage: Some(stage.id.clone()),
                    });
                    aborted = true;
                    break;
                }
                Err(GateError::Execution(LoopError::Exhausted { last_error, .. })) => {
                    RunError::ExecutionFailed {
                        stage: stage.id.clone(),
                        attempts,
                        message: last_error.to_string(),
                    }
                }
                Err(GateError::Unmet { .. }) => RunError::AcceptanceUnmet {
                    stage: stage.id.clone(),
                    attempts,
                },
            };
            if let StageVerdict::Abort = self.stage_failed(stage, &key, error, &mut result, true).await? {
                aborted = true;
                break;
            }
        }

        result.success = !aborted;
        result.state = if aborted {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        result.total_duration_ms = clock.elapsed().as_millis() as u64;

        tracing::info!(
            success = result.success,
            executed = result.executed_stages.len(),
            failed = result.failed_stages.len(),
            skipped = result.skipped_stages.len(),
            resumed = result.resumed_stages.len(),
            "run finished"
        );
        self.sink
            .emit(Event::RunFinished {
                run_id,
                candidate_id,
                state: result.state,
                success: result.success,
                duration_ms: result.total_duration_ms,
            })
            .await;
        Ok(result)
    }

    /// Output of a succeeded checkpoint, if one exists.
    pub(crate) async fn completed_output(
        &self,
        key: &CheckpointKey,
    ) -> Result<Option<StageOutput>, OrchestratorError> {
        let Some(cp) = self.checkpoints.get_checkpoint(key).await? else {
            return Ok(None);
        };
        if cp.status != CheckpointStatus::Succeeded {
            return Ok(None);
        }
        let output = match cp.output_ref.as_deref() {
            Some(raw) => StageOutput::from_output_ref(raw)
                .map_err(|e| StoreError::Corrupt(format!("output of {key}: {e}")))?,
            None => StageOutput::empty(),
        };
        Ok(Some(output))
    }

    pub(crate) async fn stage_succeeded(
        &self,
        stage: &StageDefinition,
        key: &CheckpointKey,
        output: &StageOutput,
        attempts: u32,
    ) -> Result<(), OrchestratorError> {
        self.record_breaker(&stage.id, true).await?;
        self.checkpoints
            .record(key, CheckpointStatus::Succeeded, Some(&output.to_output_ref()))
            .await?;
        tracing::info!(stage_id = %stage.id, attempts, "stage succeeded");
        self.sink
            .emit(Event::StageSucceeded {
                run_id: key.run_id.clone(),
                stage_id: stage.id.clone(),
                attempts,
            })
            .await;
        Ok(())
    }

    async fn stage_failed(
        &self,
        stage: &StageDefinition,
        key: &CheckpointKey,
        error: RunError,
        result: &mut RunResult,
        count_breaker_failure: bool,
    ) -> Result<StageVerdict, OrchestratorError> {
        self.fail_stage(stage, key, &error, count_breaker_failure).await?;
        result.failed_stages.push(stage.id.clone());
        result.failures.push(error.clone());
        if stage.continue_on_error {
            Ok(StageVerdict::Continue)
        } else {
            result.error = Some(error);
            Ok(StageVerdict::Abort)
        }
    }

    /// Breaker bookkeeping, failed checkpoint (when tolerated) and event for a
    /// terminal stage failure.
    pub(crate) async fn fail_stage(
        &self,
        stage: &StageDefinition,
        key: &CheckpointKey,
        error: &RunError,
        count_breaker_failure: bool,
    ) -> Result<(), OrchestratorError> {
        if count_breaker_failure {
            self.record_breaker(&stage.id, false).await?;
        }
        if stage.continue_on_error {
            self.checkpoints
                .record(key, CheckpointStatus::Failed, None)
                .await?;
        }
        tracing::warn!(stage_id = %stage.id, %error, "stage failed");
        self.sink
            .emit(Event::StageFailed {
                run_id: key.run_id.clone(),
                stage_id: stage.id.clone(),
                error: error.clone(),
            })
            .await;
        Ok(())
    }

    pub(crate) async fn record_breaker(
        &self,
        stage_id: &str,
        success: bool,
    ) -> Result<(), OrchestratorError> {
        if let Some(t) = self.breaker.record_result(stage_id, success).await? {
            self.sink
                .emit(Event::BreakerTransition {
                    stage_id: stage_id.to_string(),
                    from: t.from,
                    to: t.to,
                })
                .await;
        }
        Ok(())
    }

    pub(crate) async fn emit_skipped(&self, run_id: &str, stage_id: &str, reason: SkipReason) {
        self.sink
            .emit(Event::StageSkipped {
                run_id: run_id.to_string(),
                stage_id: stage_id.to_string(),
                reason,
            })
            .await;
    }
}
