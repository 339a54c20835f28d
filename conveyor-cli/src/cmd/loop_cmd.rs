use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use conveyor_core::RunError;
use conveyor_exec::{AcceptanceOutcome, StepOutcome};

use super::config::{
    build_orchestrator, connect_store, load_pipeline, orchestrator_exit_code, run_error_exit_code,
    run_id_for,
};
use crate::exit_codes;
use crate::output::{print_error, print_summary, Summary};
use crate::{OutputArgs, PipelineArgs, StoreArgs, TargetArgs};

#[derive(Serialize)]
struct LoopResult {
    stage_id: String,
    candidate_id: String,
    run_id: String,
    tries: u32,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RunError>,
}

#[allow(clippy::too_many_arguments)]
pub async fn loop_cmd(
    stage_id: &str,
    max_tries: u32,
    sleep_seconds: u64,
    target: TargetArgs,
    pipeline: PipelineArgs,
    store: StoreArgs,
    output: OutputArgs,
    cancel: &CancellationToken,
) -> i32 {
    if max_tries == 0 {
        print_error(output.format, output.quiet, "--max-tries must be at least 1");
        return exit_codes::USAGE_ERROR;
    }
    let pipeline = match load_pipeline(&pipeline, &output) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let handle = match connect_store(&store, &output).await {
        Ok(h) => h,
        Err(code) => return code,
    };
    let orchestrator = build_orchestrator(&pipeline, &handle);

    let candidate_id = match &target.candidate_id {
        Some(c) => c.clone(),
        None => match orchestrator.pick_candidate(stage_id).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                print_error(
                    output.format,
                    output.quiet,
                    &format!("no candidate available for stage `{stage_id}`"),
                );
                return exit_codes::USAGE_ERROR;
            }
            Err(e) => {
                print_error(output.format, output.quiet, &e.to_string());
                return orchestrator_exit_code(&e);
            }
        },
    };
    let run_id = run_id_for(&target, &candidate_id);
    let mut result = LoopResult {
        stage_id: stage_id.to_string(),
        candidate_id: candidate_id.clone(),
        run_id: run_id.clone(),
        tries: 0,
        accepted: false,
        error: None,
    };

    for attempt in 1..=max_tries {
        result.tries = attempt;
        let outcome = match orchestrator
            .execute_stage(stage_id, &run_id, &candidate_id, cancel)
            .await
        {
            Ok(o) => o,
            Err(e) => {
                print_error(output.format, output.quiet, &e.to_string());
                return orchestrator_exit_code(&e);
            }
        };
        match outcome {
            StepOutcome::AlreadyCompleted | StepOutcome::Skipped => {
                result.accepted = true;
                return finish(&result, &output, exit_codes::SUCCESS);
            }
            StepOutcome::Failed { error, .. } => {
                let code = run_error_exit_code(&error);
                result.error = Some(error);
                return finish(&result, &output, code);
            }
            StepOutcome::Cancelled => {
                result.error = Some(RunError::Cancelled {
                    stage: Some(stage_id.to_string()),
                });
                return finish(&result, &output, exit_codes::RUNTIME_ERROR);
            }
            StepOutcome::Staged { .. } => {}
        }

        match orchestrator
            .check_acceptance(stage_id, &run_id, &candidate_id, cancel)
            .await
        {
            Ok(AcceptanceOutcome::Accepted) | Ok(AcceptanceOutcome::AlreadyCompleted) => {
                result.accepted = true;
                return finish(&result, &output, exit_codes::SUCCESS);
            }
            Ok(AcceptanceOutcome::Unmet) | Ok(AcceptanceOutcome::NothingStaged) => {
                tracing::info!(%stage_id, %candidate_id, attempt, max_tries, "acceptance not met");
            }
            Ok(AcceptanceOutcome::Cancelled) => {
                result.error = Some(RunError::Cancelled {
                    stage: Some(stage_id.to_string()),
                });
                return finish(&result, &output, exit_codes::RUNTIME_ERROR);
            }
            Err(e) => {
                print_error(output.format, output.quiet, &e.to_string());
                return orchestrator_exit_code(&e);
            }
        }

        if attempt < max_tries && sleep_seconds > 0 {
            tokio::select! {
                _ = cancel.cancelled() => {
                    result.error = Some(RunError::Cancelled { stage: Some(stage_id.to_string()) });
                    return finish(&result, &output, exit_codes::RUNTIME_ERROR);
                }
                _ = tokio::time::sleep(Duration::from_secs(sleep_seconds)) => {}
            }
        }
    }

    match orchestrator
        .abandon_stage(stage_id, &run_id, &candidate_id, max_tries)
        .await
    {
        Ok(error) => {
            result.error = Some(error);
            finish(&result, &output, exit_codes::ACCEPTANCE_UNMET)
        }
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            orchestrator_exit_code(&e)
        }
    }
}

impl Summary for LoopResult {
    fn summary(&self) -> Result<String, String> {
        match &self.error {
            Some(e) => Err(e.to_string()),
            None => Ok(format!(
                "{}: accepted after {} tr{} ({})",
                self.stage_id,
                self.tries,
                if self.tries == 1 { "y" } else { "ies" },
                self.candidate_id
            )),
        }
    }
}

fn finish(result: &LoopResult, output: &OutputArgs, code: i32) -> i32 {
    print_summary(output.format, output.quiet, result);
    code
}
