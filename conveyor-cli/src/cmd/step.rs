use serde::Serialize;
use tokio_util::sync::CancellationToken;

use conveyor_core::{ExecutionAttempt, RunError};
use conveyor_exec::{AcceptanceOutcome, Orchestrator, StepOutcome};

use super::config::{
    build_orchestrator, connect_store, load_pipeline, orchestrator_exit_code, run_error_exit_code,
    run_id_for,
};
use crate::commands::StepAction;
use crate::exit_codes;
use crate::output::{print_error, print_summary, Summary};
use crate::{OutputArgs, PipelineArgs, StoreArgs, TargetArgs};

#[derive(Serialize)]
struct StepResult {
    stage_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attempts: Vec<ExecutionAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RunError>,
}

impl Summary for StepResult {
    fn summary(&self) -> Result<String, String> {
        if let Some(e) = &self.error {
            return Err(e.to_string());
        }
        let candidate = self.candidate_id.as_deref().unwrap_or("-");
        if self.outcome == "picked" {
            return Ok(candidate.to_string());
        }
        Ok(format!(
            "{}: {} ({candidate})",
            self.stage_id,
            self.outcome.replace('_', " ")
        ))
    }
}

impl StepResult {
    fn new(stage_id: &str, outcome: &'static str) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            candidate_id: None,
            run_id: None,
            outcome,
            output: None,
            attempts: Vec::new(),
            error: None,
        }
    }
}

pub async fn step_cmd(
    action: StepAction,
    stage_id: &str,
    target: TargetArgs,
    pipeline: PipelineArgs,
    store: StoreArgs,
    output: OutputArgs,
    cancel: &CancellationToken,
) -> i32 {
    let pipeline = match load_pipeline(&pipeline, &output) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let handle = match connect_store(&store, &output).await {
        Ok(h) => h,
        Err(code) => return code,
    };
    let orchestrator = build_orchestrator(&pipeline, &handle);

    match action {
        StepAction::PickOne => pick_one(&orchestrator, stage_id, &output).await,
        StepAction::Run => run_stage(&orchestrator, stage_id, &target, &output, cancel).await,
        StepAction::CheckAcceptance => {
            check_acceptance(&orchestrator, stage_id, &target, &output, cancel).await
        }
    }
}

async fn pick_one(orchestrator: &Orchestrator, stage_id: &str, output: &OutputArgs) -> i32 {
    match orchestrator.pick_candidate(stage_id).await {
        Ok(Some(candidate)) => {
            let mut result = StepResult::new(stage_id, "picked");
            result.candidate_id = Some(candidate);
            report(&result, output);
            exit_codes::SUCCESS
        }
        Ok(None) => {
            print_error(
                output.format,
                output.quiet,
                &format!("no candidate available for stage `{stage_id}`"),
            );
            exit_codes::USAGE_ERROR
        }
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            orchestrator_exit_code(&e)
        }
    }
}

async fn run_stage(
    orchestrator: &Orchestrator,
    stage_id: &str,
    target: &TargetArgs,
    output: &OutputArgs,
    cancel: &CancellationToken,
) -> i32 {
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
    let run_id = run_id_for(target, &candidate_id);

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

    let (label, code) = match &outcome {
        StepOutcome::AlreadyCompleted => ("already_completed", exit_codes::SUCCESS),
        StepOutcome::Skipped => ("skipped", exit_codes::SUCCESS),
        StepOutcome::Staged { .. } => ("staged", exit_codes::SUCCESS),
        StepOutcome::Failed { error, .. } => ("failed", run_error_exit_code(error)),
        StepOutcome::Cancelled => ("cancelled", exit_codes::RUNTIME_ERROR),
    };
    let mut result = StepResult::new(stage_id, label);
    result.candidate_id = Some(candidate_id);
    result.run_id = Some(run_id);
    match outcome {
        StepOutcome::Staged { output: out, attempts } => {
            result.output = Some(out.into_value());
            result.attempts = attempts;
        }
        StepOutcome::Failed { error, attempts } => {
            result.error = Some(error);
            result.attempts = attempts;
        }
        _ => {}
    }

    report(&result, output);
    code
}

async fn check_acceptance(
    orchestrator: &Orchestrator,
    stage_id: &str,
    target: &TargetArgs,
    output: &OutputArgs,
    cancel: &CancellationToken,
) -> i32 {
    let Some(candidate_id) = target.candidate_id.clone() else {
        print_error(
            output.format,
            output.quiet,
            "check-acceptance needs --candidate-id",
        );
        return exit_codes::USAGE_ERROR;
    };
    let run_id = run_id_for(target, &candidate_id);

    let outcome = match orchestrator
        .check_acceptance(stage_id, &run_id, &candidate_id, cancel)
        .await
    {
        Ok(o) => o,
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return orchestrator_exit_code(&e);
        }
    };

    let (label, code) = match outcome {
        AcceptanceOutcome::Accepted => ("accepted", exit_codes::SUCCESS),
        AcceptanceOutcome::AlreadyCompleted => ("already_completed", exit_codes::SUCCESS),
        AcceptanceOutcome::Unmet => ("unmet", exit_codes::ACCEPTANCE_UNMET),
        AcceptanceOutcome::Cancelled => ("cancelled", exit_codes::RUNTIME_ERROR),
        AcceptanceOutcome::NothingStaged => {
            print_error(
                output.format,
                output.quiet,
                &format!("no staged output for stage `{stage_id}`; run it first"),
            );
            return exit_codes::USAGE_ERROR;
        }
    };
    let mut result = StepResult::new(stage_id, label);
    result.candidate_id = Some(candidate_id);
    result.run_id = Some(run_id);
    report(&result, output);
    code
}

fn report(result: &StepResult, output: &OutputArgs) {
    print_summary(output.format, output.quiet, result);
}
