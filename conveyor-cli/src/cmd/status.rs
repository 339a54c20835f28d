use serde::Serialize;

use conveyor_store::{Checkpoint, CheckpointStatus};

use super::config::connect_store;
use crate::exit_codes;
use crate::output::{print_error, print_result};
use crate::{OutputArgs, StoreArgs};

#[derive(Serialize)]
struct StatusResult {
    run_id: String,
    stages_succeeded: usize,
    stages_failed: usize,
    stages_skipped: usize,
    stages_pending: usize,
    checkpoints: Vec<Checkpoint>,
}

pub async fn status_cmd(run_id: &str, store: StoreArgs, output: OutputArgs) -> i32 {
    let handle = match connect_store(&store, &output).await {
        Ok(h) => h,
        Err(code) => return code,
    };

    let checkpoints = match handle.checkpoints().list_run_checkpoints(run_id).await {
        Ok(c) => c,
        Err(e) => {
            print_error(
                output.format,
                output.quiet,
                &format!("failed to list checkpoints: {e}"),
            );
            return exit_codes::RUNTIME_ERROR;
        }
    };
    if checkpoints.is_empty() {
        print_error(
            output.format,
            output.quiet,
            &format!("no checkpoints for run `{run_id}`"),
        );
        return exit_codes::USAGE_ERROR;
    }

    let count = |status: CheckpointStatus| checkpoints.iter().filter(|c| c.status == status).count();
    let result = StatusResult {
        run_id: run_id.to_string(),
        stages_succeeded: count(CheckpointStatus::Succeeded),
        stages_failed: count(CheckpointStatus::Failed),
        stages_skipped: count(CheckpointStatus::Skipped),
        stages_pending: count(CheckpointStatus::Pending) + count(CheckpointStatus::Running),
        checkpoints,
    };

    if output.text() {
        println!("Run: {}", result.run_id);
        println!();
        println!("Stages:");
        println!("  Succeeded: {}", result.stages_succeeded);
        println!("  Failed:    {}", result.stages_failed);
        println!("  Skipped:   {}", result.stages_skipped);
        println!("  Pending:   {}", result.stages_pending);
        println!();
        for cp in &result.checkpoints {
            println!(
                "  {} {} {} {}",
                cp.timestamp.to_rfc3339(),
                cp.candidate_id,
                cp.stage_id,
                cp.status.as_str()
            );
        }
    } else {
        print_result(output.format, output.quiet, &result);
    }
    exit_codes::SUCCESS
}
