use serde::Serialize;

use conveyor_store::{BreakerRecord, BreakerStore};

use super::config::connect_store;
use crate::exit_codes;
use crate::output::{print_error, print_result};
use crate::{OutputArgs, StoreArgs};

#[derive(Serialize)]
struct ResetResult {
    stage_id: String,
    existed: bool,
}

pub async fn show_cmd(stage_id: Option<&str>, store: StoreArgs, output: OutputArgs) -> i32 {
    let handle = match connect_store(&store, &output).await {
        Ok(h) => h,
        Err(code) => return code,
    };
    let breakers = handle.breakers();

    let records = match stage_id {
        Some(id) => breakers
            .load_breaker(id)
            .await
            .map(|r| vec![r.unwrap_or_else(|| BreakerRecord::closed(id))]),
        None => breakers.list_breakers().await,
    };
    let records = match records {
        Ok(r) => r,
        Err(e) => {
            print_error(output.format, output.quiet, &format!("failed to load breakers: {e}"));
            return exit_codes::RUNTIME_ERROR;
        }
    };

    if output.text() {
        if records.is_empty() {
            println!("no breaker state recorded");
        }
        for r in &records {
            print!(
                "{} {} failures={}",
                r.stage_id,
                r.state.as_str(),
                r.consecutive_failures
            );
            if let Some(at) = r.opened_at {
                print!(" opened_at={}", at.to_rfc3339());
            }
            println!();
        }
    } else {
        print_result(output.format, output.quiet, &records);
    }
    exit_codes::SUCCESS
}

pub async fn reset_cmd(stage_id: &str, store: StoreArgs, output: OutputArgs) -> i32 {
    let handle = match connect_store(&store, &output).await {
        Ok(h) => h,
        Err(code) => return code,
    };

    match handle.breakers().delete_breaker(stage_id).await {
        Ok(existed) => {
            tracing::info!(%stage_id, existed, "circuit breaker reset");
            if output.text() {
                println!("ok: breaker for `{stage_id}` reset");
            } else {
                print_result(
                    output.format,
                    output.quiet,
                    &ResetResult {
                        stage_id: stage_id.to_string(),
                        existed,
                    },
                );
            }
            exit_codes::SUCCESS
        }
        Err(e) => {
            print_error(output.format, output.quiet, &format!("failed to reset breaker: {e}"));
            exit_codes::RUNTIME_ERROR
        }
    }
}
