use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use conveyor_core::RunResult;
use conveyor_exec::executor::{
    CompositeEventSink, MetricsCollector, MetricsEventSink, StdoutEventSink, TracingEventSink,
};
use conveyor_exec::RunOptions;

use super::config::{
    build_orchestrator, connect_store, load_pipeline, orchestrator_exit_code, run_error_exit_code,
};
use crate::exit_codes;
use crate::output::{print_error, print_result};
use crate::{OutputArgs, PipelineArgs, StoreArgs, TargetArgs};

#[derive(Serialize)]
struct RunReport {
    #[serde(flatten)]
    result: RunResult,
    metrics: serde_json::Value,
}

pub async fn run_cmd(
    target: TargetArgs,
    resume: bool,
    events: bool,
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

    let mut sinks = CompositeEventSink::new().with(Arc::new(TracingEventSink));
    if events {
        sinks.add(Arc::new(StdoutEventSink));
    }
    let collector = Arc::new(MetricsCollector::new());
    let orchestrator = build_orchestrator(&pipeline, &handle).with_event_sink(Arc::new(
        MetricsEventSink::new(collector.clone(), Arc::new(sinks)),
    ));

    let opts = RunOptions {
        run_id: target.run_id,
        candidate_id: target.candidate_id,
        resume,
    };
    let result = match orchestrator.run(opts, cancel).await {
        Ok(r) => r,
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return orchestrator_exit_code(&e);
        }
    };

    let code = match &result.error {
        None => exit_codes::SUCCESS,
        Some(e) => run_error_exit_code(e),
    };

    if output.text() {
        print_text(&result);
    } else {
        let report = RunReport {
            metrics: collector.get_metrics().await.to_json(),
            result,
        };
        print_result(output.format, output.quiet, &report);
    }
    code
}

fn print_text(result: &RunResult) {
    println!("Run: {}", result.run_id);
    println!("Candidate: {}", result.candidate_id);
    println!("State: {}", result.state.as_str());
    println!("Executed: {}", list(&result.executed_stages));
    println!("Skipped: {}", list(&result.skipped_stages));
    if !result.resumed_stages.is_empty() {
        println!("Resumed: {}", list(&result.resumed_stages));
    }
    if !result.failed_stages.is_empty() {
        println!("Failed: {}", list(&result.failed_stages));
    }
    println!("Attempts: {}", result.attempts.len());
    println!("Duration: {}ms", result.total_duration_ms);
    for failure in &result.failures {
        eprintln!("error: {failure}");
    }
}

fn list(ids: &[String]) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.join(", ")
    }
}
