use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use conveyor_core::{
    AttemptOutcome, CancellationToken, FnStage, RunContext, RunError, RunState, StageDefinition,
    StageError, StageOutput, StageRegistry,
};
use conveyor_exec::{
    BreakerConfig, CircuitBreaker, Orchestrator, OrchestratorConfig, OrchestratorError,
    RunOptions,
};
use conveyor_store::{BreakerState, CheckpointKey, CheckpointStatus, CheckpointStore, MemoryStore};

fn counting(
    calls: &Arc<AtomicU32>,
    fail_first: u32,
    output: serde_json::Value,
) -> FnStage<impl Fn(&RunContext) -> Result<StageOutput, StageError> + Send + Sync + 'static> {
    let calls = calls.clone();
    FnStage::new(move |_ctx: &RunContext| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= fail_first {
            Err(StageError::msg(format!("failure #{n}")))
        } else {
            Ok(StageOutput::new(output.clone()))
        }
    })
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        skip_delays: true,
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(registry: StageRegistry, store: &Arc<MemoryStore>) -> Orchestrator {
    Orchestrator::new(Arc::new(registry), store.clone(), config())
}

#[tokio::test]
async fn false_condition_skips_stage_and_run_succeeds() {
    let (a, b, c) = (
        Arc::new(AtomicU32::new(0)),
        Arc::new(AtomicU32::new(0)),
        Arc::new(AtomicU32::new(0)),
    );
    let mut reg = StageRegistry::new();
    reg.register(StageDefinition::new("C").order(30).body(counting(&c, 0, json!("c"))))
        .unwrap();
    reg.register(
        StageDefinition::new("B")
            .order(20)
            .condition(|_| false)
            .body(counting(&b, 0, json!("b"))),
    )
    .unwrap();
    reg.register(StageDefinition::new("A").order(10).body(counting(&a, 0, json!("a"))))
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let result = orchestrator(reg, &store)
        .run(RunOptions::candidate("story-1").run_id("r1"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.state, RunState::Completed);
    assert_eq!(result.executed_stages, vec!["A", "C"]);
    assert_eq!(result.skipped_stages, vec!["B"]);
    assert!(result.failed_stages.is_empty());
    assert!(result.error.is_none());
    assert_eq!(b.load(Ordering::SeqCst), 0);

    let skipped = store
        .get_checkpoint(&CheckpointKey::new("r1", "story-1", "B"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(skipped.status, CheckpointStatus::Skipped);
}

#[tokio::test]
async fn execution_retries_until_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut reg = StageRegistry::new();
    reg.register(
        StageDefinition::new("D")
            .max_execution_retries(2)
            .retry_delay(Duration::from_secs(30))
            .body(counting(&calls, 2, json!({"ok": true}))),
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let result = orchestrator(reg, &store)
        .run(RunOptions::candidate("c1"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.executed_stages, vec!["D"]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let outcomes: Vec<(u32, AttemptOutcome)> = result
        .attempts
        .iter()
        .map(|a| (a.attempt_no, a.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (1, AttemptOutcome::ExecutionError),
            (2, AttemptOutcome::ExecutionError),
            (3, AttemptOutcome::Success),
        ]
    );
    assert_eq!(result.attempts[0].error.as_deref(), Some("failure #1"));
}

#[tokio::test]
async fn always_failing_stage_runs_retries_plus_one_times() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut reg = StageRegistry::new();
    reg.register(
        StageDefinition::new("voice")
            .max_execution_retries(3)
            .body(counting(&calls, u32::MAX, json!(null))),
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let result = orchestrator(reg, &store)
        .run(RunOptions::candidate("c1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(!result.success);
    assert_eq!(result.state, RunState::Aborted);
    assert_eq!(result.failed_stages, vec!["voice"]);
    assert_eq!(
        result.error,
        Some(RunError::ExecutionFailed {
            stage: "voice".to_string(),
            attempts: 4,
            message: "failure #4".to_string(),
        })
    );
}

#[tokio::test]
async fn unmet_acceptance_re_executes_the_whole_stage() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut reg = StageRegistry::new();
    reg.register(
        StageDefinition::new("script")
            .max_acceptance_retries(2)
            .max_execution_retries(1)
            .accept(|_| false)
            .body(counting(&calls, 0, json!({"words": 10}))),
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let result = orchestrator(reg, &store)
        .run(RunOptions::candidate("c1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(!result.success);
    assert_eq!(
        result.error,
        Some(RunError::AcceptanceUnmet {
            stage: "script".to_string(),
            attempts: 3,
        })
    );
    assert!(result
        .attempts
        .iter()
        .all(|a| a.outcome == AttemptOutcome::AcceptanceUnmet));
}

#[tokio::test]
async fn acceptance_and_execution_budgets_are_independent() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();
    let mut reg = StageRegistry::new();
    // Fails on every odd call, so each execution needs one retry.
    reg.register(
        StageDefinition::new("image")
            .max_execution_retries(1)
            .max_acceptance_retries(1)
            .accept(|out| out.value() == &json!(4))
            .body(FnStage::new(move |_: &RunContext| {
                let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                if n % 2 == 1 {
                    Err(StageError::msg("flaky"))
                } else {
                    Ok(StageOutput::new(json!(n)))
                }
            })),
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let result = orchestrator(reg, &store)
        .run(RunOptions::candidate("c1"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let outcomes: Vec<AttemptOutcome> = result.attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            AttemptOutcome::ExecutionError,
            AttemptOutcome::AcceptanceUnmet,
            AttemptOutcome::ExecutionError,
            AttemptOutcome::Success,
        ]
    );
}

#[tokio::test]
async fn failure_aborts_without_continue_on_error() {
    let (a, b) = (Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0)));
    let mut reg = StageRegistry::new();
    reg.register(StageDefinition::new("a").order(1).body(counting(&a, u32::MAX, json!(1))))
        .unwrap();
    reg.register(StageDefinition::new("b").order(2).body(counting(&b, 0, json!(2))))
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let result = orchestrator(reg, &store)
        .run(RunOptions::candidate("c1").run_id("r1"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_stages, vec!["a"]);
    assert!(result.executed_stages.is_empty());
    assert_eq!(b.load(Ordering::SeqCst), 0);
    // Aborting stages leave no checkpoint.
    assert!(store
        .get_checkpoint(&CheckpointKey::new("r1", "c1", "a"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn continue_on_error_records_failure_and_proceeds() {
    let (a, b) = (Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0)));
    let mut reg = StageRegistry::new();
    reg.register(
        StageDefinition::new("a")
            .order(1)
            .continue_on_error(true)
            .body(counting(&a, u32::MAX, json!(1))),
    )
    .unwrap();
    reg.register(StageDefinition::new("b").order(2).body(counting(&b, 0, json!(2))))
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let result = orchestrator(reg, &store)
        .run(RunOptions::candidate("c1").run_id("r1"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.error.is_none());
    assert_eq!(result.failed_stages, vec!["a"]);
    assert_eq!(result.executed_stages, vec!["b"]);
    assert_eq!(result.failures.len(), 1);
    let cp = store
        .get_checkpoint(&CheckpointKey::new("r1", "c1", "a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cp.status, CheckpointStatus::Failed);
}

#[tokio::test]
async fn resume_runs_only_unfinished_stages() {
    let calls: Vec<Arc<AtomicU32>> = (0..3).map(|_| Arc::new(AtomicU32::new(0))).collect();
    let third_fails = Arc::new(AtomicBool::new(true));

    let mut reg = StageRegistry::new();
    reg.register(StageDefinition::new("idea").order(1).body(counting(&calls[0], 0, json!({"topic": "owls"}))))
        .unwrap();
    reg.register(StageDefinition::new("script").order(2).body(counting(&calls[1], 0, json!("text"))))
        .unwrap();
    let flag = third_fails.clone();
    let third = calls[2].clone();
    reg.register(
        StageDefinition::new("voice")
            .order(3)
            .body(FnStage::new(move |ctx: &RunContext| {
                third.fetch_add(1, Ordering::SeqCst);
                if flag.load(Ordering::SeqCst) {
                    return Err(StageError::msg("tts down"));
                }
                // Earlier outputs are visible after a resume.
                let topic = ctx
                    .output("idea")
                    .and_then(|o| o.pointer("/topic"))
                    .cloned()
                    .unwrap_or_default();
                Ok(StageOutput::new(json!({ "topic": topic })))
            })),
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(reg, &store);

    let first = orch
        .run(RunOptions::candidate("c1").run_id("r1"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!first.success);
    assert_eq!(first.executed_stages, vec!["idea", "script"]);

    third_fails.store(false, Ordering::SeqCst);
    let second = orch
        .run(RunOptions::candidate("c1").run_id("r1"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(second.success);
    assert_eq!(second.resumed_stages, vec!["idea", "script"]);
    assert_eq!(second.executed_stages, vec!["voice"]);
    assert_eq!(calls[0].load(Ordering::SeqCst), 1);
    assert_eq!(calls[1].load(Ordering::SeqCst), 1);
    assert_eq!(calls[2].load(Ordering::SeqCst), 2);

    let voice = store
        .get_checkpoint(&CheckpointKey::new("r1", "c1", "voice"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(voice.output_ref.as_deref(), Some(r#"{"topic":"owls"}"#));
}

#[tokio::test]
async fn resume_disabled_re_executes_everything() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut reg = StageRegistry::new();
    reg.register(StageDefinition::new("idea").body(counting(&calls, 0, json!(1))))
        .unwrap();
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(reg, &store);

    for _ in 0..2 {
        let result = orch
            .run(
                RunOptions::candidate("c1").run_id("r1").resume(false),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.executed_stages, vec!["idea"]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn open_breaker_skips_stage_until_cooldown() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut reg = StageRegistry::new();
    reg.register(StageDefinition::new("video").body(counting(&calls, u32::MAX, json!(null))))
        .unwrap();

    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_threshold: 2,
        cooldown: Duration::from_secs(600),
    }));
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(reg, &store).with_breaker(breaker.clone());

    for _ in 0..2 {
        let r = orch
            .run(RunOptions::candidate("c1"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(r.error, Some(RunError::ExecutionFailed { .. })));
    }
    assert_eq!(breaker.snapshot("video").await.unwrap().state, BreakerState::Open);

    let blocked = orch
        .run(RunOptions::candidate("c2"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        blocked.error,
        Some(RunError::CircuitOpen {
            stage: "video".to_string()
        })
    );
    assert_eq!(blocked.failed_stages, vec!["video"]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // Short-circuited runs do not count as failures.
    assert_eq!(breaker.snapshot("video").await.unwrap().consecutive_failures, 2);

    let later = chrono::Utc::now() + chrono::TimeDelta::seconds(601);
    assert!(breaker.should_attempt_at("video", later).await.unwrap());
    assert!(!breaker.should_attempt_at("video", later).await.unwrap());
    breaker.record_result_at("video", true, later).await.unwrap();
    assert_eq!(breaker.snapshot("video").await.unwrap().state, BreakerState::Closed);
}

#[tokio::test]
async fn half_open_probe_runs_the_stage_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut reg = StageRegistry::new();
    reg.register(StageDefinition::new("qc").body(counting(&calls, 1, json!("ok"))))
        .unwrap();

    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_threshold: 1,
        cooldown: Duration::ZERO,
    }));
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(reg, &store).with_breaker(breaker.clone());

    let first = orch
        .run(RunOptions::candidate("c1"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!first.success);
    assert_eq!(breaker.snapshot("qc").await.unwrap().state, BreakerState::Open);

    let probe = orch
        .run(RunOptions::candidate("c1"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(probe.success);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(breaker.snapshot("qc").await.unwrap().state, BreakerState::Closed);
}

#[tokio::test]
async fn cancelled_probe_does_not_lock_out_the_stage() {
    let probe_cancel = CancellationToken::new();
    let trigger = probe_cancel.clone();
    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();

    let mut reg = StageRegistry::new();
    reg.register(StageDefinition::new("upload").body(FnStage::new(
        move |_: &RunContext| match seen.fetch_add(1, Ordering::SeqCst) + 1 {
            1 => Err(StageError::msg("upstream timeout")),
            2 => {
                trigger.cancel();
                Err(StageError::msg("interrupted"))
            }
            _ => Ok(StageOutput::new(json!("published"))),
        },
    )))
    .unwrap();

    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_threshold: 1,
        cooldown: Duration::ZERO,
    }));
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(reg, &store).with_breaker(breaker.clone());

    let first = orch
        .run(RunOptions::candidate("c1"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!first.success);
    assert_eq!(breaker.snapshot("upload").await.unwrap().state, BreakerState::Open);

    let probe = orch.run(RunOptions::candidate("c1"), &probe_cancel).await.unwrap();
    assert_eq!(
        probe.error,
        Some(RunError::Cancelled {
            stage: Some("upload".to_string())
        })
    );
    assert_eq!(breaker.snapshot("upload").await.unwrap().state, BreakerState::HalfOpen);

    let retry = orch
        .run(RunOptions::candidate("c1"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(retry.success, "{:?}", retry.error);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.snapshot("upload").await.unwrap().state, BreakerState::Closed);
}

#[tokio::test]
async fn cancelled_token_aborts_before_any_stage() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut reg = StageRegistry::new();
    reg.register(StageDefinition::new("idea").body(counting(&calls, 0, json!(1))))
        .unwrap();
    let store = Arc::new(MemoryStore::new());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = orchestrator(reg, &store)
        .run(RunOptions::candidate("c1"), &cancel)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.state, RunState::Aborted);
    assert_eq!(result.error, Some(RunError::Cancelled { stage: None }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_seen_by_a_failing_attempt_stops_the_stage() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();

    let mut reg = StageRegistry::new();
    reg.register(
        StageDefinition::new("render")
            .max_execution_retries(5)
            .retry_delay(Duration::from_secs(3600))
            .body(FnStage::new(move |_: &RunContext| {
                seen.fetch_add(1, Ordering::SeqCst);
                trigger.cancel();
                Err(StageError::msg("ffmpeg crashed"))
            })),
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let orch = Orchestrator::new(Arc::new(reg), store.clone(), OrchestratorConfig::default());
    let result = orch.run(RunOptions::candidate("c1"), &cancel).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        result.error,
        Some(RunError::Cancelled {
            stage: Some("render".to_string())
        })
    );
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::Cancelled);
    assert_eq!(orch.breaker().snapshot("render").await.unwrap().consecutive_failures, 0);
}

#[tokio::test]
async fn cancellation_during_retry_wait_stops_the_stage() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut reg = StageRegistry::new();
    reg.register(
        StageDefinition::new("render")
            .max_execution_retries(5)
            .retry_delay(Duration::from_secs(3600))
            .body(counting(&calls, u32::MAX, json!(null))),
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let orch = Orchestrator::new(Arc::new(reg), store.clone(), OrchestratorConfig::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = orch.run(RunOptions::candidate("c1"), &cancel).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        result.error,
        Some(RunError::Cancelled {
            stage: Some("render".to_string())
        })
    );
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::ExecutionError);
}

#[tokio::test]
async fn missing_candidate_without_selector_is_an_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut reg = StageRegistry::new();
    reg.register(StageDefinition::new("idea").body(counting(&calls, 0, json!(1))))
        .unwrap();
    let store = Arc::new(MemoryStore::new());

    let err = orchestrator(reg, &store)
        .run(RunOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NoCandidate));
}

#[tokio::test]
async fn generated_run_ids_are_unique() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut reg = StageRegistry::new();
    reg.register(StageDefinition::new("idea").body(counting(&calls, 0, json!(1))))
        .unwrap();
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(reg, &store);

    let a = orch.run(RunOptions::candidate("c1"), &CancellationToken::new()).await.unwrap();
    let b = orch.run(RunOptions::candidate("c1"), &CancellationToken::new()).await.unwrap();
    assert_ne!(a.run_id, b.run_id);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
