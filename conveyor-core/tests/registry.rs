use std::time::Duration;

use conveyor_core::{
    build_plan, CancellationToken, ConfigurationError, FnStage, RunContext, StageBody,
    StageDefinition, StageError, StageOutput, StageRegistry,
};

fn stage(id: &str, order: i64) -> StageDefinition {
    StageDefinition::new(id)
        .order(order)
        .body(FnStage::new(|_: &RunContext| Ok(StageOutput::empty())))
}

#[test]
fn plan_sorts_by_order_and_keeps_registration_order_on_ties() {
    let mut a = StageRegistry::new();
    for (id, order) in [("voice", 30), ("idea", 10), ("script", 20), ("image", 30)] {
        a.register(stage(id, order)).unwrap();
    }
    assert_eq!(a.execution_plan(), vec!["idea", "script", "voice", "image"]);

    let mut b = StageRegistry::new();
    for (id, order) in [("script", 20), ("idea", 10), ("voice", 30), ("image", 30)] {
        b.register(stage(id, order)).unwrap();
    }
    assert_eq!(b.execution_plan(), a.execution_plan());
    assert_eq!(b.execution_plan(), b.execution_plan());
}

#[test]
fn disabled_stages_are_excluded_from_the_plan() {
    let mut reg = StageRegistry::new();
    reg.register(stage("a", 1)).unwrap();
    reg.register(stage("b", 2).enabled(false)).unwrap();
    reg.register(stage("c", 3)).unwrap();

    assert_eq!(reg.execution_plan(), vec!["a", "c"]);
    let plan = build_plan(&reg);
    assert_eq!(plan.stage_ids(), vec!["a", "c"]);
    assert_eq!(plan.disabled, vec!["b".to_string()]);
    assert_eq!(reg.predecessors("c"), vec!["a".to_string()]);
}

#[test]
fn duplicate_id_is_rejected() {
    let mut reg = StageRegistry::new();
    reg.register(stage("idea", 1)).unwrap();
    let err = reg.register(stage("idea", 2)).unwrap_err();
    assert!(matches!(err, ConfigurationError::DuplicateStageId(id) if id == "idea"));
    assert_eq!(reg.len(), 1);
}

#[test]
fn empty_id_is_rejected() {
    let mut reg = StageRegistry::new();
    let err = reg.register(stage("  ", 1)).unwrap_err();
    assert!(matches!(err, ConfigurationError::EmptyStageId));
}

#[test]
fn missing_execute_is_rejected() {
    let mut reg = StageRegistry::new();
    let err = reg.register(StageDefinition::new("idea")).unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingExecute(id) if id == "idea"));
    assert!(reg.is_empty());
}

#[test]
fn ids_outside_the_allowed_charset_are_rejected() {
    let mut reg = StageRegistry::new();
    let err = reg.register(stage("bad id", 1)).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidStageId(_)));
}

#[test]
fn plan_text_lists_budgets_and_flags() {
    let mut reg = StageRegistry::new();
    reg.register(
        stage("script", 20)
            .max_execution_retries(2)
            .max_acceptance_retries(1)
            .retry_delay(Duration::from_millis(250))
            .continue_on_error(true)
            .condition(|_| true),
    )
    .unwrap();

    let text = build_plan(&reg).to_text();
    assert!(text.contains("script (order 20)"));
    assert!(text.contains("exec-retries=2 accept-retries=1 delay=250ms"));
    assert!(text.contains("continue-on-error"));
    assert!(text.contains("conditional"));
}

#[test]
fn accept_override_wins_over_body() {
    let def = stage("qc", 1).accept(|out| out.value().as_bool() == Some(true));
    assert!(def.accepts(&StageOutput::new(serde_json::json!(true))));
    assert!(!def.accepts(&StageOutput::new(serde_json::json!(false))));
    assert!(stage("plain", 1).accepts(&StageOutput::empty()));
}

struct Reviewed;

#[async_trait::async_trait]
impl StageBody for Reviewed {
    async fn execute(
        &self,
        _ctx: &RunContext,
        _cancel: &CancellationToken,
    ) -> Result<StageOutput, StageError> {
        Ok(StageOutput::empty())
    }

    fn accept(&self, output: &StageOutput) -> bool {
        output.value().is_object()
    }

    async fn verify(
        &self,
        output: &StageOutput,
        cancel: &CancellationToken,
    ) -> Result<bool, StageError> {
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        Ok(output.pointer("/approved") == Some(&serde_json::json!(true)))
    }
}

#[tokio::test]
async fn verify_output_runs_the_body_check_after_the_predicate() {
    let def = StageDefinition::new("review").body(Reviewed);
    let cancel = CancellationToken::new();
    let approved = StageOutput::new(serde_json::json!({"approved": true}));
    let pending = StageOutput::new(serde_json::json!({"approved": false}));

    assert!(def.verify_output(&approved, &cancel).await.unwrap());
    assert!(!def.verify_output(&pending, &cancel).await.unwrap());
    assert!(!def
        .verify_output(&StageOutput::new(serde_json::json!(1)), &cancel)
        .await
        .unwrap());

    // An override replaces the body's checks entirely.
    let overridden = StageDefinition::new("review").body(Reviewed).accept(|_| true);
    assert!(overridden.verify_output(&pending, &cancel).await.unwrap());

    cancel.cancel();
    assert!(matches!(
        def.verify_output(&approved, &cancel).await,
        Err(StageError::Cancelled)
    ));
}
