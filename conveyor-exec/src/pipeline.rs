//! Turns a pipeline document into a stage registry of command stages.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use conveyor_core::{
    parse_condition, validate_document, Condition, ConfigurationError, ExpressionScopeKind,
    PipelineDocument, StageDefinition, StageRegistry, StageSpec,
};

use crate::breaker::BreakerConfig;
use crate::stages::{resolve_workdir, CommandStage};

/// Validate `doc` and register one command stage per entry. Relative
/// working directories resolve against `base_dir`.
pub fn build_registry(
    doc: &PipelineDocument,
    base_dir: &Path,
) -> Result<StageRegistry, ConfigurationError> {
    validate_document(doc)?;

    let mut registry = StageRegistry::new();
    for spec in &doc.stages {
        registry.register(stage_definition(doc, spec, base_dir)?)?;
    }
    Ok(registry)
}

pub fn breaker_config(doc: &PipelineDocument) -> BreakerConfig {
    BreakerConfig {
        failure_threshold: doc.breaker.failure_threshold,
        cooldown: Duration::from_secs(doc.breaker.cooldown_seconds),
    }
}

fn stage_definition(
    doc: &PipelineDocument,
    spec: &StageSpec,
    base_dir: &Path,
) -> Result<StageDefinition, ConfigurationError> {
    let defaults = &doc.defaults;

    let mut body = CommandStage::new(&spec.id, spec.run.clone()).env(spec.env.clone());
    body = body.workdir(match &spec.workdir {
        Some(dir) => resolve_workdir(base_dir, dir),
        None => base_dir.to_path_buf(),
    });
    if let Some(accept) = &spec.accept {
        body = body.criteria(compile(spec, &accept.criteria, ExpressionScopeKind::Acceptance)?);
        if let Some(cmd) = &accept.command {
            body = body.checker(cmd.clone());
        }
    }

    let mut def = StageDefinition::new(&spec.id)
        .name(spec.display_name())
        .order(spec.order)
        .enabled(spec.enabled)
        .max_execution_retries(spec.effective_max_execution_retries(defaults))
        .max_acceptance_retries(spec.effective_max_acceptance_retries(defaults))
        .retry_delay(Duration::from_millis(spec.effective_retry_delay_ms(defaults)))
        .continue_on_error(spec.effective_continue_on_error(defaults))
        .shared_body(Arc::new(body));

    let conditions = compile(spec, &spec.when, ExpressionScopeKind::Run)?;
    if !conditions.is_empty() {
        def = def.condition(move |ctx| conditions.iter().all(|c| c.evaluate_run(ctx)));
    }
    Ok(def)
}

fn compile(
    spec: &StageSpec,
    exprs: &[String],
    scope: ExpressionScopeKind,
) -> Result<Vec<Condition>, ConfigurationError> {
    exprs
        .iter()
        .map(|e| {
            parse_condition(e, scope).map_err(|err| ConfigurationError::Stage {
                stage: spec.id.clone(),
                message: format!("`{e}`: {err}"),
            })
        })
        .collect()
}
