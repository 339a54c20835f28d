mod model;

use crate::registry::StageRegistry;

pub use model::{Plan, PlanStage};

pub fn build_plan(registry: &StageRegistry) -> Plan {
    let stages = registry
        .planned_stages()
        .into_iter()
        .enumerate()
        .map(|(idx, s)| PlanStage {
            position: idx + 1,
            stage_id: s.id.clone(),
            name: s.name.clone(),
            order: s.order,
            max_execution_retries: s.max_execution_retries,
            max_acceptance_retries: s.max_acceptance_retries,
            retry_delay_ms: s.retry_delay.as_millis() as u64,
            continue_on_error: s.continue_on_error,
            conditional: s.condition.is_some(),
        })
        .collect();

    let disabled = registry
        .stages()
        .iter()
        .filter(|s| !s.enabled)
        .map(|s| s.id.clone())
        .collect();

    Plan { stages, disabled }
}
