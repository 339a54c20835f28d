use std::collections::HashMap;

use crate::error::ConfigurationError;
use crate::types::StageDefinition;
use crate::validate::is_valid_id;

/// Holds stage definitions in registration order.
///
/// Registration must finish before any run starts; the orchestrator takes the
/// registry by value (behind an `Arc`) and never mutates it.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: Vec<StageDefinition>,
    index: HashMap<String, usize>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stage: StageDefinition) -> Result<(), ConfigurationError> {
        if stage.id.trim().is_empty() {
            return Err(ConfigurationError::EmptyStageId);
        }
        if !is_valid_id(&stage.id) {
            return Err(ConfigurationError::InvalidStageId(stage.id));
        }
        if stage.body.is_none() {
            return Err(ConfigurationError::MissingExecute(stage.id));
        }
        if self.index.contains_key(&stage.id) {
            return Err(ConfigurationError::DuplicateStageId(stage.id));
        }
        self.index.insert(stage.id.clone(), self.stages.len());
        self.stages.push(stage);
        Ok(())
    }

    pub fn get(&self, stage_id: &str) -> Option<&StageDefinition> {
        self.index.get(stage_id).map(|&i| &self.stages[i])
    }

    /// All stages, in registration order.
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Enabled stages sorted by `order`; ties keep registration order.
    pub fn planned_stages(&self) -> Vec<&StageDefinition> {
        let mut planned: Vec<&StageDefinition> = self.stages.iter().filter(|s| s.enabled).collect();
        planned.sort_by_key(|s| s.order);
        planned
    }

    pub fn execution_plan(&self) -> Vec<String> {
        self.planned_stages()
            .into_iter()
            .map(|s| s.id.clone())
            .collect()
    }

    /// Enabled stages that come before `stage_id` in the plan.
    pub fn predecessors(&self, stage_id: &str) -> Vec<String> {
        self.execution_plan()
            .into_iter()
            .take_while(|id| id != stage_id)
            .collect()
    }
}
