use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::error::ContextError;
use crate::types::StageOutput;

/// Per-run state handed to every stage body.
///
/// Outputs are append-oriented and keyed by the producing stage id; iteration
/// follows insertion order. A context belongs to exactly one run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunContext {
    run_id: String,
    candidate_id: String,
    created_at: DateTime<Utc>,
    outputs: Vec<(String, StageOutput)>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, candidate_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            candidate_id: candidate_id.into(),
            created_at: Utc::now(),
            outputs: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn output(&self, stage_id: &str) -> Option<&StageOutput> {
        self.outputs
            .iter()
            .find(|(k, _)| k == stage_id)
            .map(|(_, v)| v)
    }

    pub fn has_output(&self, stage_id: &str) -> bool {
        self.output(stage_id).is_some()
    }

    /// Decode a stage's output into a concrete type.
    pub fn get<T: DeserializeOwned>(&self, stage_id: &str) -> Result<Option<T>, ContextError> {
        let Some(output) = self.output(stage_id) else {
            return Ok(None);
        };
        serde_json::from_value(output.value().clone())
            .map(Some)
            .map_err(|source| ContextError::Decode {
                stage: stage_id.to_string(),
                source,
            })
    }

    /// Store a stage's output. A re-run stage replaces its earlier entry in place.
    pub fn insert_output(&mut self, stage_id: impl Into<String>, output: StageOutput) {
        let stage_id = stage_id.into();
        match self.outputs.iter_mut().find(|(k, _)| *k == stage_id) {
            Some((_, slot)) => *slot = output,
            None => self.outputs.push((stage_id, output)),
        }
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(k, _)| k.as_str())
    }

    /// All outputs as one JSON object, in insertion order.
    pub fn outputs_json(&self) -> serde_json::Value {
        let map = self
            .outputs
            .iter()
            .map(|(k, v)| (k.clone(), v.value().clone()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}
