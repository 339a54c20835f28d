//! Declarative pipeline documents (YAML or JSON).

use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDocument {
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub defaults: PipelineDefaults,

    #[serde(default)]
    pub breaker: BreakerSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<CandidateSource>,

    pub stages: Vec<StageSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDefaults {
    #[serde(default)]
    pub max_execution_retries: u32,
    #[serde(default)]
    pub max_acceptance_retries: u32,
    #[serde(default)]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            max_execution_retries: 0,
            max_acceptance_retries: 0,
            retry_delay_ms: 0,
            continue_on_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerSpec {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_seconds() -> u64 {
    600
}

impl Default for BreakerSpec {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

/// Where candidate ids come from when none is supplied to a run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Each sub-directory name is a candidate id.
    Directory(PathBuf),
    Ids(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub order: i64,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Command argv; the first element is the program.
    pub run: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Run conditions; all must hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<AcceptSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_acceptance_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
}

fn default_true() -> bool {
    true
}

impl StageSpec {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn effective_max_execution_retries(&self, defaults: &PipelineDefaults) -> u32 {
        self.max_execution_retries
            .unwrap_or(defaults.max_execution_retries)
    }

    pub fn effective_max_acceptance_retries(&self, defaults: &PipelineDefaults) -> u32 {
        self.max_acceptance_retries
            .unwrap_or(defaults.max_acceptance_retries)
    }

    pub fn effective_retry_delay_ms(&self, defaults: &PipelineDefaults) -> u64 {
        self.retry_delay_ms.unwrap_or(defaults.retry_delay_ms)
    }

    pub fn effective_continue_on_error(&self, defaults: &PipelineDefaults) -> bool {
        self.continue_on_error.unwrap_or(defaults.continue_on_error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptSpec {
    /// Expressions over `$output`; all must hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<String>,

    /// Checker command; receives the output JSON on stdin, exit 0 accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}
