use thiserror::Error;

/// A stage registration or pipeline document that can never run.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("stage id must not be empty")]
    EmptyStageId,
    #[error("stage id `{0}` must match ^[A-Za-z0-9_.\\-]+$")]
    InvalidStageId(String),
    #[error("stage `{0}` has no execute body")]
    MissingExecute(String),
    #[error("stage `{0}` is already registered")]
    DuplicateStageId(String),
    #[error("stage `{stage}`: {message}")]
    Stage { stage: String, message: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
#[error("pipeline document failed validation ({violations_len} violations)")]
pub struct ValidationError {
    pub violations: Vec<Violation>,
    violations_len: usize,
}

impl ValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        let violations_len = violations.len();
        Self {
            violations,
            violations_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Raised by a stage body. Every variant counts as an execution error and is
/// subject to the stage's execution retry budget.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),
    #[error("command exited with status {code:?}: {stderr}")]
    Command { code: Option<i32>, stderr: String },
    #[error("io error: {0}")]
    Io(String),
    #[error("stage body observed cancellation")]
    Cancelled,
}

impl StageError {
    pub fn msg(message: impl Into<String>) -> Self {
        StageError::Failed(message.into())
    }
}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self {
        StageError::Io(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("output of stage `{stage}` does not match the requested type: {source}")]
    Decode {
        stage: String,
        #[source]
        source: serde_json::Error,
    },
}
