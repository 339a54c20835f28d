#![forbid(unsafe_code)]

pub mod document;
pub mod error;
pub mod expressions;
pub mod parser;
pub mod planner;
pub mod registry;
pub mod types;
pub mod validate;

pub use crate::document::{
    AcceptSpec, BreakerSpec, CandidateSource, PipelineDefaults, PipelineDocument, StageSpec,
};
pub use crate::error::{
    ConfigurationError, ContextError, ParseError, StageError, ValidationError, Violation,
};
pub use crate::expressions::{parse_condition, Condition, ExpressionError, ExpressionScopeKind};
pub use crate::parser::{parse_document_str, DocumentFormat, ParsedDocument};
pub use crate::planner::{build_plan, Plan, PlanStage};
pub use crate::registry::StageRegistry;
pub use crate::types::{
    AcceptFn, AttemptOutcome, ConditionFn, ExecutionAttempt, FnStage, RunContext, RunError,
    RunResult, RunState, StageBody, StageDefinition, StageOutput,
};
pub use crate::validate::{validate_document, Validate};

pub use tokio_util::sync::CancellationToken;
