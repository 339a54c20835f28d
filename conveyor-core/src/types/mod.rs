mod attempt;
mod context;
mod output;
mod result;
mod stage;

pub use attempt::{AttemptOutcome, ExecutionAttempt};
pub use context::RunContext;
pub use output::StageOutput;
pub use result::{RunError, RunResult, RunState};
pub use stage::{AcceptFn, ConditionFn, FnStage, StageBody, StageDefinition};
