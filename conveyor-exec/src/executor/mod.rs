mod acceptance;
pub mod events;
mod execution_loop;
pub mod metrics;
mod orchestrator;
mod step;
mod types;

pub use acceptance::{AcceptanceGate, GateError};
pub use events::{
    ChannelEventSink, CompositeEventSink, Event, EventSink, NoOpEventSink, RetryKind, SkipReason,
    StdoutEventSink, TracingEventSink,
};
pub use execution_loop::{Backoff, ExecutionLoop, LoopError};
pub use metrics::{MetricsCollector, MetricsEventSink, RunMetrics};
pub use orchestrator::Orchestrator;
pub use types::{AcceptanceOutcome, OrchestratorConfig, OrchestratorError, RunOptions, StepOutcome};
