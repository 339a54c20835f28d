#![forbid(unsafe_code)]

//! Runtime for conveyor pipelines: ordered stage execution with execution
//! and acceptance retries, circuit breaking, checkpointed resume and
//! lifecycle events.

pub mod breaker;
pub mod executor;
pub mod pipeline;
pub mod retry;
pub mod selector;
pub mod stages;

pub use crate::breaker::{BreakerConfig, BreakerTransition, CircuitBreaker};
pub use crate::executor::{
    AcceptanceGate, AcceptanceOutcome, Event, EventSink, ExecutionLoop, Orchestrator,
    OrchestratorConfig, OrchestratorError, RunOptions, StepOutcome,
};
pub use crate::pipeline::{breaker_config, build_registry};
pub use crate::selector::{CandidateSelector, SelectorError, StoreBackedSelector};
pub use crate::stages::CommandStage;
