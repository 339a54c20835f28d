use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use conveyor_core::{RunError, RunState};
use conveyor_store::BreakerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryKind {
    Execution,
    Acceptance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ConditionFalse,
    AlreadyCompleted,
}

/// Lifecycle notifications emitted while a run progresses.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStarted {
        run_id: String,
        candidate_id: String,
    },
    RunFinished {
        run_id: String,
        candidate_id: String,
        state: RunState,
        success: bool,
        duration_ms: u64,
    },
    StageStarted {
        run_id: String,
        stage_id: String,
    },
    StageSucceeded {
        run_id: String,
        stage_id: String,
        attempts: u32,
    },
    StageFailed {
        run_id: String,
        stage_id: String,
        error: RunError,
    },
    StageSkipped {
        run_id: String,
        stage_id: String,
        reason: SkipReason,
    },
    AttemptStarted {
        run_id: String,
        stage_id: String,
        attempt_no: u32,
    },
    AttemptFinished {
        run_id: String,
        stage_id: String,
        attempt_no: u32,
        succeeded: bool,
        duration_ms: u64,
    },
    RetryScheduled {
        run_id: String,
        stage_id: String,
        kind: RetryKind,
        delay_ms: u64,
    },
    BreakerTransition {
        stage_id: String,
        from: BreakerState,
        to: BreakerState,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "run.started",
            Event::RunFinished { .. } => "run.finished",
            Event::StageStarted { .. } => "stage.started",
            Event::StageSucceeded { .. } => "stage.succeeded",
            Event::StageFailed { .. } => "stage.failed",
            Event::StageSkipped { .. } => "stage.skipped",
            Event::AttemptStarted { .. } => "attempt.started",
            Event::AttemptFinished { .. } => "attempt.finished",
            Event::RetryScheduled { .. } => "retry.scheduled",
            Event::BreakerTransition { .. } => "breaker.transition",
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Default for CompositeEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.add(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl EventSink for CompositeEventSink {
    async fn emit(&self, event: Event) {
        for sink in &self.sinks {
            sink.emit(event.clone()).await;
        }
    }
}

/// JSON lines on stdout.
pub struct StdoutEventSink;

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn emit(&self, event: Event) {
        println!("{}", serde_json::to_string(&event).unwrap_or_default());
    }
}

/// Structured `tracing` records under the `conveyor::events` target.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: Event) {
        match &event {
            Event::StageFailed {
                run_id,
                stage_id,
                error,
            } => {
                tracing::warn!(target: "conveyor::events", %run_id, %stage_id, %error, "stage.failed");
            }
            Event::BreakerTransition { stage_id, from, to } => {
                tracing::warn!(
                    target: "conveyor::events",
                    %stage_id,
                    from = from.as_str(),
                    to = to.as_str(),
                    "breaker.transition"
                );
            }
            Event::RetryScheduled {
                run_id,
                stage_id,
                kind,
                delay_ms,
            } => {
                tracing::info!(target: "conveyor::events", %run_id, %stage_id, ?kind, delay_ms, "retry.scheduled");
            }
            Event::AttemptStarted { .. } | Event::AttemptFinished { .. } => {
                tracing::debug!(target: "conveyor::events", event = ?event, "{}", event.name());
            }
            _ => {
                tracing::info!(target: "conveyor::events", event = ?event, "{}", event.name());
            }
        }
    }
}

/// Forwards events to a channel so a separate task can consume them.
/// Events are dropped once the receiver is gone.
pub struct ChannelEventSink {
    tx: mpsc::Sender<Event>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: Event) {
        let _ = self.tx.send(event).await;
    }
}

pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: Event) {}
}
