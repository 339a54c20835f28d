use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use conveyor_core::RunState;
use conveyor_store::BreakerState;

use crate::executor::events::{Event, EventSink, RetryKind};

#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub run_id: String,
    pub candidate_id: String,
    pub state: Option<RunState>,
    pub started_at: Option<Instant>,
    pub total_duration: Option<Duration>,
    pub stages_succeeded: usize,
    pub stages_failed: usize,
    pub stages_skipped: usize,
    pub attempts: usize,
    pub attempt_failures: usize,
    pub execution_retries: usize,
    pub acceptance_retries: usize,
    pub breaker_trips: usize,
}

impl RunMetrics {
    pub fn start(&mut self, run_id: &str, candidate_id: &str) {
        *self = Self {
            run_id: run_id.to_string(),
            candidate_id: candidate_id.to_string(),
            started_at: Some(Instant::now()),
            ..Self::default()
        };
    }

    pub fn stages_total(&self) -> usize {
        self.stages_succeeded + self.stages_failed + self.stages_skipped
    }

    pub fn finish(&mut self, state: RunState) {
        self.state = Some(state);
        self.total_duration = self.started_at.map(|s| s.elapsed());
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id,
            "candidate_id": self.candidate_id,
            "state": self.state.map(|s| s.as_str()),
            "duration_ms": self.total_duration.map(|d| d.as_millis() as u64),
            "stages": {
                "total": self.stages_total(),
                "succeeded": self.stages_succeeded,
                "failed": self.stages_failed,
                "skipped": self.stages_skipped,
            },
            "attempts": {
                "total": self.attempts,
                "failed": self.attempt_failures,
            },
            "retries": {
                "execution": self.execution_retries,
                "acceptance": self.acceptance_retries,
            },
            "breaker_trips": self.breaker_trips,
        })
    }
}

#[derive(Default)]
pub struct MetricsCollector {
    metrics: Mutex<RunMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn observe(&self, event: &Event) {
        let mut m = self.metrics.lock().await;
        match event {
            Event::RunStarted {
                run_id,
                candidate_id,
            } => m.start(run_id, candidate_id),
            Event::RunFinished { state, .. } => m.finish(*state),
            Event::StageSucceeded { .. } => m.stages_succeeded += 1,
            Event::StageFailed { .. } => m.stages_failed += 1,
            Event::StageSkipped { .. } => m.stages_skipped += 1,
            Event::AttemptStarted { .. } => m.attempts += 1,
            Event::AttemptFinished { succeeded, .. } => {
                if !succeeded {
                    m.attempt_failures += 1;
                }
            }
            Event::RetryScheduled { kind, .. } => match kind {
                RetryKind::Execution => m.execution_retries += 1,
                RetryKind::Acceptance => m.acceptance_retries += 1,
            },
            Event::BreakerTransition { to, .. } => {
                if *to == BreakerState::Open {
                    m.breaker_trips += 1;
                }
            }
            Event::StageStarted { .. } => {}
        }
    }

    pub async fn get_metrics(&self) -> RunMetrics {
        self.metrics.lock().await.clone()
    }
}

pub struct MetricsEventSink {
    collector: Arc<MetricsCollector>,
    base: Arc<dyn EventSink>,
}

impl MetricsEventSink {
    pub fn new(collector: Arc<MetricsCollector>, base: Arc<dyn EventSink>) -> Self {
        Self { collector, base }
    }
}

#[async_trait]
impl EventSink for MetricsEventSink {
    async fn emit(&self, event: Event) {
        self.collector.observe(&event).await;
        self.base.emit(event).await;
    }
}
