use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StageError;
use crate::types::{RunContext, StageOutput};

/// The body of a stage: the contract external stage implementations fulfil.
#[async_trait]
pub trait StageBody: Send + Sync {
    async fn execute(
        &self,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<StageOutput, StageError>;

    /// Acceptance predicate over a produced output. Must be side-effect free.
    fn accept(&self, _output: &StageOutput) -> bool {
        true
    }

    /// Acceptance work that needs I/O, such as an external quality check.
    /// Consulted only once `accept` holds. `StageError::Cancelled` means the
    /// check was abandoned; any other error rejects the output.
    async fn verify(
        &self,
        _output: &StageOutput,
        _cancel: &CancellationToken,
    ) -> Result<bool, StageError> {
        Ok(true)
    }
}

pub type ConditionFn = Arc<dyn Fn(&RunContext) -> bool + Send + Sync>;
pub type AcceptFn = Arc<dyn Fn(&StageOutput) -> bool + Send + Sync>;

/// Adapts a synchronous closure into a [`StageBody`].
pub struct FnStage<F> {
    f: F,
}

impl<F> FnStage<F>
where
    F: Fn(&RunContext) -> Result<StageOutput, StageError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> StageBody for FnStage<F>
where
    F: Fn(&RunContext) -> Result<StageOutput, StageError> + Send + Sync,
{
    async fn execute(
        &self,
        ctx: &RunContext,
        _cancel: &CancellationToken,
    ) -> Result<StageOutput, StageError> {
        (self.f)(ctx)
    }
}

#[derive(Clone)]
pub struct StageDefinition {
    pub id: String,
    pub name: String,
    pub order: i64,
    pub enabled: bool,
    pub max_execution_retries: u32,
    pub max_acceptance_retries: u32,
    pub retry_delay: Duration,
    pub continue_on_error: bool,
    pub condition: Option<ConditionFn>,
    pub body: Option<Arc<dyn StageBody>>,
    /// Overrides [`StageBody::accept`] when set.
    pub accept: Option<AcceptFn>,
}

impl StageDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            order: 0,
            enabled: true,
            max_execution_retries: 0,
            max_acceptance_retries: 0,
            retry_delay: Duration::ZERO,
            continue_on_error: false,
            condition: None,
            body: None,
            accept: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn max_execution_retries(mut self, n: u32) -> Self {
        self.max_execution_retries = n;
        self
    }

    pub fn max_acceptance_retries(mut self, n: u32) -> Self {
        self.max_acceptance_retries = n;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn continue_on_error(mut self, yes: bool) -> Self {
        self.continue_on_error = yes;
        self
    }

    pub fn condition<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(f));
        self
    }

    pub fn body<B: StageBody + 'static>(mut self, body: B) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn shared_body(mut self, body: Arc<dyn StageBody>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn accept<F>(mut self, f: F) -> Self
    where
        F: Fn(&StageOutput) -> bool + Send + Sync + 'static,
    {
        self.accept = Some(Arc::new(f));
        self
    }

    /// Evaluate the run condition; stages without one always run.
    pub fn should_run(&self, ctx: &RunContext) -> bool {
        self.condition.as_ref().map_or(true, |c| c(ctx))
    }

    pub fn accepts(&self, output: &StageOutput) -> bool {
        if let Some(accept) = &self.accept {
            return accept(output);
        }
        self.body.as_ref().map_or(true, |b| b.accept(output))
    }

    /// `accepts`, followed by the body's `verify` when no override is set.
    pub async fn verify_output(
        &self,
        output: &StageOutput,
        cancel: &CancellationToken,
    ) -> Result<bool, StageError> {
        if !self.accepts(output) {
            return Ok(false);
        }
        match (&self.accept, &self.body) {
            (None, Some(body)) => body.verify(output, cancel).await,
            _ => Ok(true),
        }
    }
}

impl fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("order", &self.order)
            .field("enabled", &self.enabled)
            .field("max_execution_retries", &self.max_execution_retries)
            .field("max_acceptance_retries", &self.max_acceptance_retries)
            .field("retry_delay", &self.retry_delay)
            .field("continue_on_error", &self.continue_on_error)
            .field("has_condition", &self.condition.is_some())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}
