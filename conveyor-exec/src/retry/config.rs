use std::time::Duration;

/// Retry budget and delay shape for one retry loop.
///
/// `max_retries` counts retries, not attempts: a policy with `max_retries = 2`
/// allows three invocations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    /// Full jitter: the delay is drawn uniformly from `0..=computed`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            factor: 1.0,
            max_delay: Duration::from_secs(300),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Constant delay between retries.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay.max(Duration::from_secs(300)),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, factor: f64, max_delay: Duration) -> Self {
        self.factor = factor;
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}
