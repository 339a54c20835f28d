mod config;
mod decision;

pub use config::RetryPolicy;
pub use decision::{decide_retry, RetryDecision, RetryReason};
