use std::time::Duration;

use crate::retry::config::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter { delay: Duration, reason: RetryReason },
    Stop { reason: RetryReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    AttemptsExhausted,
    Backoff,
}

/// Decide whether to retry after a failed attempt and how long to wait.
///
/// - `attempt_no`: 1-based number of the attempt that just failed.
/// - `rand_u64`: RNG for full jitter; only called when jitter is enabled.
pub fn decide_retry(
    policy: &RetryPolicy,
    attempt_no: u32,
    rand_u64: impl Fn() -> u64,
) -> RetryDecision {
    if attempt_no > policy.max_retries {
        return RetryDecision::Stop {
            reason: RetryReason::AttemptsExhausted,
        };
    }

    // base * factor^(attempt_no-1), capped at max_delay.
    let exp = attempt_no.saturating_sub(1) as i32;
    let raw = (policy.base_delay.as_millis() as f64) * policy.factor.powi(exp);
    let raw_ms = raw.min(policy.max_delay.as_millis() as f64).max(0.0) as u64;

    let delay_ms = if policy.jitter && raw_ms > 0 {
        rand_u64() % (raw_ms + 1)
    } else {
        raw_ms
    };
    RetryDecision::RetryAfter {
        delay: Duration::from_millis(delay_ms),
        reason: RetryReason::Backoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_once_retries_are_spent() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(100));
        assert!(matches!(decide_retry(&policy, 1, || 0), RetryDecision::RetryAfter { .. }));
        assert!(matches!(decide_retry(&policy, 2, || 0), RetryDecision::RetryAfter { .. }));
        assert_eq!(
            decide_retry(&policy, 3, || 0),
            RetryDecision::Stop {
                reason: RetryReason::AttemptsExhausted
            }
        );
    }

    #[test]
    fn fixed_policy_keeps_a_flat_delay() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(250));
        for attempt in 1..=5 {
            assert_eq!(
                decide_retry(&policy, attempt, || 0),
                RetryDecision::RetryAfter {
                    delay: Duration::from_millis(250),
                    reason: RetryReason::Backoff
                }
            );
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::fixed(10, Duration::from_millis(100))
            .with_backoff(2.0, Duration::from_millis(500));
        let delays: Vec<u64> = (1..=5)
            .map(|n| match decide_retry(&policy, n, || 0) {
                RetryDecision::RetryAfter { delay, .. } => delay.as_millis() as u64,
                RetryDecision::Stop { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(100)).with_jitter(true);
        match decide_retry(&policy, 1, || 1_000_037) {
            RetryDecision::RetryAfter { delay, .. } => assert!(delay <= Duration::from_millis(100)),
            RetryDecision::Stop { .. } => panic!("expected retry"),
        }
    }
}
