//! Bounded retry with exponential backoff.

use std::time::Duration;

/// How failed fetches are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Automatic retries after consecutive failures; manual refresh is always allowed
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `failures` consecutive failures, or `None`
    /// once the budget is spent.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if failures == 0 {
            return Some(Duration::ZERO);
        }
        if failures > self.max_retries {
            return None;
        }

        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        let delay = self.base_delay.checked_mul(factor).unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }

    /// True once `failures` exceeds the automatic retry budget.
    pub fn exhausted(&self, failures: u32) -> bool {
        failures > self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_capped() {
        let policy = RetryPolicy {
            max_retries: 6,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        };

        let delays: Vec<_> = (1..=6).map(|n| policy.delay_for(n).unwrap()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn test_budget_is_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for(3).is_some());
        assert_eq!(policy.delay_for(4), None);
        assert!(policy.exhausted(4));
        assert!(!policy.exhausted(0));
    }

    #[test]
    fn test_large_failure_counts_do_not_overflow() {
        let policy = RetryPolicy {
            max_retries: u32::MAX,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(40), Some(policy.max_delay));
    }
}
