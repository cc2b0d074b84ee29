//! Exponential backoff policy for retryable failures

use std::time::Duration;

use crate::config::SyncConfig;

/// Capped exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base: Duration,
    multiplier: f64,
    max_delay: Duration,
    max_retries: u32,
}

impl RetryPolicy {
    /// Build a policy from engine configuration
    #[must_use]
    pub const fn from_config(config: &SyncConfig) -> Self {
        Self {
            base: config.backoff_base,
            multiplier: config.backoff_multiplier,
            max_delay: config.backoff_max,
            max_retries: config.max_retries,
        }
    }

    /// Maximum retry attempts before an operation is terminal
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the given attempt (attempt 1 is the first retry)
    ///
    /// `base * multiplier^(attempt - 1)`, capped at the configured maximum.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powf(f64::from(attempt - 1));
        let delay = self.base.mul_f64(factor);
        delay.min(self.max_delay)
    }

    /// Whether an operation with this many failed attempts may retry
    #[must_use]
    pub const fn allows(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(4),
            max_retries: 3,
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = policy();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = policy();
        assert_eq!(policy.delay_for(10), Duration::from_secs(4));
        assert_eq!(policy.delay_for(100), Duration::from_secs(4));
    }

    #[test]
    fn test_allows_respects_max() {
        let policy = policy();
        assert!(policy.allows(0));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
        assert!(!policy.allows(4));
    }
}
