//! Engine configuration

use std::time::Duration;

use crate::models::ResolutionStrategy;

/// Configuration for the sync engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote API base URL (e.g., `https://api.example.com/v1`)
    pub base_url: String,
    /// Number of photos per metadata batch call
    pub batch_size: usize,
    /// Maximum retry attempts for a queued operation
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub backoff_base: Duration,
    /// Backoff multiplier applied per attempt
    pub backoff_multiplier: f64,
    /// Upper bound on any single backoff delay
    pub backoff_max: Duration,
    /// Timeout applied to every remote request
    pub request_timeout: Duration,
    /// Completed queue entries older than this are eligible for cleanup
    pub cleanup_horizon: Duration,
    /// Trailing window for health metrics
    pub health_window: Duration,
    /// Strategy applied when a conflict is resolved without an explicit one
    pub default_strategy: ResolutionStrategy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            batch_size: 50,
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            backoff_max: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            cleanup_horizon: Duration::from_secs(7 * 24 * 60 * 60),
            health_window: Duration::from_secs(24 * 60 * 60),
            default_strategy: ResolutionStrategy::Merge,
        }
    }
}

impl SyncConfig {
    /// Create a configuration pointing at the given remote base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the metadata batch size
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the maximum retry attempts
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the default conflict resolution strategy
    #[must_use]
    pub const fn with_default_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Validate field ranges
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::Error::Validation(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(crate::Error::Validation(
                "backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = SyncConfig::default().with_batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn builders_apply() {
        let config = SyncConfig::new("https://api.example.com")
            .with_batch_size(5)
            .with_max_retries(7);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.base_url, "https://api.example.com");
    }
}
