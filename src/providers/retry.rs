//! Retry configuration and backoff calculation.
//!
//! [`RetryConfig`] decides *whether* a failed attempt is retried and *how
//! long* to wait first. The retry loop itself lives in the generation
//! client, because each new attempt must re-check the budget and
//! re-acquire permits.

use std::time::Duration;

use rand::Rng;

use crate::AbridgeError;
use crate::types::OperationKind;

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff with optional jitter:
///
/// ```rust
/// # use abridge::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_retries(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(false);
/// assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the initial attempt; total attempts are
    /// `max_retries + 1`. 0 = no retry. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Growth factor per retry (minimum 1). Default: 2.
    pub backoff_base: u32,
    /// Maximum delay between retries (caps exponential growth). Default: 60s.
    pub max_delay: Duration,
    /// Whether to add random jitter to delays. Default: true.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_base: 2,
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries after the initial attempt.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the exponential growth factor.
    pub fn backoff_base(mut self, base: u32) -> Self {
        self.backoff_base = base.max(1);
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Total attempts allowed for one logical request.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-indexed).
    ///
    /// `min(initial_delay * backoff_base^(retry - 1), max_delay)`. Excludes
    /// jitter; see [`effective_delay()`](Self::effective_delay).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = self.backoff_base.max(1).saturating_pow(exponent);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay actually slept before retry number `retry`.
    ///
    /// A provider `retry_after` hint takes precedence over the computed
    /// backoff (still capped at `max_delay`). With jitter enabled, a random
    /// amount up to the delay itself is added, again capped at `max_delay`.
    pub fn effective_delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let base = retry_after
            .map(|hint| hint.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for_attempt(retry));
        if !self.jitter || base.is_zero() {
            return base;
        }
        let window = u64::try_from(base.as_nanos()).unwrap_or(u64::MAX);
        let extra_nanos = rand::thread_rng().gen_range(0..=window);
        (base + Duration::from_nanos(extra_nanos)).min(self.max_delay.max(base))
    }

    /// Whether a failure on attempt `attempt` (1-indexed) earns another try.
    pub fn should_retry(&self, err: &AbridgeError, operation: OperationKind, attempt: u32) -> bool {
        attempt < self.max_attempts() && err.is_retryable_for(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn exponential_then_capped() {
        let config = RetryConfig::new().jitter(false);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(7), Duration::from_secs(60));
        assert_eq!(config.delay_for_attempt(200), Duration::from_secs(60));
    }

    #[test]
    fn retry_after_hint_wins_but_is_capped() {
        let config = RetryConfig::new().jitter(false);
        assert_eq!(
            config.effective_delay(1, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.effective_delay(1, Some(Duration::from_secs(600))),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn jitter_stays_within_window() {
        let config = RetryConfig::new();
        for _ in 0..100 {
            let d = config.effective_delay(2, None);
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_secs(4));
        }
    }

    #[test]
    fn should_retry_respects_attempt_budget() {
        let config = RetryConfig::new().max_retries(2);
        let err = AbridgeError::Http("reset".into());
        assert!(config.should_retry(&err, OperationKind::Summarize, 1));
        assert!(config.should_retry(&err, OperationKind::Summarize, 2));
        assert!(!config.should_retry(&err, OperationKind::Summarize, 3));
        assert!(!config.should_retry(
            &AbridgeError::AuthenticationFailed,
            OperationKind::Summarize,
            1
        ));
    }
}
