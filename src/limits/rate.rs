//! Sliding-window rate limiter.

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;
use crate::{AbridgeError, Result};

/// Rate limit: `max_requests` per `window`.
///
/// ```rust
/// # use abridge::RateLimitConfig;
/// # use std::time::Duration;
/// let config = RateLimitConfig::new(10, Duration::from_secs(1));
/// assert_eq!(config.max_requests.get(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Permits per window. Default: 60.
    pub max_requests: NonZeroU32,
    /// Window length. Default: 60s.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(60))
    }
}

impl RateLimitConfig {
    /// `max_requests` of zero is clamped to one.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN),
            window,
        }
    }

    /// Convenience for "N requests per minute".
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

/// Sliding-window limiter over the start times of recent requests.
///
/// Keeps the timestamps of at most `max_requests` granted permits. When
/// full, the next permit becomes available once the oldest timestamp
/// leaves the window, so no window of length `window` ever contains more
/// than `max_requests` grants.
pub struct RateLimiter {
    config: RateLimitConfig,
    granted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            granted: Mutex::new(VecDeque::with_capacity(config.max_requests.get() as usize)),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.granted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune(&self, granted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = granted.front() {
            if now.duration_since(oldest) >= self.config.window {
                granted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Take a permit if one is free right now.
    ///
    /// On failure returns how long until the oldest grant leaves the window.
    pub fn try_acquire(&self) -> std::result::Result<(), Duration> {
        let now = Instant::now();
        let mut granted = self.lock();
        self.prune(&mut granted, now);
        if granted.len() < self.config.max_requests.get() as usize {
            granted.push_back(now);
            return Ok(());
        }
        let oldest = granted.front().copied().unwrap_or(now);
        Err(self.config.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Wait for a permit with no deadline.
    ///
    /// Cancel-safe: dropping the future while it waits consumes no permit.
    pub async fn acquire(&self) {
        // Without a deadline the only error path is unreachable.
        let _ = self.acquire_until(None).await;
    }

    /// Wait for a permit, giving up at `deadline`.
    ///
    /// Fails with [`AbridgeError::Cancelled`] as soon as it is clear the
    /// next free permit lies beyond the deadline. No permit is consumed on
    /// failure.
    pub async fn acquire_until(&self, deadline: Option<Instant>) -> Result<()> {
        let started = Instant::now();
        loop {
            match self.try_acquire() {
                Ok(()) => {
                    metrics::histogram!(telemetry::RATE_LIMIT_WAIT_SECONDS)
                        .record(started.elapsed().as_secs_f64());
                    return Ok(());
                }
                Err(wait) => {
                    let wake = Instant::now() + wait;
                    if let Some(deadline) = deadline
                        && wake > deadline
                    {
                        return Err(AbridgeError::Cancelled(format!(
                            "deadline elapsed before a rate-limit permit frees up (next in {wait:?})"
                        )));
                    }
                    debug!(wait_ms = wait.as_millis() as u64, "waiting for rate-limit permit");
                    tokio::time::sleep_until(wake).await;
                }
            }
        }
    }

    /// Permits that could be granted right now.
    pub fn available(&self) -> u32 {
        let mut granted = self.lock();
        self.prune(&mut granted, Instant::now());
        self.config.max_requests.get() - granted.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn grants_up_to_capacity_then_reports_wait() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(10)));
        assert!(limiter.try_acquire().is_ok());
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(limiter.try_acquire().is_ok());
        assert_eq!(limiter.available(), 0);

        let wait = limiter.try_acquire().unwrap_err();
        assert_eq!(wait, Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(5)));
        assert!(limiter.try_acquire().is_ok());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(limiter.available(), 1);
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn zero_requests_clamped() {
        assert_eq!(RateLimitConfig::new(0, Duration::from_secs(1)).max_requests.get(), 1);
    }
}
