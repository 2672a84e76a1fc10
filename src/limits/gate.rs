//! Bounded concurrency gate for in-flight remote calls.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::telemetry;
use crate::{AbridgeError, Result};

/// Default number of simultaneous remote calls.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 3;

/// Counting semaphore bounding simultaneous remote calls.
///
/// Independent of the [`RateLimiter`](super::RateLimiter): the limiter
/// bounds how many calls *start* per window, the gate bounds how many are
/// *running* at once.
#[derive(Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held gate slot. Released exactly once, on drop.
#[must_use = "the gate slot is released as soon as the permit is dropped"]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    /// Release the slot now rather than at end of scope.
    pub fn release(self) {}
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        metrics::gauge!(telemetry::IN_FLIGHT).decrement(1.0);
    }
}

impl ConcurrencyGate {
    /// Gate admitting `capacity` concurrent holders (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a slot with no deadline.
    ///
    /// Cancel-safe: dropping the future while waiting leaves no slot taken.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| AbridgeError::Cancelled("concurrency gate closed".into()))?;
        metrics::gauge!(telemetry::IN_FLIGHT).increment(1.0);
        Ok(GatePermit { _permit: permit })
    }

    /// Wait for a slot, giving up at `deadline`.
    pub async fn acquire_until(&self, deadline: Option<Instant>) -> Result<GatePermit> {
        match deadline {
            None => self.acquire().await,
            Some(deadline) => tokio::time::timeout_at(deadline, self.acquire())
                .await
                .map_err(|_| {
                    AbridgeError::Cancelled("deadline elapsed waiting for a concurrency slot".into())
                })?,
        }
    }

    /// Configured number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permits_are_released_on_drop() {
        let gate = ConcurrencyGate::new(2);
        let a = gate.acquire().await.unwrap();
        let b = gate.acquire().await.unwrap();
        assert_eq!(gate.in_flight(), 2);
        drop(a);
        assert_eq!(gate.in_flight(), 1);
        b.release();
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_while_full_is_cancellation() {
        let gate = ConcurrencyGate::new(1);
        let _held = gate.acquire().await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(100);
        let err = gate.acquire_until(Some(deadline)).await.err().unwrap();
        assert!(matches!(err, AbridgeError::Cancelled(_)));
        assert_eq!(gate.in_flight(), 1);
    }

    #[test]
    fn zero_capacity_clamped() {
        assert_eq!(ConcurrencyGate::new(0).capacity(), 1);
    }
}
