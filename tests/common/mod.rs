//! Scripted remote generator shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use abridge::{
    AbridgeError, GenerationClient, GenerationParams, RateLimitConfig, RemoteGenerator,
    RemoteOutput, Result, RetryConfig,
};
use async_trait::async_trait;
use tokio::time::Instant;

/// A call the fake received.
#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub prompt: String,
    pub params: GenerationParams,
}

/// Plays back scripted outcomes in order; once the script runs out every
/// call succeeds with `fallback`.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<RemoteOutput>>>,
    fallback: RemoteOutput,
    delay: Duration,
    calls: Mutex<Vec<Call>>,
    total_calls: AtomicU32,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<RemoteOutput>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: RemoteOutput::new("• fallback", 10, 5),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            total_calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always succeeds with `output`.
    pub fn always(output: RemoteOutput) -> Self {
        Self::new(Vec::new()).fallback(output)
    }

    pub fn fallback(mut self, output: RemoteOutput) -> Self {
        self.fallback = output;
        self
    }

    /// Hold every call open for `delay` before answering.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<RemoteOutput> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            prompt: prompt.to_string(),
            params: params.clone(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

pub fn transient() -> AbridgeError {
    AbridgeError::Api {
        status: 503,
        message: "service unavailable".into(),
    }
}

/// Retry policy with deterministic delays.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(100))
        .jitter(false)
}

/// Client over `generator` with a generous rate limit and no jitter.
pub fn client_with(generator: std::sync::Arc<ScriptedGenerator>) -> GenerationClient {
    GenerationClient::builder()
        .shared_generator(generator)
        .rate_limit(RateLimitConfig::new(1000, Duration::from_secs(1)))
        .retry(fast_retry())
        .build()
        .unwrap()
}

/// A valid mindmap with `breadth` leaves under the root.
pub fn mindmap_json(breadth: usize) -> String {
    let children: Vec<_> = (0..breadth)
        .map(|i| serde_json::json!({ "title": format!("child {i}"), "children": [] }))
        .collect();
    serde_json::json!({ "title": "root", "children": children }).to_string()
}
