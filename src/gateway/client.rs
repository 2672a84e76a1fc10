//! The generation client: cache, budget, permits, retries and validation
//! around a [`RemoteGenerator`].
//!
//! One logical request moves through these steps:
//!
//! 1. Cache lookup. A hit returns immediately: no permits, no cost.
//! 2. Budget pre-flight. A spent budget fails with `QuotaExceeded` before
//!    any remote call.
//! 3. Concurrency slot, then rate-limit permit. Both wait cooperatively and
//!    both give up at the caller's deadline.
//! 4. One remote call under the per-operation timeout. Permits are
//!    released as soon as the call ends.
//! 5. Mindmap output is parsed and validated.
//! 6. Retryable failures back off and go round again from step 2.
//! 7. Success appends one cost entry and fills the cache. A failure or an
//!    abandoned request that reached the remote service appends a failed one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use super::builder::{GenerationClientBuilder, GenerationSettings};
use super::prompts;
use crate::budget::{CostLedger, CostOutcome};
use crate::cache::{CacheKey, ResponseCache};
use crate::error::{ErrorKind, GenerationFailure};
use crate::limits::{ConcurrencyGate, RateLimiter};
use crate::providers::{GenerationParams, RemoteGenerator, RemoteOutput, RetryConfig};
use crate::telemetry;
use crate::types::{
    AttemptOutcome, AttemptRecord, Generation, GenerationRequest, MindmapResult, OperationKind,
    Payload, SummaryResult,
};
use crate::validation::parse_mindmap;
use crate::{AbridgeError, Result};

/// A generated artifact the client knows how to build, cache and return.
trait Artifact: Clone + Sized {
    fn from_remote(output: &RemoteOutput, latency: Duration) -> Result<Self>;
    fn from_payload(payload: Payload) -> Option<Self>;
    fn into_payload(self) -> Payload;
}

impl Artifact for SummaryResult {
    fn from_remote(output: &RemoteOutput, latency: Duration) -> Result<Self> {
        let text = output.text.trim();
        if text.is_empty() {
            return Err(AbridgeError::EmptyResponse);
        }
        Ok(SummaryResult {
            text: text.to_string(),
            tokens_in: output.tokens_in,
            tokens_out: output.tokens_out,
            latency_ms: duration_ms(latency),
        })
    }

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Summary(s) => Some(s),
            Payload::Mindmap(_) => None,
        }
    }

    fn into_payload(self) -> Payload {
        Payload::Summary(self)
    }
}

impl Artifact for MindmapResult {
    fn from_remote(output: &RemoteOutput, latency: Duration) -> Result<Self> {
        Ok(MindmapResult {
            root: parse_mindmap(&output.text)?,
            tokens_in: output.tokens_in,
            tokens_out: output.tokens_out,
            latency_ms: duration_ms(latency),
        })
    }

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Mindmap(m) => Some(m),
            Payload::Summary(_) => None,
        }
    }

    fn into_payload(self) -> Payload {
        Payload::Mindmap(self)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Token usage across every attempt of one logical request.
///
/// Once the remote service has been contacted exactly one cost entry is
/// written: by `settle`, or on drop when the request future is abandoned.
struct Usage {
    ledger: Arc<CostLedger>,
    operation: OperationKind,
    started: Instant,
    tokens_in: u64,
    tokens_out: u64,
    contacted: bool,
}

impl Usage {
    fn new(ledger: Arc<CostLedger>, operation: OperationKind, started: Instant) -> Self {
        Self {
            ledger,
            operation,
            started,
            tokens_in: 0,
            tokens_out: 0,
            contacted: false,
        }
    }

    fn add(&mut self, output: &RemoteOutput) {
        self.tokens_in = self.tokens_in.saturating_add(output.tokens_in);
        self.tokens_out = self.tokens_out.saturating_add(output.tokens_out);
    }

    /// Write the request's cost entry, if the remote service was contacted.
    fn settle(&mut self, outcome: CostOutcome) {
        if !std::mem::take(&mut self.contacted) {
            return;
        }
        if let Err(e) = self.ledger.record(
            self.operation,
            self.tokens_in,
            self.tokens_out,
            self.started.elapsed(),
            outcome,
        ) {
            warn!(error = %e, "failed to record request cost");
        }
    }
}

impl Drop for Usage {
    fn drop(&mut self) {
        if self.contacted {
            debug!(
                operation = %self.operation,
                tokens_in = self.tokens_in,
                tokens_out = self.tokens_out,
                "request abandoned after contacting the remote service"
            );
            self.settle(CostOutcome::Failed(ErrorKind::Timeout));
        }
    }
}

/// Resilient client for summary and mindmap generation.
///
/// Cheap to share behind an `Arc`; every method takes `&self` and many
/// requests may run concurrently. The cache, limiter, gate and ledger are
/// injected at build time and may be shared with other clients.
pub struct GenerationClient {
    generator: Arc<dyn RemoteGenerator>,
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
    gate: ConcurrencyGate,
    ledger: Arc<CostLedger>,
    retry: RetryConfig,
    settings: GenerationSettings,
}

impl GenerationClient {
    pub fn builder() -> GenerationClientBuilder {
        GenerationClientBuilder::new()
    }

    pub(crate) fn new(
        generator: Arc<dyn RemoteGenerator>,
        cache: Arc<ResponseCache>,
        limiter: Arc<RateLimiter>,
        gate: ConcurrencyGate,
        ledger: Arc<CostLedger>,
        retry: RetryConfig,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            generator,
            cache,
            limiter,
            gate,
            ledger,
            retry,
            settings,
        }
    }

    /// Summarize `text` as 5 to 10 bullet points.
    #[instrument(skip(self, text), fields(operation = "summarize", chars = text.len()))]
    pub async fn summarize(
        &self,
        text: &str,
    ) -> std::result::Result<Generation<SummaryResult>, GenerationFailure> {
        self.run(&GenerationRequest::summarize(text)).await
    }

    /// Generate a validated mindmap tree for `text`.
    #[instrument(skip(self, text), fields(operation = "mindmap", chars = text.len()))]
    pub async fn generate_mindmap(
        &self,
        text: &str,
    ) -> std::result::Result<Generation<MindmapResult>, GenerationFailure> {
        self.run(&GenerationRequest::mindmap(text)).await
    }

    /// Execute a fully specified request (deadline, token ceiling).
    #[instrument(skip(self, request), fields(operation = %request.operation()))]
    pub async fn execute(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<Generation<Payload>, GenerationFailure> {
        match request.operation() {
            OperationKind::Summarize => self
                .run::<SummaryResult>(request)
                .await
                .map(|g| g.map(Payload::Summary)),
            OperationKind::Mindmap => self
                .run::<MindmapResult>(request)
                .await
                .map(|g| g.map(Payload::Mindmap)),
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    async fn run<T: Artifact>(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<Generation<T>, GenerationFailure> {
        let operation = request.operation();
        let started = Instant::now();

        let key = CacheKey::new(operation, request.source_text());
        if let Some(output) = self.cache.get(&key).and_then(T::from_payload) {
            debug!(%key, "served from cache");
            record_request(operation, "cache", started, true);
            return Ok(Generation::cached(output));
        }

        let mut usage = Usage::new(Arc::clone(&self.ledger), operation, started);
        let source = match self.bounded_source(request.source_text()) {
            Ok(source) => source,
            Err(e) => return Err(self.fail(operation, started, e, Vec::new(), usage)),
        };

        let deadline = request.caller_deadline();
        let mut attempts = Vec::new();
        let mut strict = false;
        let mut strict_retry_used = false;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if let Err(e) = self.ledger.check_budget() {
                metrics::counter!(telemetry::BUDGET_REJECTIONS_TOTAL, "operation" => operation.as_str())
                    .increment(1);
                debug!(attempt, "budget exhausted, not contacting remote service");
                return Err(self.fail(operation, started, e, attempts, usage));
            }

            let prompt = prompts::render(operation, source, strict);
            let params = self.params(request, strict);
            let attempt_started_at = Utc::now();
            let called = self.call(&prompt, &params, deadline, &mut usage).await;
            let (result, latency) = match called {
                Ok(called) => called,
                // Gave up waiting for a slot or permit; nothing reached the remote service.
                Err(e) => return Err(self.fail(operation, started, e, attempts, usage)),
            };
            let result = result.and_then(|output| T::from_remote(&output, latency));

            let err = match result {
                Ok(output) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        started_at: attempt_started_at,
                        outcome: AttemptOutcome::Success,
                        error_kind: None,
                        latency,
                    });
                    record_attempt(operation, AttemptOutcome::Success);
                    return Ok(self.succeed(operation, key, output, attempts, usage, started));
                }
                Err(e) => e,
            };

            let kind = err.kind();
            // One stricter-prompt retry is allowed for a tree that parsed but broke the limits.
            let strict_retry = kind == ErrorKind::ValidationFailed
                && !strict_retry_used
                && attempt < self.retry.max_attempts();
            let retry = strict_retry || self.retry.should_retry(&err, operation, attempt);
            let (outcome, recorded_kind) = match (retry, strict_retry) {
                (true, true) => (AttemptOutcome::RetryableFailure, ErrorKind::MalformedOutput),
                (true, false) => (AttemptOutcome::RetryableFailure, kind),
                (false, _) => (AttemptOutcome::FatalFailure, kind),
            };
            attempts.push(AttemptRecord {
                attempt,
                started_at: attempt_started_at,
                outcome,
                error_kind: Some(recorded_kind),
                latency,
            });
            record_attempt(operation, outcome);

            if !retry {
                return Err(self.fail(operation, started, err, attempts, usage));
            }

            strict_retry_used |= strict_retry;
            if operation.is_structured() && recorded_kind == ErrorKind::MalformedOutput {
                strict = true;
            }

            let delay = self.retry.effective_delay(attempt, err.retry_after());
            warn!(
                attempt,
                max_attempts = self.retry.max_attempts(),
                delay_ms = duration_ms(delay),
                kind = %recorded_kind,
                error = %err,
                "retrying after retryable error"
            );
            metrics::counter!(telemetry::RETRIES_TOTAL,
                "operation" => operation.as_str(),
                "kind" => recorded_kind.code(),
            )
            .increment(1);

            if let Err(e) = backoff(delay, deadline).await {
                return Err(self.fail(operation, started, e, attempts, usage));
            }
        }
    }

    /// Reject blank input and cut overlong input on a char boundary.
    fn bounded_source<'a>(&self, text: &'a str) -> Result<&'a str> {
        if text.trim().is_empty() {
            return Err(AbridgeError::InvalidInput("source text is empty".into()));
        }
        match text.char_indices().nth(self.settings.max_source_chars) {
            Some((cut, _)) => {
                debug!(
                    max_source_chars = self.settings.max_source_chars,
                    "truncating source text"
                );
                Ok(&text[..cut])
            }
            None => Ok(text),
        }
    }

    fn params(&self, request: &GenerationRequest, strict: bool) -> GenerationParams {
        let s = &self.settings;
        let (temperature, max_output_tokens, timeout) = match request.operation() {
            OperationKind::Summarize => {
                (s.summary_temperature, s.summary_max_tokens, s.summary_timeout)
            }
            OperationKind::Mindmap => {
                (s.mindmap_temperature, s.mindmap_max_tokens, s.mindmap_timeout)
            }
        };
        GenerationParams {
            temperature: if strict { s.strict_temperature } else { temperature },
            max_output_tokens: request
                .requested_max_output_tokens()
                .unwrap_or(max_output_tokens),
            timeout,
            json_output: request.operation().is_structured(),
        }
    }

    /// One attempt: take a slot and a permit, then make the remote call.
    ///
    /// The outer error means the deadline passed before a slot or permit
    /// was granted and no call was made. Otherwise returns the call's result
    /// and latency. Both permits are released before returning.
    async fn call(
        &self,
        prompt: &str,
        params: &GenerationParams,
        deadline: Option<Instant>,
        usage: &mut Usage,
    ) -> Result<(Result<RemoteOutput>, Duration)> {
        let _slot = self.gate.acquire_until(deadline).await?;
        self.limiter.acquire_until(deadline).await?;

        let call_started = Instant::now();
        let timeout_at = call_started + params.timeout;
        let caller_first = deadline.is_some_and(|d| d < timeout_at);
        let cutoff = match deadline {
            Some(d) if caller_first => d,
            _ => timeout_at,
        };

        usage.contacted = true;
        let result =
            match tokio::time::timeout_at(cutoff, self.generator.generate(prompt, params)).await {
                Ok(result) => result,
                Err(_) if caller_first => Err(AbridgeError::Cancelled(
                    "deadline elapsed during remote call".into(),
                )),
                Err(_) => Err(AbridgeError::Timeout {
                    operation: "remote generation",
                    after: params.timeout,
                }),
            };
        let latency = call_started.elapsed();
        if let Ok(output) = &result {
            usage.add(output);
        }
        Ok((result, latency))
    }

    fn succeed<T: Artifact>(
        &self,
        operation: OperationKind,
        key: CacheKey,
        output: T,
        attempts: Vec<AttemptRecord>,
        mut usage: Usage,
        started: Instant,
    ) -> Generation<T> {
        usage.settle(CostOutcome::Succeeded);
        let payload = output.clone().into_payload();
        let size = payload.size_bytes();
        if !self.cache.put(key, payload, size) {
            debug!(size_bytes = size, "result not cached");
        }
        record_request(operation, "remote", started, true);
        Generation {
            output,
            attempts,
            cached: false,
        }
    }

    fn fail(
        &self,
        operation: OperationKind,
        started: Instant,
        err: AbridgeError,
        attempts: Vec<AttemptRecord>,
        mut usage: Usage,
    ) -> GenerationFailure {
        let failure = GenerationFailure::new(operation, err, attempts);
        usage.settle(CostOutcome::Failed(failure.kind));
        error!(
            kind = %failure.kind,
            retryable = failure.retryable,
            attempts = failure.attempts.len(),
            error = %failure.source,
            "generation failed"
        );
        record_request(operation, "remote", started, false);
        failure
    }
}

/// Sleep before the next attempt, or give up if that would pass the deadline.
async fn backoff(delay: Duration, deadline: Option<Instant>) -> Result<()> {
    let wake = Instant::now() + delay;
    if deadline.is_some_and(|d| wake > d) {
        return Err(AbridgeError::Cancelled(format!(
            "deadline elapsed before next retry (backoff {delay:?})"
        )));
    }
    tokio::time::sleep_until(wake).await;
    Ok(())
}

fn record_request(operation: OperationKind, source: &'static str, start: Instant, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "operation" => operation.as_str(),
        "status" => status,
        "source" => source,
    )
    .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
        "operation" => operation.as_str(),
    )
    .record(start.elapsed().as_secs_f64());
}

fn record_attempt(operation: OperationKind, outcome: AttemptOutcome) {
    let outcome = match outcome {
        AttemptOutcome::Success => "success",
        AttemptOutcome::RetryableFailure => "retryable",
        AttemptOutcome::FatalFailure => "fatal",
    };
    metrics::counter!(telemetry::ATTEMPTS_TOTAL,
        "operation" => operation.as_str(),
        "outcome" => outcome,
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl RemoteGenerator for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<RemoteOutput> {
            Ok(RemoteOutput::new(prompt.to_string(), 1, 1))
        }
    }

    fn client(max_source_chars: usize) -> GenerationClient {
        GenerationClient::builder()
            .generator(Echo)
            .retry(RetryConfig::disabled())
            .max_source_chars(max_source_chars)
            .build()
            .unwrap()
    }

    #[test]
    fn truncates_on_char_boundary() {
        let client = client(3);
        assert_eq!(client.bounded_source("héllo").unwrap(), "hél");
        assert_eq!(client.bounded_source("hé").unwrap(), "hé");
    }

    #[test]
    fn blank_source_rejected() {
        let client = client(10);
        assert!(matches!(
            client.bounded_source(" \n\t"),
            Err(AbridgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn strict_params_drop_temperature() {
        let client = client(10);
        let request = GenerationRequest::mindmap("x");
        assert_eq!(client.params(&request, false).temperature, 0.2);
        assert_eq!(client.params(&request, true).temperature, 0.0);
        assert!(client.params(&request, true).json_output);
        assert_eq!(client.params(&request, false).timeout, Duration::from_secs(20));

        let request = GenerationRequest::summarize("x").max_output_tokens(77);
        let params = client.params(&request, false);
        assert_eq!(params.max_output_tokens, 77);
        assert_eq!(params.timeout, Duration::from_secs(30));
        assert!(!params.json_output);
    }

    #[tokio::test]
    async fn blank_input_fails_without_attempts() {
        let failure = client(10).summarize("   ").await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Fatal);
        assert!(!failure.retryable);
        assert!(failure.attempts.is_empty());
    }
}
