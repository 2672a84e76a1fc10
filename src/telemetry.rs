//! Telemetry metric name constants.
//!
//! Centralised metric names for abridge operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `abridge_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation`: "summarize" or "mindmap"
//! - `status`: "ok" or "error"
//! - `kind`: error kind code (e.g. "RATE_LIMITED")
//! - `direction`: "input" or "output"

/// Total logical requests completed (cache hits included).
///
/// Labels: `operation`, `status` ("ok" | "error"), `source` ("cache" | "remote").
pub const REQUESTS_TOTAL: &str = "abridge_requests_total";

/// Logical request duration in seconds, across all attempts.
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "abridge_request_duration_seconds";

/// Total remote-call attempts.
///
/// Labels: `operation`, `outcome` ("success" | "retryable" | "fatal").
pub const ATTEMPTS_TOTAL: &str = "abridge_attempts_total";

/// Total retries (not counting the initial attempt).
///
/// Labels: `operation`, `kind`.
pub const RETRIES_TOTAL: &str = "abridge_retries_total";

/// Total tokens consumed.
///
/// Labels: `direction` ("input" | "output").
pub const TOKENS_TOTAL: &str = "abridge_tokens_total";

/// Total spend recorded by the cost ledger, in micro-USD.
pub const COST_MICRO_USD_TOTAL: &str = "abridge_cost_micro_usd_total";

/// Requests refused before contacting the service because the daily budget is spent.
///
/// Labels: `operation`.
pub const BUDGET_REJECTIONS_TOTAL: &str = "abridge_budget_rejections_total";

/// Total response cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "abridge_cache_hits_total";

/// Total response cache misses.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "abridge_cache_misses_total";

/// Total entries evicted to make room for new ones.
pub const CACHE_EVICTIONS_TOTAL: &str = "abridge_cache_evictions_total";

/// Bytes currently held by the response cache.
pub const CACHE_BYTES: &str = "abridge_cache_bytes";

/// Time spent waiting for a rate-limit permit, in seconds.
pub const RATE_LIMIT_WAIT_SECONDS: &str = "abridge_rate_limit_wait_seconds";

/// Remote calls currently in flight.
pub const IN_FLIGHT: &str = "abridge_in_flight";
