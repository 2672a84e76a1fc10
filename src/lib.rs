//! Abridge - resilient generation client for document summaries and mindmaps
//!
//! This crate wraps a remote text generation service (Gemini by default)
//! in the machinery needed to call it safely from many concurrent
//! requests: a byte-bounded LRU response cache, a sliding-window rate
//! limiter, a concurrency gate, classified retries with exponential
//! backoff, a daily cost budget and structural validation of mindmap
//! output.
//!
//! # Example
//!
//! ```rust,no_run
//! use abridge::{GeminiGenerator, GenerationClient, RateLimitConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GenerationClient::builder()
//!         .generator(GeminiGenerator::new("your-api-key", "gemini-1.5-flash")?)
//!         .rate_limit(RateLimitConfig::per_minute(60))
//!         .max_in_flight(3)
//!         .build()?;
//!
//!     let summary = client.summarize("Long document text ...").await?;
//!     println!("{}", summary.output.text);
//!
//!     let mindmap = client.generate_mindmap("Long document text ...").await?;
//!     println!("{} nodes", mindmap.output.root.node_count());
//!     Ok(())
//! }
//! ```
//!
//! # Failures
//!
//! Every terminal failure is a [`GenerationFailure`] carrying an
//! [`ErrorKind`], a retryability flag for the end user and the full
//! attempt history.

pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod limits;
pub mod providers;
pub mod telemetry;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use budget::{BudgetConfig, CostEntry, CostLedger, CostOutcome, Pricing};
pub use cache::{CacheConfig, CacheKey, ResponseCache};
pub use config::Config;
pub use error::{AbridgeError, ErrorKind, GenerationFailure, Result};
pub use gateway::{GenerationClient, GenerationClientBuilder, GenerationSettings};
pub use limits::{ConcurrencyGate, GatePermit, RateLimitConfig, RateLimiter};
#[cfg(feature = "gemini")]
pub use providers::GeminiGenerator;
pub use providers::{GenerationParams, MockGenerator, RemoteGenerator, RemoteOutput, RetryConfig};
pub use types::{
    AttemptOutcome, AttemptRecord, Generation, GenerationRequest, MindmapNode, MindmapResult,
    OperationKind, Payload, SummaryResult,
};
pub use validation::{ValidationError, ViolationCode, parse_mindmap, validate_mindmap};
