//! The outbound generation capability.
//!
//! # Example
//!
//! ```ignore
//! struct Canned;
//!
//! #[async_trait]
//! impl RemoteGenerator for Canned {
//!     fn name(&self) -> &str {
//!         "canned"
//!     }
//!
//!     async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<RemoteOutput> {
//!         Ok(RemoteOutput::new("• a\n• b", 10, 4))
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Per-attempt generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Sampling temperature (0.0 to 1.0).
    pub temperature: f32,
    /// Ceiling on generated tokens.
    pub max_output_tokens: u32,
    /// Hard deadline for this call.
    pub timeout: Duration,
    /// Ask the service for a JSON response body.
    pub json_output: bool,
}

/// Raw text returned by the service plus token usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

impl RemoteOutput {
    pub fn new(text: impl Into<String>, tokens_in: u64, tokens_out: u64) -> Self {
        Self {
            text: text.into(),
            tokens_in,
            tokens_out,
        }
    }
}

/// A remote text generation service.
///
/// Implementations perform exactly one call per invocation: no retries,
/// no caching, no rate limiting. The generation client layers those on.
#[async_trait]
pub trait RemoteGenerator: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Generate text for `prompt`.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<RemoteOutput>;
}

#[async_trait]
impl<T: RemoteGenerator + ?Sized> RemoteGenerator for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<RemoteOutput> {
        (**self).generate(prompt, params).await
    }
}
