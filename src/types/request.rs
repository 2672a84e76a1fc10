//! Request types for generation operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Which artifact a request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Summarize,
    Mindmap,
}

impl OperationKind {
    /// Metric/log label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Mindmap => "mindmap",
        }
    }

    /// Whether the output must be parsed and validated as structured data.
    pub fn is_structured(self) -> bool {
        matches!(self, Self::Mindmap)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single logical generation request.
///
/// Immutable once built; the client derives the cache key, prompt and
/// per-attempt parameters from it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    operation: OperationKind,
    source_text: String,
    max_output_tokens: Option<u32>,
    deadline: Option<Instant>,
}

impl GenerationRequest {
    /// Create a request for the given operation over `source_text`.
    pub fn new(operation: OperationKind, source_text: impl Into<String>) -> Self {
        Self {
            operation,
            source_text: source_text.into(),
            max_output_tokens: None,
            deadline: None,
        }
    }

    /// Summary request.
    pub fn summarize(source_text: impl Into<String>) -> Self {
        Self::new(OperationKind::Summarize, source_text)
    }

    /// Mindmap request.
    pub fn mindmap(source_text: impl Into<String>) -> Self {
        Self::new(OperationKind::Mindmap, source_text)
    }

    /// Override the configured output token ceiling.
    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.max_output_tokens = Some(n);
        self
    }

    /// Caller deadline. Waiting for permits and backoff sleeps give up once
    /// it passes; an in-flight call is cut off at whichever comes first, the
    /// deadline or the per-operation timeout.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn requested_max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }

    pub fn caller_deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
