//! Abridge error types and failure classification.
//!
//! [`AbridgeError`] describes *what* went wrong in raw terms (a status code,
//! a transport failure, a parse error). [`ErrorKind`] is the closed taxonomy
//! the retry loop and callers reason about; [`AbridgeError::kind()`] maps one
//! onto the other.

use std::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{AttemptRecord, OperationKind};
use crate::validation::ValidationError;

/// Closed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Timeout,
    TransientServiceError,
    AuthError,
    QuotaExceeded,
    MalformedOutput,
    ValidationFailed,
    Fatal,
}

impl ErrorKind {
    /// Whether failures of this kind are retried by the generation client.
    ///
    /// `MalformedOutput` is only retried for structured (mindmap) requests;
    /// see [`ErrorKind::is_retryable_for()`].
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout | Self::TransientServiceError | Self::MalformedOutput
        )
    }

    /// Retryability for a specific operation.
    pub fn is_retryable_for(self, operation: OperationKind) -> bool {
        match self {
            Self::MalformedOutput => operation.is_structured(),
            other => other.is_retryable(),
        }
    }

    /// Stable machine-readable code, suitable for API responses and logs.
    pub fn code(self) -> &'static str {
        match self {
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::TransientServiceError => "API_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::MalformedOutput => "PARSING_ERROR",
            Self::ValidationFailed => "VALIDATION_ERROR",
            Self::Fatal => "INTERNAL_ERROR",
        }
    }

    /// Suggested HTTP status for an outer API layer.
    pub fn http_status(self) -> u16 {
        match self {
            Self::RateLimited | Self::QuotaExceeded => 429,
            Self::Timeout => 504,
            Self::TransientServiceError | Self::MalformedOutput => 502,
            Self::AuthError => 401,
            Self::ValidationFailed => 422,
            Self::Fatal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Abridge error types
#[derive(Debug, thiserror::Error)]
pub enum AbridgeError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Raised before any remote call when the daily budget is spent.
    #[error("daily budget exhausted: spent ${spent} of ${limit}")]
    BudgetExhausted { spent: Decimal, limit: Decimal },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The caller's deadline elapsed while waiting for capacity.
    #[error("cancelled: {0}")]
    Cancelled(String),

    // Output errors
    #[error("empty response from model")]
    EmptyResponse,

    #[error("malformed output: {0}")]
    MalformedOutput(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mindmap validation failed: {0}")]
    Validation(#[from] ValidationError),

    // Local errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AbridgeError {
    /// Classify this failure into the closed [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_) | Self::EmptyResponse => ErrorKind::TransientServiceError,
            Self::Api { status, message } => classify_status(*status, message),
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::AuthenticationFailed => ErrorKind::AuthError,
            Self::QuotaExceeded(_) | Self::BudgetExhausted { .. } => ErrorKind::QuotaExceeded,
            Self::Timeout { .. } | Self::Cancelled(_) => ErrorKind::Timeout,
            Self::MalformedOutput(_) | Self::Json(_) => ErrorKind::MalformedOutput,
            Self::Validation(_) => ErrorKind::ValidationFailed,
            Self::InvalidInput(_) | Self::Configuration(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the retry loop may attempt this request again.
    ///
    /// Cancellation is classified as `Timeout` but is never retried: the
    /// caller's deadline has already passed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled(_)) && self.kind().is_retryable()
    }

    /// Whether this failure may be retried for `operation`.
    pub fn is_retryable_for(&self, operation: OperationKind) -> bool {
        !matches!(self, Self::Cancelled(_)) && self.kind().is_retryable_for(operation)
    }

    /// Provider-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Map a non-2xx HTTP status (and its body) onto an [`ErrorKind`].
fn classify_status(status: u16, message: &str) -> ErrorKind {
    let lower = message.to_ascii_lowercase();
    match status {
        429 if lower.contains("quota") && !lower.contains("per minute") => {
            ErrorKind::QuotaExceeded
        }
        429 => ErrorKind::RateLimited,
        401 | 403 => ErrorKind::AuthError,
        408 | 504 => ErrorKind::Timeout,
        400 if lower.contains("api key") => ErrorKind::AuthError,
        400 if lower.contains("resource_exhausted") || lower.contains("quota") => {
            ErrorKind::QuotaExceeded
        }
        500..=599 => ErrorKind::TransientServiceError,
        _ => ErrorKind::Fatal,
    }
}

#[cfg(feature = "gemini")]
impl From<reqwest::Error> for AbridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AbridgeError::Timeout {
                operation: "http request",
                after: Duration::ZERO,
            }
        } else if err.is_decode() {
            AbridgeError::MalformedOutput(err.to_string())
        } else {
            AbridgeError::Http(err.to_string())
        }
    }
}

/// Terminal failure of a logical generation request.
///
/// Carries the classified kind, whether the end user may usefully retry,
/// and every attempt made before giving up.
#[derive(Debug, thiserror::Error)]
#[error("{kind} after {} attempt(s): {source}", attempts.len())]
pub struct GenerationFailure {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub attempts: Vec<AttemptRecord>,
    #[source]
    pub source: AbridgeError,
}

impl GenerationFailure {
    pub(crate) fn new(
        operation: OperationKind,
        source: AbridgeError,
        attempts: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            kind: source.kind(),
            retryable: source.is_retryable_for(operation),
            attempts,
            source,
        }
    }

    /// Human-readable message describing the last failure.
    pub fn message(&self) -> String {
        self.source.to_string()
    }
}

/// Result type alias for Abridge operations
pub type Result<T> = std::result::Result<T, AbridgeError>;
