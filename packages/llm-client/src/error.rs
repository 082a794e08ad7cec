//! Error types for the LLM client.

use thiserror::Error;

/// Result type for LLM client operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors returned by the LLM client.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Configuration error (missing API key, invalid base URL)
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection-level failure (DNS, reset, TLS)
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded the per-call timeout
    #[error("request timed out")]
    Timeout,

    /// HTTP 429 from the endpoint
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-2xx response other than 429
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("parse error: {0}")]
    Parse(String),
}

impl LlmError {
    /// Whether a retry with backoff is worthwhile.
    ///
    /// Connection failures, timeouts, 429 and 5xx are transient; everything
    /// else (auth failures, malformed requests, parse errors) is permanent.
    pub fn is_retriable(&self) -> bool {
        match self {
            LlmError::Network(_) | LlmError::Timeout | LlmError::RateLimited(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}
