//! Collector error taxonomy.
//!
//! Every variant carries a stable kind string surfaced in task error logs
//! and a human-readable message.

use llm_client::LlmError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollectError>;

#[derive(Debug, Error)]
pub enum CollectError {
    /// Connection-level failure talking to the LLM or a site
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// The LLM endpoint returned 429
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The model broke an output contract (non-JSON where JSON required)
    #[error("llm contract violation: {0}")]
    LlmContract(String),

    /// A page failed to load (timeout, DNS, TLS, non-2xx)
    #[error("page load failed: {0}")]
    PageLoad(String),

    /// The agent invoked an unknown tool or sent malformed arguments
    #[error("tool usage error: {0}")]
    ToolUsage(String),

    /// The agent ran out of turns
    #[error("turn budget exhausted")]
    LimitExhausted,

    /// Cooperative cancellation was observed
    #[error("cancelled")]
    Cancelled,

    /// Anything unexpected; fails the task
    #[error("internal error: {0}")]
    Internal(String),
}

impl CollectError {
    /// Stable kind string recorded in error logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectError::TransientNetwork(_) => "transient_network",
            CollectError::RateLimited(_) => "rate_limited",
            CollectError::LlmContract(_) => "llm_contract",
            CollectError::PageLoad(_) => "page_load",
            CollectError::ToolUsage(_) => "tool_usage",
            CollectError::LimitExhausted => "limit_exhausted",
            CollectError::Cancelled => "cancelled",
            CollectError::Internal(_) => "internal",
        }
    }

    /// One-line form for error logs: `kind: message`.
    pub fn log_line(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

impl From<LlmError> for CollectError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited(msg) => CollectError::RateLimited(msg),
            LlmError::Network(msg) => CollectError::TransientNetwork(msg),
            LlmError::Timeout => CollectError::TransientNetwork("LLM call timed out".into()),
            LlmError::Api { status, message } if status >= 500 => {
                CollectError::TransientNetwork(format!("HTTP {status}: {message}"))
            }
            LlmError::Parse(msg) => CollectError::LlmContract(msg),
            other => CollectError::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for CollectError {
    fn from(err: anyhow::Error) -> Self {
        CollectError::Internal(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(CollectError::PageLoad("x".into()).kind(), "page_load");
        assert_eq!(CollectError::LimitExhausted.kind(), "limit_exhausted");
        assert_eq!(CollectError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_llm_error_mapping() {
        let e: CollectError = LlmError::RateLimited("busy".into()).into();
        assert_eq!(e.kind(), "rate_limited");

        let e: CollectError = LlmError::Api {
            status: 503,
            message: "down".into(),
        }
        .into();
        assert_eq!(e.kind(), "transient_network");

        let e: CollectError = LlmError::Parse("bad json".into()).into();
        assert_eq!(e.kind(), "llm_contract");

        let e: CollectError = LlmError::Api {
            status: 401,
            message: "no".into(),
        }
        .into();
        assert_eq!(e.kind(), "internal");
    }
}
