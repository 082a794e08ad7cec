//! Minimal client for OpenAI-compatible chat completion endpoints.
//!
//! Two call shapes cover everything the collector needs:
//!
//! - [`LlmClient::complete_text`] — single-shot text completion.
//! - [`LlmClient::complete_with_tools`] — one chat turn that may carry text
//!   and/or tool invocations.
//!
//! Transient failures (connection errors, 429, 5xx) are retried with
//! exponential backoff; every call is bounded by a client-level timeout.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_client::{ChatMessage, CompletionOptions, LlmClient};
//!
//! let client = LlmClient::from_env()?;
//! let answer = client
//!     .complete_text("You are terse.", "Say hi.", CompletionOptions::default())
//!     .await?;
//! ```

pub mod error;
pub mod retry;
pub mod schema;
pub mod tool;
pub mod types;

pub use error::{LlmError, Result};
pub use retry::retry_with_backoff;
pub use schema::ToolSchema;
pub use tool::{ErasedTool, Tool, ToolCall, ToolDefinition, ToolError, ToolRegistry};
pub use types::{
    strip_code_blocks, truncate_to_char_boundary, AssistantMessage, ChatMessage,
    CompletionOptions,
};

use std::time::Duration;

use tracing::{debug, warn};

use types::ChatResponseRaw;

/// Maximum attempts per logical call (initial + retries).
const MAX_ATTEMPTS: u32 = 3;

/// Default per-call timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    /// Create a client for the given endpoint and model.
    ///
    /// A trailing `/chat/completions` (or `/chat`) on the base URL is
    /// stripped; the client appends the path itself.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let mut base_url = base_url.into();
        for suffix in ["/chat/completions", "/chat"] {
            if let Some(stripped) = base_url.strip_suffix(suffix) {
                base_url = stripped.to_string();
                break;
            }
        }
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(LlmError::Config("LLM base URL is empty".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url,
            model: model.into(),
        })
    }

    /// Create from `LLM_API_URL`, `LLM_API_KEY` and `LLM_MODEL_NAME`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("LLM_API_URL")
            .map_err(|_| LlmError::Config("LLM_API_URL not set".into()))?;
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| LlmError::Config("LLM_API_KEY not set".into()))?;
        let model = std::env::var("LLM_MODEL_NAME")
            .map_err(|_| LlmError::Config("LLM_MODEL_NAME not set".into()))?;
        Self::new(base_url, api_key, model)
    }

    /// Replace the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single-shot text completion.
    pub async fn complete_text(
        &self,
        system: &str,
        user: &str,
        opts: CompletionOptions,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(user));

        let body = self.build_body(&messages, &[], opts)?;
        let raw = retry_with_backoff(MAX_ATTEMPTS, || self.post_chat(body.clone())).await?;
        Ok(raw.content.unwrap_or_default())
    }

    /// One chat turn that may contain text and/or tool invocations.
    pub async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantMessage> {
        let body = self.build_body(messages, tools, CompletionOptions::default())?;
        let raw = retry_with_backoff(MAX_ATTEMPTS, || self.post_chat(body.clone())).await?;

        let tool_calls = raw
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(AssistantMessage {
            content: raw.content.unwrap_or_default(),
            tool_calls,
        })
    }

    fn build_body(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        opts: CompletionOptions,
    ) -> Result<serde_json::Value> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            let defs: Vec<_> = tools.iter().map(|t| t.to_openai_format()).collect();
            body["tools"] = serde_json::Value::Array(defs);
            body["tool_choice"] = serde_json::json!("auto");
        }
        if let Some(temperature) = opts.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = opts.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        Ok(body)
    }

    async fn post_chat(&self, body: serde_json::Value) -> Result<types::AssistantMessageRaw> {
        debug!(model = %self.model, "sending chat completion request");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %message, "chat completion API error");
            if status.as_u16() == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::Parse("response carried no choices".into()))
    }
}
