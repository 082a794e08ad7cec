//! Language-model seam.
//!
//! The orchestrator and agent runtime talk to [`LanguageModel`] so tests can
//! substitute scripted models. The production impl wraps [`LlmClient`] and
//! bounds process-wide LLM concurrency with a semaphore.

use std::sync::Arc;

use async_trait::async_trait;
use llm_client::{
    AssistantMessage, ChatMessage, CompletionOptions, LlmClient, LlmError, ToolDefinition,
};
use tokio::sync::Semaphore;

use crate::config::CollectorConfig;

/// Chat-completion capability used across the pipeline.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Single-shot text completion.
    async fn complete_text(
        &self,
        system: &str,
        user: &str,
        opts: CompletionOptions,
    ) -> Result<String, LlmError>;

    /// One chat turn that may carry tool invocations.
    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantMessage, LlmError>;
}

/// Production model: an [`LlmClient`] behind the process-wide semaphore.
pub struct SharedModel {
    client: LlmClient,
    semaphore: Arc<Semaphore>,
}

impl SharedModel {
    pub fn new(client: LlmClient, max_concurrency: usize) -> Self {
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    pub fn from_config(config: &CollectorConfig) -> Result<Self, LlmError> {
        let client = LlmClient::new(
            config.llm_api_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model_name.clone(),
        )?
        .with_timeout(config.llm_timeout)?;
        Ok(Self::new(client, config.llm_max_concurrency))
    }
}

#[async_trait]
impl LanguageModel for SharedModel {
    async fn complete_text(
        &self,
        system: &str,
        user: &str,
        opts: CompletionOptions,
    ) -> Result<String, LlmError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| LlmError::Config("LLM semaphore closed".into()))?;
        self.client.complete_text(system, user, opts).await
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantMessage, LlmError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| LlmError::Config("LLM semaphore closed".into()))?;
        self.client.complete_with_tools(messages, tools).await
    }
}
