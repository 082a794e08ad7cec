//! Tool-calling traits and dispatch.
//!
//! Tools have typed arguments and outputs with schemas derived from the
//! argument struct. A registry keyed by name gives the agent runtime one
//! uniform `(args_json) -> result_json` dispatch surface.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::schema::ToolSchema;

/// A tool callable by the model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    const NAME: &'static str;

    /// Argument type; must derive `Deserialize` and `JsonSchema`.
    type Args: DeserializeOwned + JsonSchema + Send;

    /// Output type; must derive `Serialize`.
    type Output: Serialize + Send;

    /// Error type for this tool.
    type Error: std::error::Error + Send + Sync + 'static;

    /// What this tool does, as shown to the model.
    fn description(&self) -> &str;

    /// Execute the tool.
    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error>;

    /// The definition sent to the endpoint.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: self.description().to_string(),
            parameters: Self::Args::tool_schema(),
        }
    }
}

/// Tool definition: name, description and argument schema.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Convert to the OpenAI wire format.
    pub fn to_openai_format(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Call id, echoed back in the tool-result message.
    pub id: String,

    /// Name of the tool to invoke.
    pub name: String,

    /// Arguments as a raw JSON string.
    pub arguments: String,
}

impl ToolCall {
    /// Decode the arguments into a typed struct.
    pub fn parse_args<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// Error type for erased tool dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to parse arguments: {0}")]
    ArgumentParse(String),

    #[error("tool execution failed: {0}")]
    Execution(String),

    #[error("failed to serialize output: {0}")]
    OutputSerialize(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Type-erased tool for heterogeneous collections.
#[async_trait]
pub trait ErasedTool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    /// Execute with JSON-string arguments, returning JSON-string output.
    async fn call_erased(&self, arguments: &str) -> Result<String, ToolError>;
}

#[async_trait]
impl<T: Tool> ErasedTool for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn definition(&self) -> ToolDefinition {
        Tool::definition(self)
    }

    async fn call_erased(&self, arguments: &str) -> Result<String, ToolError> {
        // Models occasionally send no-argument calls as "" instead of "{}".
        let trimmed = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        let args: T::Args = serde_json::from_str(trimmed)
            .map_err(|e| ToolError::ArgumentParse(e.to_string()))?;

        let output = self
            .call(args)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        serde_json::to_string(&output).map_err(|e| ToolError::OutputSerialize(e.to_string()))
    }
}

/// Registry of tools keyed by name.
///
/// Registration order is preserved so definitions reach the model in a
/// stable order.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ErasedTool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Re-registering a name replaces the previous entry.
    pub fn register<T: Tool + 'static>(mut self, tool: T) -> Self {
        let name = T::NAME.to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ErasedTool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Dispatch a call by name, converting every failure into a `ToolError`.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.call_erased(arguments).await
    }
}
