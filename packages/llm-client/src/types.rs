//! Chat completion request and response types.

use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// One message in a chat conversation.
///
/// Covers all four roles used by the tool-calling loop; the optional fields
/// serialize only when present, so the same type maps onto the wire shape of
/// plain text turns, assistant turns carrying tool calls, and tool results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", "assistant" or "tool"
    pub role: String,

    /// Textual content (may be empty for assistant turns that only call tools)
    pub content: String,

    /// Tool invocations attached to an assistant turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallData>>,

    /// For role "tool": the id of the call this message answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    /// A tool-result message answering the call with the given id.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Wire format of one tool call inside an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallData {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCallData,
}

/// Function name + JSON-encoded arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

/// A parsed assistant turn: text and/or tool invocations.
#[derive(Debug, Clone)]
pub struct AssistantMessage {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantMessage {
    /// Whether this turn requested any tool execution.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Rebuild the wire-shaped message for appending to the conversation.
    pub fn to_chat_message(&self) -> ChatMessage {
        let tool_calls = if self.tool_calls.is_empty() {
            None
        } else {
            Some(
                self.tool_calls
                    .iter()
                    .map(|tc| ToolCallData {
                        id: tc.id.clone(),
                        call_type: "function".to_string(),
                        function: FunctionCallData {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
            )
        };
        ChatMessage {
            role: "assistant".to_string(),
            content: self.content.clone(),
            tool_calls,
            tool_call_id: None,
        }
    }
}

/// Sampling options for a completion call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

// Raw response shapes for internal parsing.

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseRaw {
    pub choices: Vec<ChatChoiceRaw>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceRaw {
    pub message: AssistantMessageRaw,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssistantMessageRaw {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallData>>,
}

/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences from a model response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
