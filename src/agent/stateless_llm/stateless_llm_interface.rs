use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call proposed by the model.
/// Arguments stay as raw JSON text; the agent decides what to do when they don't parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A message in the model's context window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: Option<String>,
    pub tool_calls: Vec<LlmToolCall>,
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(LlmRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(LlmRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(LlmRole::Assistant, content)
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<LlmToolCall>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: LlmRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Function definition advertised to the model
#[derive(Debug, Clone, PartialEq)]
pub struct LlmToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One model reply: either final text, tool calls, or both
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<LlmToolCall>,
}

#[cfg(test)]
impl LlmCompletion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Interface for a stateless language model
/// Stateless means the LLM doesn't store memory, system prompts, or user messages
#[async_trait]
pub trait StatelessLLMInterface: Send + Sync {
    /// Generate one chat completion for the full message list
    async fn chat_completion(
        &self,
        messages: &[LlmMessage],
        tools: &[LlmToolSpec],
    ) -> Result<LlmCompletion, LlmError>;

    fn model(&self) -> &str;
}
