use serde::{Deserialize, Serialize};

/// One message of the conversation as sent by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "user" or "assistant"; anything else is ignored when building history
    pub role: String,
    pub content: String,
}

#[cfg(test)]
impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Body of `POST /ai/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tenant_id: i64,
    #[serde(default)]
    pub confirmed: bool,
}

/// Tenant scope carried through every invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: i64,
}

impl TenantContext {
    pub fn new(tenant_id: i64) -> Self {
        Self { tenant_id }
    }
}

/// Mutating action proposed by the agent and awaiting user approval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAction {
    pub action_type: String,
    pub action_description: String,
    pub confirm_message: String,
}

/// Response of `POST /ai/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResult {
    pub role: String,
    pub content: String,
    pub requires_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_description: Option<String>,
}

impl ChatResult {
    pub fn answer(content: String) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            requires_confirmation: false,
            action_type: None,
            action_description: None,
        }
    }

    pub fn confirmation(content: String, action: PendingAction) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            requires_confirmation: true,
            action_type: Some(action.action_type),
            action_description: Some(action.action_description),
        }
    }
}
