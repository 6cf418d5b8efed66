use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors raised while talking to the language model
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model API credential is not configured for provider {provider}")]
    MissingCredential { provider: String },

    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The model answered, but the answer could not be understood.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

impl LlmError {
    /// Malformed output is recovered by the agent; everything else fails the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LlmError::MalformedOutput(_))
    }
}

/// Errors raised while discovering tools for a request
#[derive(Debug, Error)]
pub enum ToolRegistryError {
    #[error("failed to load tool server configuration from {path}: {message}")]
    Config { path: String, message: String },

    #[error("failed to connect to tool server '{server}': {message}")]
    Connection { server: String, message: String },
}

/// Request-level failures of the chat endpoint
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("messages must contain at least one entry")]
    EmptyMessages,

    #[error(transparent)]
    ToolRegistry(#[from] ToolRegistryError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::EmptyMessages => StatusCode::BAD_REQUEST,
            ChatError::ToolRegistry(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::Llm(LlmError::MissingCredential { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::Llm(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::EmptyMessages => "invalid_request",
            ChatError::ToolRegistry(_) => "tool_registry_unavailable",
            ChatError::Llm(LlmError::MissingCredential { .. }) => "configuration_error",
            ChatError::Llm(_) => "model_unavailable",
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "Chat request failed");
        }

        (
            status,
            Json(json!({
                "error": self.to_string(),
                "kind": self.kind()
            })),
        )
            .into_response()
    }
}
