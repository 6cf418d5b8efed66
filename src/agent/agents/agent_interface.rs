use async_trait::async_trait;

use crate::agent::input_types::AgentInput;
use crate::error::LlmError;

/// Base interface for all agent implementations
#[async_trait]
pub trait AgentInterface: Send + Sync {
    /// Run one conversational turn and return the raw model output.
    ///
    /// Problems the model can recover from (bad tool arguments, failing tools,
    /// malformed completions) never surface here; only request-level model
    /// failures do.
    async fn invoke(&self, input: AgentInput) -> Result<String, LlmError>;

    /// Release the per-request resources the agent holds
    async fn release(self: Box<Self>);
}
