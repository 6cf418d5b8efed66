use tracing::debug;

use crate::agent::agents::{AgentInterface, ToolCallingAgent};
use crate::agent::prompts::default_system_prompt;
use crate::conversations::types::TenantContext;
use crate::error::ToolRegistryError;
use crate::state::AppState;

/// Factory for creating agent instances
pub struct AgentFactory;

impl AgentFactory {
    /// Build a fresh agent for one request.
    ///
    /// Tools are discovered for the tenant on every call; the returned agent
    /// owns them until it is released.
    pub async fn create_agent(
        state: &AppState,
        tenant: &TenantContext,
    ) -> Result<Box<dyn AgentInterface>, ToolRegistryError> {
        let tools = state.tool_provider.acquire(tenant).await?;
        debug!(tenant_id = tenant.tenant_id, tools = tools.len(), "Creating agent");

        let agent_config = &state.config.agent_config;
        let system_prompt = agent_config
            .system_prompt
            .clone()
            .unwrap_or_else(default_system_prompt);

        Ok(Box::new(ToolCallingAgent::new(
            state.llm.clone(),
            tools,
            state.tool_policy.clone(),
            system_prompt,
            agent_config.max_iterations,
        )))
    }
}
