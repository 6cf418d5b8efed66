use std::sync::Arc;

use crate::agent::stateless_llm::StatelessLLMInterface;
use crate::agent::stateless_llm_factory::StatelessLLMFactory;
use crate::agent::tool_policy::{build_policy, ToolConfirmationPolicy};
use crate::config_manager::Config;
use crate::mcp::McpToolRegistryProvider;
use crate::tools::ToolRegistryProvider;

/// Shared, read-only state. Per-request resources are never stored here.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<dyn StatelessLLMInterface>,
    pub tool_provider: Arc<dyn ToolRegistryProvider>,
    pub tool_policy: Arc<dyn ToolConfirmationPolicy>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.system_config.request_timeout())
            .build()?;

        let agent_config = &config.agent_config;
        let llm = StatelessLLMFactory::create_llm(&agent_config.llm_provider, &agent_config.llm_configs, client)?;
        let tool_policy = build_policy(&agent_config.always_confirm_tools)?;
        let tool_provider = Arc::new(McpToolRegistryProvider::new(
            config.system_config.mcp_config_path.clone(),
            config.system_config.mcp_request_timeout(),
        ));

        Ok(Self {
            config: Arc::new(config),
            llm,
            tool_provider,
            tool_policy,
        })
    }

    /// Assemble state from explicit components
    #[cfg(test)]
    pub fn with_components(
        config: Config,
        llm: Arc<dyn StatelessLLMInterface>,
        tool_provider: Arc<dyn ToolRegistryProvider>,
        tool_policy: Arc<dyn ToolConfirmationPolicy>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            llm,
            tool_provider,
            tool_policy,
        }
    }
}
