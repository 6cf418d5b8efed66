use std::sync::Arc;
use tracing::{info, warn};
use anyhow::Result;

use crate::agent::stateless_llm::StatelessLLMInterface;
use crate::agent::stateless_llm::openai_compatible_llm::OpenAICompatibleLLM;
use crate::config_manager::stateless_llm::{OpenAICompatibleConfig, StatelessLLMConfigs};

/// Factory for creating stateless LLM instances
pub struct StatelessLLMFactory;

impl StatelessLLMFactory {
    /// Create an LLM based on the configuration.
    ///
    /// # Arguments
    /// * `llm_provider` - The configured provider name
    /// * `llm_configs` - Pool of LLM configurations
    /// * `client` - Shared HTTP client
    pub fn create_llm(
        llm_provider: &str,
        llm_configs: &StatelessLLMConfigs,
        client: reqwest::Client,
    ) -> Result<Arc<dyn StatelessLLMInterface>> {
        info!("Initializing LLM: {}", llm_provider);

        match llm_provider {
            "deepseek_llm" | "openai_llm" | "openai_compatible_llm" | "ollama_llm" => {
                let config = llm_configs
                    .get(llm_provider)
                    .cloned()
                    .or_else(|| OpenAICompatibleConfig::provider_default(llm_provider))
                    .ok_or_else(|| anyhow::anyhow!("Configuration not found for LLM provider: {}", llm_provider))?;

                // Reported per request so the service can still start and answer health checks
                if config.api_key_missing() {
                    warn!("No API key configured for {}", llm_provider);
                }

                Ok(Arc::new(OpenAICompatibleLLM::new(
                    client,
                    llm_provider.to_string(),
                    config.model,
                    config.base_url,
                    config.llm_api_key,
                    config.temperature,
                )))
            }
            _ => Err(anyhow::anyhow!("Unsupported LLM provider: {}", llm_provider)),
        }
    }
}
