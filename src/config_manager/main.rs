use anyhow::Context;
use serde::{Deserialize, Serialize};
use crate::config_manager::agent::AgentConfig;
use crate::config_manager::system::SystemConfig;

/// Main configuration for the application (JSON-LD, JSON or YAML)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "@context")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,

    #[serde(rename = "system_config")]
    #[serde(default)]
    pub system_config: SystemConfig,

    #[serde(rename = "agent_config")]
    #[serde(default)]
    pub agent_config: AgentConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        use crate::config_manager::utils::read_config_value;
        let json_value = read_config_value(path)?;
        let config: Config = serde_json::from_value(json_value)
            .with_context(|| format!("Invalid configuration in {}", path))?;
        anyhow::ensure!(
            config.agent_config.max_iterations > 0,
            "agent_config.max_iterations must be at least 1 in {}",
            path
        );
        Ok(config)
    }

    /// Apply deployment overrides: PORT, MCP_CONFIG_PATH, DEEPSEEK_API_KEY, LLM_API_KEY
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.system_config.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value: {}", port),
            }
        }

        if let Some(path) = lookup("MCP_CONFIG_PATH") {
            self.system_config.mcp_config_path = path;
        }

        let configs = &mut self.agent_config.llm_configs;
        if let Some(key) = lookup("DEEPSEEK_API_KEY") {
            if let Some(deepseek) = configs.get_or_default_mut("deepseek_llm") {
                if deepseek.api_key_missing() {
                    deepseek.llm_api_key = key;
                }
            }
        }

        if let Some(key) = lookup("LLM_API_KEY") {
            if let Some(selected) = configs.get_or_default_mut(&self.agent_config.llm_provider) {
                if selected.api_key_missing() {
                    selected.llm_api_key = key;
                }
            }
        }
    }
}
