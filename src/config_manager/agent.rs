use serde::{Deserialize, Serialize};
use crate::config_manager::stateless_llm::{OpenAICompatibleConfig, StatelessLLMConfigs};

/// Configuration for the tool-calling agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(rename = "llm_provider")]
    #[serde(default = "default_llm_provider")]
    pub llm_provider: String, // "deepseek_llm", "openai_llm", "openai_compatible_llm", "ollama_llm"

    /// Upper bound on model round trips within one turn
    #[serde(rename = "max_iterations")]
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Replaces the built-in system instruction when set
    #[serde(rename = "system_prompt")]
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Regex patterns of tool names that always need user confirmation
    #[serde(rename = "always_confirm_tools")]
    #[serde(default)]
    pub always_confirm_tools: Vec<String>,

    #[serde(rename = "llm_configs")]
    #[serde(default = "default_llm_configs")]
    pub llm_configs: StatelessLLMConfigs,
}

fn default_llm_provider() -> String {
    "deepseek_llm".to_string()
}

fn default_max_iterations() -> usize {
    15
}

fn default_llm_configs() -> StatelessLLMConfigs {
    StatelessLLMConfigs {
        deepseek_llm: Some(OpenAICompatibleConfig::deepseek_default()),
        ..StatelessLLMConfigs::default()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm_provider: default_llm_provider(),
            max_iterations: default_max_iterations(),
            system_prompt: None,
            always_confirm_tools: Vec::new(),
            llm_configs: default_llm_configs(),
        }
    }
}
