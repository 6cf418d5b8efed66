use serde::{Deserialize, Serialize};

/// Configuration for OpenAI-compatible LLM providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAICompatibleConfig {
    #[serde(rename = "base_url")]
    pub base_url: String,

    #[serde(rename = "llm_api_key")]
    #[serde(default)]
    pub llm_api_key: String,

    pub model: String,

    #[serde(default)]
    pub temperature: Option<f32>,
}

impl OpenAICompatibleConfig {
    fn new(base_url: &str, llm_api_key: String, model: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            llm_api_key,
            model: model.to_string(),
            temperature: None,
        }
    }

    pub fn deepseek_default() -> Self {
        Self::new(
            "https://api.deepseek.com/v1",
            "${DEEPSEEK_API_KEY}".to_string(),
            "deepseek-chat",
        )
    }

    pub fn openai_default() -> Self {
        Self::new("https://api.openai.com/v1", "${OPENAI_API_KEY}".to_string(), "gpt-4o-mini")
    }

    pub fn ollama_default() -> Self {
        // Ollama ignores the key, but the OpenAI route requires a non-empty bearer token
        Self::new("http://localhost:11434/v1", "ollama".to_string(), "qwen2.5")
    }

    /// Built-in settings for providers that work without an explicit entry
    pub fn provider_default(llm_provider: &str) -> Option<Self> {
        match llm_provider {
            "deepseek_llm" => Some(Self::deepseek_default()),
            "openai_llm" => Some(Self::openai_default()),
            "ollama_llm" => Some(Self::ollama_default()),
            _ => None,
        }
    }

    /// Whether the key was never filled in (empty or a leftover ${VAR} placeholder)
    pub fn api_key_missing(&self) -> bool {
        self.llm_api_key.trim().is_empty() || self.llm_api_key.starts_with("${")
    }
}

/// Pool of LLM provider configurations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatelessLLMConfigs {
    #[serde(rename = "deepseek_llm")]
    #[serde(default)]
    pub deepseek_llm: Option<OpenAICompatibleConfig>,

    #[serde(rename = "openai_llm")]
    #[serde(default)]
    pub openai_llm: Option<OpenAICompatibleConfig>,

    #[serde(rename = "openai_compatible_llm")]
    #[serde(default)]
    pub openai_compatible_llm: Option<OpenAICompatibleConfig>,

    #[serde(rename = "ollama_llm")]
    #[serde(default)]
    pub ollama_llm: Option<OpenAICompatibleConfig>,
}

impl StatelessLLMConfigs {
    pub fn get(&self, llm_provider: &str) -> Option<&OpenAICompatibleConfig> {
        match llm_provider {
            "deepseek_llm" => self.deepseek_llm.as_ref(),
            "openai_llm" => self.openai_llm.as_ref(),
            "openai_compatible_llm" => self.openai_compatible_llm.as_ref(),
            "ollama_llm" => self.ollama_llm.as_ref(),
            _ => None,
        }
    }

    /// The provider's entry, materialized from its built-in default when absent
    pub fn get_or_default_mut(&mut self, llm_provider: &str) -> Option<&mut OpenAICompatibleConfig> {
        let slot = match llm_provider {
            "deepseek_llm" => &mut self.deepseek_llm,
            "openai_llm" => &mut self.openai_llm,
            "openai_compatible_llm" => &mut self.openai_compatible_llm,
            "ollama_llm" => &mut self.ollama_llm,
            _ => return None,
        };
        if slot.is_none() {
            *slot = OpenAICompatibleConfig::provider_default(llm_provider);
        }
        slot.as_mut()
    }
}
