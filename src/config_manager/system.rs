use serde::{Deserialize, Serialize};
use std::time::Duration;

/// System configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// File listing the MCP servers to discover tools from
    #[serde(rename = "mcp_config_path")]
    #[serde(default = "default_mcp_config_path")]
    pub mcp_config_path: String,

    #[serde(rename = "request_timeout_secs")]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(rename = "mcp_request_timeout_secs")]
    #[serde(default = "default_mcp_request_timeout_secs")]
    pub mcp_request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8280
}

fn default_mcp_config_path() -> String {
    "server_config.json".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_mcp_request_timeout_secs() -> u64 {
    30
}

impl SystemConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn mcp_request_timeout(&self) -> Duration {
        Duration::from_secs(self.mcp_request_timeout_secs)
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mcp_config_path: default_mcp_config_path(),
            request_timeout_secs: default_request_timeout_secs(),
            mcp_request_timeout_secs: default_mcp_request_timeout_secs(),
        }
    }
}
