//! Tool registry backed by the MCP servers listed in the server configuration file.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::client::{McpClient, McpToolBridge};
use super::protocol::McpToolDefinition;
use super::transport::{McpTransport, SseTransport, StdioTransport, StreamableHttpTransport};
use crate::config_manager::utils::read_config_value;
use crate::conversations::types::TenantContext;
use crate::error::ToolRegistryError;
use crate::tools::{ToolDefinition, ToolRegistry, ToolRegistryProvider};

pub const TENANT_HEADER: &str = "x-tenant-id";

/// How to reach one MCP server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "transport")]
pub enum McpServerSpec {
    #[serde(rename = "sse")]
    Sse {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    #[serde(rename = "streamable_http", alias = "http")]
    StreamableHttp {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    #[serde(rename = "stdio")]
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

/// `{"mcpServers": {"<name>": {...}}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServersFile {
    #[serde(rename = "mcpServers", default)]
    pub servers: BTreeMap<String, McpServerSpec>,
}

/// Load the server list. Servers are kept in name order so tool registration is stable.
pub fn load_servers(path: &str) -> Result<BTreeMap<String, McpServerSpec>, ToolRegistryError> {
    let config_error = |message: String| ToolRegistryError::Config {
        path: path.to_string(),
        message,
    };
    let value = read_config_value(path).map_err(|e| config_error(format!("{:#}", e)))?;
    let file: McpServersFile = serde_json::from_value(value).map_err(|e| config_error(e.to_string()))?;
    Ok(file.servers)
}

/// Configured headers plus the tenant header
fn tenant_headers(
    configured: &HashMap<String, String>,
    tenant: &TenantContext,
) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in configured {
        headers.insert(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }
    headers.insert(TENANT_HEADER, HeaderValue::from_str(&tenant.tenant_id.to_string())?);
    Ok(headers)
}

/// Connects to every configured MCP server for each request
pub struct McpToolRegistryProvider {
    servers_path: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl McpToolRegistryProvider {
    pub fn new(servers_path: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            servers_path: servers_path.into(),
            http: reqwest::Client::new(),
            request_timeout,
        }
    }

    async fn connect_server(
        &self,
        name: &str,
        spec: &McpServerSpec,
        tenant: &TenantContext,
    ) -> anyhow::Result<McpClient> {
        let transport: Arc<dyn McpTransport> = match spec {
            McpServerSpec::Sse { url, headers } => Arc::new(
                SseTransport::connect(
                    self.http.clone(),
                    url,
                    tenant_headers(headers, tenant)?,
                    self.request_timeout,
                )
                .await?,
            ),
            McpServerSpec::StreamableHttp { url, headers } => Arc::new(StreamableHttpTransport::new(
                self.http.clone(),
                url,
                tenant_headers(headers, tenant)?,
                self.request_timeout,
            )?),
            McpServerSpec::Stdio { command, args, env } => Arc::new(StdioTransport::spawn(
                command,
                args,
                env,
                self.request_timeout,
            )?),
        };
        McpClient::connect(transport, name).await
    }

    async fn discover(
        &self,
        name: &str,
        spec: &McpServerSpec,
        tenant: &TenantContext,
    ) -> Result<(Arc<McpClient>, Vec<McpToolDefinition>), ToolRegistryError> {
        let connection_error = |e: anyhow::Error| ToolRegistryError::Connection {
            server: name.to_string(),
            message: format!("{:#}", e),
        };

        let client = Arc::new(self.connect_server(name, spec, tenant).await.map_err(connection_error)?);
        match client.list_tools().await {
            Ok(tools) => {
                let remote_version = client
                    .server_info()
                    .and_then(|info| info.server_info.as_ref())
                    .and_then(|server| server.version.as_deref())
                    .unwrap_or("unknown");
                debug!(
                    server = %name,
                    version = remote_version,
                    tools = tools.len(),
                    "Discovered MCP tools"
                );
                Ok((client, tools))
            }
            Err(e) => {
                let _ = client.close().await;
                Err(connection_error(e))
            }
        }
    }
}

#[async_trait]
impl ToolRegistryProvider for McpToolRegistryProvider {
    async fn acquire(&self, tenant: &TenantContext) -> Result<ToolRegistry, ToolRegistryError> {
        let servers = load_servers(&self.servers_path)?;
        let results = join_all(
            servers
                .iter()
                .map(|(name, spec)| self.discover(name, spec, tenant)),
        )
        .await;

        let mut registry = ToolRegistry::new();
        let mut first_error = None;
        for result in results {
            match result {
                Ok((client, tools)) => {
                    for tool in tools {
                        let definition = ToolDefinition {
                            name: tool.name.clone(),
                            description: tool.description.unwrap_or_default(),
                            input_schema: tool.input_schema,
                        };
                        let executor = Arc::new(McpToolBridge::new(Arc::clone(&client), tool.name));
                        registry.register(definition, executor);
                    }
                    registry.attach_session(client);
                }
                Err(e) => {
                    warn!("{}", e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        // All servers or nothing: close whatever did connect
        if let Some(e) = first_error {
            registry.release().await;
            return Err(e);
        }

        if registry.is_empty() {
            warn!(path = %self.servers_path, "No MCP tools available, agent will run without tools");
        }

        info!(
            tenant_id = tenant.tenant_id,
            servers = servers.len(),
            tools = registry.len(),
            "Tool registry ready"
        );
        Ok(registry)
    }
}
