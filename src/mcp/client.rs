//! MCP client session: handshake, tool discovery and tool calls.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::protocol::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, McpToolCallResult, McpToolDefinition, ToolCallParams,
    ToolsListResult, MCP_PROTOCOL_VERSION,
};
use super::transport::McpTransport;
use crate::tools::{ToolExecutor, ToolSession};

/// Upper bound on `tools/list` pages, guards against servers that repeat a cursor
const MAX_TOOL_PAGES: usize = 64;

/// One initialized session with an MCP server
pub struct McpClient {
    transport: Arc<dyn McpTransport>,
    server_name: String,
    server_info: Option<InitializeResult>,
}

impl McpClient {
    /// Perform the `initialize` handshake over an open transport
    pub async fn connect(transport: Arc<dyn McpTransport>, server_name: impl Into<String>) -> Result<Self> {
        let mut client = Self {
            transport,
            server_name: server_name.into(),
            server_info: None,
        };
        client.initialize().await?;
        Ok(client)
    }

    async fn initialize(&mut self) -> Result<()> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let response = self
            .transport
            .send(JsonRpcRequest::new("initialize", Some(serde_json::to_value(params)?)))
            .await?;
        let result: InitializeResult = into_result(response, "initialize")?;

        if result.protocol_version != MCP_PROTOCOL_VERSION {
            debug!(
                server = %self.server_name,
                version = %result.protocol_version,
                "MCP server negotiated a different protocol version"
            );
        }

        self.transport
            .notify(JsonRpcNotification::new("notifications/initialized"))
            .await?;

        info!(
            server = %self.server_name,
            remote = result.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or("unknown"),
            "MCP session initialized"
        );
        self.server_info = Some(result);
        Ok(())
    }

    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// List every tool the server offers, following pagination cursors
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let response = self
                .transport
                .send(JsonRpcRequest::new("tools/list", params))
                .await?;
            let page: ToolsListResult = into_result(response, "tools/list")?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => {
                    debug!(server = %self.server_name, count = tools.len(), "Listed MCP tools");
                    return Ok(tools);
                }
            }
        }
        bail!(
            "MCP server '{}' returned more than {} pages of tools",
            self.server_name,
            MAX_TOOL_PAGES
        )
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolCallResult> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let response = self
            .transport
            .send(JsonRpcRequest::new("tools/call", Some(serde_json::to_value(params)?)))
            .await?;
        into_result(response, "tools/call")
    }

    pub async fn close(&self) -> Result<()> {
        debug!(server = %self.server_name, "Closing MCP session");
        self.transport.close().await
    }
}

fn into_result<T: DeserializeOwned>(response: JsonRpcResponse, method: &str) -> Result<T> {
    if let Some(error) = response.error {
        bail!("{} failed: {} (code {})", method, error.message, error.code);
    }
    let result = response
        .result
        .with_context(|| format!("{} response has no result", method))?;
    serde_json::from_value(result).with_context(|| format!("Failed to parse {} response", method))
}

#[async_trait]
impl ToolSession for McpClient {
    fn name(&self) -> &str {
        &self.server_name
    }

    async fn close(&self) -> Result<()> {
        McpClient::close(self).await
    }
}

/// Exposes one remote MCP tool as a local tool executor
pub struct McpToolBridge {
    client: Arc<McpClient>,
    tool_name: String,
}

impl McpToolBridge {
    pub fn new(client: Arc<McpClient>, tool_name: impl Into<String>) -> Self {
        Self {
            client,
            tool_name: tool_name.into(),
        }
    }
}

#[async_trait]
impl ToolExecutor for McpToolBridge {
    async fn call(&self, arguments: Value) -> Result<String> {
        let result = self.client.call_tool(&self.tool_name, arguments).await?;
        let text = result.text();
        if result.is_error {
            bail!("{}", text);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::StreamableHttpTransport;
    use crate::testing::spawn_fake_mcp_server;
    use reqwest::header::HeaderMap;
    use std::time::Duration;

    async fn connected_client() -> (crate::testing::FakeMcpServer, Arc<McpClient>) {
        let server = spawn_fake_mcp_server().await;
        let transport = StreamableHttpTransport::new(
            reqwest::Client::new(),
            &server.http_url(),
            HeaderMap::new(),
            Duration::from_secs(5),
        )
        .expect("valid url");
        let client = McpClient::connect(Arc::new(transport), "rental")
            .await
            .expect("handshake");
        (server, Arc::new(client))
    }

    #[tokio::test]
    async fn handshake_records_server_info() {
        let (_server, client) = connected_client().await;
        let info = client.server_info().expect("initialized");
        assert_eq!(info.protocol_version, MCP_PROTOCOL_VERSION);
        assert_eq!(info.server_info.as_ref().map(|s| s.name.as_str()), Some("fake-rental-gateway"));
    }

    #[tokio::test]
    async fn list_tools_follows_cursor() {
        let (_server, client) = connected_client().await;
        let names: Vec<String> = client
            .list_tools()
            .await
            .expect("tools/list")
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["create_store", "get_all_stores", "fail_tool"]);
    }

    #[tokio::test]
    async fn bridge_returns_tool_text() {
        let (_server, client) = connected_client().await;
        let bridge = McpToolBridge::new(Arc::clone(&client), "create_store");

        let out = bridge
            .call(json!({"tenantId": 7, "name": "X"}))
            .await
            .expect("call succeeds");
        assert_eq!(out, "门店 X 已创建 (tenant 7)");
    }

    #[tokio::test]
    async fn bridge_turns_error_results_into_errors() {
        let (_server, client) = connected_client().await;
        let bridge = McpToolBridge::new(Arc::clone(&client), "fail_tool");

        let err = bridge.call(json!({})).await.expect_err("isError should fail");
        assert!(err.to_string().contains("门店不存在"));
    }

    #[tokio::test]
    async fn rpc_errors_are_reported() {
        let (_server, client) = connected_client().await;
        let err = client
            .call_tool("no_such_tool", json!({}))
            .await
            .expect_err("unknown tool");
        assert!(err.to_string().contains("tools/call failed"));
    }
}
