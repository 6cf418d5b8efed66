//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::agent::stateless_llm::{
    LlmCompletion, LlmMessage, LlmToolCall, LlmToolSpec, StatelessLLMInterface,
};
use crate::agent::tool_policy::ModelReportedOnly;
use crate::config_manager::Config;
use crate::conversations::types::TenantContext;
use crate::error::{LlmError, ToolRegistryError};
use crate::state::AppState;
use crate::tools::{ToolDefinition, ToolExecutor, ToolRegistry, ToolRegistryProvider, ToolSession};

/// Serve a router on an ephemeral local port
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    ToolCalls(Vec<LlmToolCall>),
    /// The model answered with something unparseable
    Malformed,
    /// The model API is down
    Unavailable,
}

impl ScriptedReply {
    pub fn text(content: impl Into<String>) -> Self {
        ScriptedReply::Text(content.into())
    }

    pub fn call(id: &str, name: &str, arguments: &str) -> LlmToolCall {
        LlmToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Self {
        ScriptedReply::ToolCalls(vec![Self::call(id, name, arguments)])
    }
}

/// Model that plays back canned replies and records what it was sent.
/// The last reply repeats once the script runs out.
pub struct ScriptedLLM {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<Vec<LlmMessage>>>,
}

impl ScriptedLLM {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<LlmMessage>> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        let mut replies = self.replies.lock().expect("replies lock");
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

#[async_trait]
impl StatelessLLMInterface for ScriptedLLM {
    async fn chat_completion(
        &self,
        messages: &[LlmMessage],
        _tools: &[LlmToolSpec],
    ) -> Result<LlmCompletion, LlmError> {
        self.requests.lock().expect("requests lock").push(messages.to_vec());
        match self.next_reply() {
            Some(ScriptedReply::Text(text)) => Ok(LlmCompletion::text(text)),
            Some(ScriptedReply::ToolCalls(tool_calls)) => Ok(LlmCompletion {
                content: None,
                tool_calls,
            }),
            Some(ScriptedReply::Malformed) => Err(LlmError::MalformedOutput("response has no choices".into())),
            Some(ScriptedReply::Unavailable) => Err(LlmError::Status {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "overloaded".into(),
            }),
            None => Err(LlmError::MalformedOutput("script exhausted".into())),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Returns its arguments
pub struct EchoTool;

#[async_trait]
impl ToolExecutor for EchoTool {
    async fn call(&self, arguments: Value) -> Result<String> {
        Ok(format!("echo: {}", arguments))
    }
}

/// Always fails with the given message
pub struct FailingTool(pub &'static str);

#[async_trait]
impl ToolExecutor for FailingTool {
    async fn call(&self, _arguments: Value) -> Result<String> {
        Err(anyhow!(self.0))
    }
}

/// Registry of echo tools with the given names
pub fn registry_with(names: &[&str]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for name in names {
        registry.register(
            ToolDefinition {
                name: name.to_string(),
                description: format!("{} tool", name),
                input_schema: json!({"type": "object"}),
            },
            Arc::new(EchoTool),
        );
    }
    registry
}

struct CountingSession {
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolSession for CountingSession {
    fn name(&self) -> &str {
        "counting"
    }

    async fn close(&self) -> Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Provider handing out echo-tool registries, or failing like an unreachable server
pub struct StaticToolProvider {
    tools: Vec<String>,
    unreachable: Option<String>,
    acquired: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl StaticToolProvider {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names.iter().map(|n| n.to_string()).collect(),
            unreachable: None,
            acquired: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unavailable(server: &str) -> Self {
        Self {
            unreachable: Some(server.to_string()),
            ..Self::with_tools(&[])
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolRegistryProvider for StaticToolProvider {
    async fn acquire(&self, _tenant: &TenantContext) -> Result<ToolRegistry, ToolRegistryError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        if let Some(server) = &self.unreachable {
            return Err(ToolRegistryError::Connection {
                server: server.clone(),
                message: "connection refused".to_string(),
            });
        }

        let names: Vec<&str> = self.tools.iter().map(String::as_str).collect();
        let mut registry = registry_with(&names);
        registry.attach_session(Arc::new(CountingSession {
            released: Arc::clone(&self.released),
        }));
        Ok(registry)
    }
}

pub fn test_state(llm: Arc<ScriptedLLM>, provider: Arc<StaticToolProvider>) -> AppState {
    AppState::with_components(Config::default(), llm, provider, Arc::new(ModelReportedOnly))
}

/// In-process MCP server speaking both the legacy SSE and streamable HTTP transports
pub struct FakeMcpServer {
    addr: SocketAddr,
    state: FakeMcpState,
}

impl FakeMcpServer {
    pub fn sse_url(&self) -> String {
        format!("http://{}/sse", self.addr)
    }

    pub fn http_url(&self) -> String {
        format!("http://{}/mcp", self.addr)
    }

    /// `X-Tenant-Id` of the most recent POST
    pub fn last_tenant_header(&self) -> Option<String> {
        self.state.last_tenant.lock().expect("tenant lock").clone()
    }
}

#[derive(Clone, Default)]
struct FakeMcpState {
    sse_sessions: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Event>>>>,
    last_tenant: Arc<Mutex<Option<String>>>,
}

impl FakeMcpState {
    fn record_tenant(&self, headers: &HeaderMap) {
        let tenant = headers
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_tenant.lock().expect("tenant lock") = tenant;
    }
}

pub async fn spawn_fake_mcp_server() -> FakeMcpServer {
    let state = FakeMcpState::default();
    let router = Router::new()
        .route("/sse", get(sse_connect))
        .route("/messages", post(sse_message))
        .route("/mcp", post(streamable_post).delete(|| async { StatusCode::OK }))
        .with_state(state.clone());
    let addr = serve(router).await;
    FakeMcpServer { addr, state }
}

async fn sse_connect(
    State(state): State<FakeMcpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = uuid::Uuid::new_v4().to_string();
    let _ = tx.send(
        Event::default()
            .event("endpoint")
            .data(format!("/messages?sessionId={}", session)),
    );
    state.sse_sessions.lock().expect("sessions lock").insert(session, tx);

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });
    Sse::new(stream)
}

async fn sse_message(
    State(state): State<FakeMcpState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    state.record_tenant(&headers);
    let sender = query
        .get("sessionId")
        .and_then(|id| state.sse_sessions.lock().expect("sessions lock").get(id).cloned());
    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };
    if let Some(reply) = answer(&body) {
        let _ = sender.send(Event::default().event("message").data(reply.to_string()));
    }
    StatusCode::ACCEPTED
}

async fn streamable_post(
    State(state): State<FakeMcpState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record_tenant(&headers);
    let method = body["method"].as_str().unwrap_or_default().to_string();
    let has_session = headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) == Some("session-1");
    if method != "initialize" && !has_session {
        return (StatusCode::BAD_REQUEST, "missing session").into_response();
    }

    let Some(reply) = answer(&body) else {
        return StatusCode::ACCEPTED.into_response();
    };
    match method.as_str() {
        "initialize" => ([("mcp-session-id", "session-1")], Json(reply)).into_response(),
        "tools/list" => (
            [(CONTENT_TYPE, "text/event-stream")],
            format!("event: message\ndata: {}\n\n", reply),
        )
            .into_response(),
        _ => Json(reply).into_response(),
    }
}

/// JSON-RPC response for a request; notifications get none
fn answer(request: &Value) -> Option<Value> {
    let id = request.get("id")?.clone();
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let outcome = match request["method"].as_str().unwrap_or_default() {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "fake-rental-gateway", "version": "1.0.0"}
        })),
        "tools/list" => Ok(match params["cursor"].as_str() {
            None => json!({
                "tools": [{
                    "name": "create_store",
                    "description": "创建门店",
                    "inputSchema": {"type": "object", "properties": {"name": {"type": "string"}}}
                }],
                "nextCursor": "page-2"
            }),
            Some(_) => json!({
                "tools": [
                    {"name": "get_all_stores", "description": "查询所有门店"},
                    {"name": "fail_tool"}
                ]
            }),
        }),
        "tools/call" => call_tool(&params),
        _ => Err((-32601, "Method not found".to_string())),
    };

    Some(match outcome {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err((code, message)) => json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}),
    })
}

fn call_tool(params: &Value) -> Result<Value, (i32, String)> {
    let args = &params["arguments"];
    match params["name"].as_str().unwrap_or_default() {
        "create_store" => Ok(json!({
            "content": [{
                "type": "text",
                "text": format!(
                    "门店 {} 已创建 (tenant {})",
                    args["name"].as_str().unwrap_or("?"),
                    args["tenantId"]
                )
            }]
        })),
        "get_all_stores" => Ok(json!({"content": [{"type": "text", "text": "[]"}]})),
        "fail_tool" => Ok(json!({
            "content": [{"type": "text", "text": "门店不存在"}],
            "isError": true
        })),
        other => Err((-32602, format!("Unknown tool: {}", other))),
    }
}
