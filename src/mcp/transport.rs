//! MCP transport implementations.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

/// Trait for MCP transports.
///
/// Transports assign request ids and match responses back to requests.
/// JSON-RPC error objects are returned as-is; interpreting them is the client's job.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for its response.
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Send a notification; no response is expected.
    async fn notify(&self, notification: JsonRpcNotification) -> Result<()>;

    /// Tear down the connection.
    async fn close(&self) -> Result<()>;
}

/// Requests awaiting a response on a transport with an independent read side
struct PendingRequests {
    next_id: AtomicU64,
    waiters: Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
}

impl PendingRequests {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Assign the next id to the request and register a waiter for it
    async fn register(&self, request: &mut JsonRpcRequest) -> oneshot::Receiver<JsonRpcResponse> {
        request.id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(request.id.clone(), tx);
        rx
    }

    async fn complete(&self, response: JsonRpcResponse) {
        match self.waiters.lock().await.remove(&response.id) {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => debug!(id = ?response.id, "Dropping response without a waiter"),
        }
    }

    async fn forget(&self, id: &RequestId) {
        self.waiters.lock().await.remove(id);
    }

    /// Wake every waiter with a closed channel
    async fn fail_all(&self) {
        self.waiters.lock().await.clear();
    }

    async fn wait(
        &self,
        id: &RequestId,
        rx: oneshot::Receiver<JsonRpcResponse>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => bail!("Connection closed before response to request {:?}", id),
            Err(_) => {
                self.forget(id).await;
                bail!("Timed out after {:?} waiting for response to request {:?}", timeout, id)
            }
        }
    }

    /// Route one incoming JSON message to its waiter
    async fn dispatch(&self, raw: &str) {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => {
                if let Some(response) = JsonRpcResponse::from_message(value) {
                    self.complete(response).await;
                }
            }
            Err(e) => debug!("Ignoring non-JSON message from MCP server: {}", e),
        }
    }
}

/// Stdio transport for MCP servers.
///
/// Spawns a subprocess and speaks newline-delimited JSON-RPC over stdin/stdout.
pub struct StdioTransport {
    pending: Arc<PendingRequests>,
    writer: Mutex<BufWriter<ChildStdin>>,
    child: Mutex<Child>,
    reader: JoinHandle<()>,
    timeout: Duration,
}

impl StdioTransport {
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn MCP server: {}", command))?;

        let stdin = child.stdin.take().context("Failed to get stdin")?;
        let stdout = child.stdout.take().context("Failed to get stdout")?;

        let pending = Arc::new(PendingRequests::new());
        let reader = tokio::spawn(read_stdout(stdout, Arc::clone(&pending)));

        Ok(Self {
            pending,
            writer: Mutex::new(BufWriter::new(stdin)),
            child: Mutex::new(child),
            reader,
            timeout,
        })
    }

    async fn write_line<T: Serialize>(&self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

async fn read_stdout(stdout: ChildStdout, pending: Arc<PendingRequests>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => pending.dispatch(&line).await,
            Ok(None) => break,
            Err(e) => {
                warn!("MCP stdio read failed: {}", e);
                break;
            }
        }
    }
    pending.fail_all().await;
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let rx = self.pending.register(&mut request).await;
        if let Err(e) = self.write_line(&request).await {
            self.pending.forget(&request.id).await;
            return Err(e);
        }
        self.pending.wait(&request.id, rx, self.timeout).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        self.write_line(&notification).await
    }

    async fn close(&self) -> Result<()> {
        self.reader.abort();
        // The process may already have exited on its own
        let _ = self.child.lock().await.kill().await;
        Ok(())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Legacy HTTP+SSE transport.
///
/// A long-lived `GET` event stream announces a message endpoint with an
/// `endpoint` event; requests are POSTed there and responses come back as
/// `message` events on the stream.
pub struct SseTransport {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    headers: HeaderMap,
    pending: Arc<PendingRequests>,
    reader: JoinHandle<()>,
    timeout: Duration,
}

impl SseTransport {
    pub async fn connect(
        client: reqwest::Client,
        url: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<Self> {
        let base = reqwest::Url::parse(url).with_context(|| format!("Invalid SSE url: {}", url))?;

        let response = tokio::time::timeout(
            timeout,
            client
                .get(base.clone())
                .headers(headers.clone())
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .with_context(|| format!("Timed out connecting to {}", url))?
        .with_context(|| format!("Failed to open event stream at {}", url))?
        .error_for_status()?;

        let pending = Arc::new(PendingRequests::new());
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(read_event_stream(response, Arc::clone(&pending), endpoint_tx));

        let announced = match tokio::time::timeout(timeout, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                reader.abort();
                bail!("Event stream at {} closed before announcing an endpoint", url)
            }
            Err(_) => {
                reader.abort();
                bail!("No endpoint event from {} within {:?}", url, timeout)
            }
        };

        let endpoint = match base.join(&announced) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                reader.abort();
                bail!("Invalid endpoint '{}' announced by {}: {}", announced, url, e)
            }
        };
        debug!(endpoint = %endpoint, "MCP SSE session established");

        Ok(Self {
            client,
            endpoint,
            headers,
            pending,
            reader,
            timeout,
        })
    }

    async fn post<T: Serialize>(&self, message: &T) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(message)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("MCP endpoint returned {}: {}", status, body);
        }
        Ok(())
    }
}

async fn read_event_stream(
    response: reqwest::Response,
    pending: Arc<PendingRequests>,
    endpoint_tx: oneshot::Sender<String>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut events = Box::pin(response.bytes_stream().eventsource());

    while let Some(event) = events.next().await {
        match event {
            Ok(event) if event.event == "endpoint" => {
                if let Some(tx) = endpoint_tx.take() {
                    let _ = tx.send(event.data.trim().to_string());
                }
            }
            Ok(event) => pending.dispatch(&event.data).await,
            Err(e) => {
                warn!("MCP event stream failed: {}", e);
                break;
            }
        }
    }
    pending.fail_all().await;
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let rx = self.pending.register(&mut request).await;
        if let Err(e) = self.post(&request).await {
            self.pending.forget(&request.id).await;
            return Err(e);
        }
        self.pending.wait(&request.id, rx, self.timeout).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        self.post(&notification).await
    }

    async fn close(&self) -> Result<()> {
        self.reader.abort();
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

const SESSION_HEADER: &str = "mcp-session-id";

/// Streamable HTTP transport.
///
/// Every request is a `POST`; the answer is either a JSON body or a short
/// event stream carrying the response.
pub struct StreamableHttpTransport {
    client: reqwest::Client,
    url: reqwest::Url,
    headers: HeaderMap,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl StreamableHttpTransport {
    pub fn new(client: reqwest::Client, url: &str, headers: HeaderMap, timeout: Duration) -> Result<Self> {
        let url = reqwest::Url::parse(url).with_context(|| format!("Invalid MCP url: {}", url))?;
        Ok(Self {
            client,
            url,
            headers,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            timeout,
        })
    }

    async fn request_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));
        if let Some(session_id) = self.session_id.lock().await.as_deref() {
            if let Ok(value) = HeaderValue::from_str(session_id) {
                headers.insert(SESSION_HEADER, value);
            }
        }
        headers
    }

    async fn post<T: Serialize>(&self, message: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.request_headers().await)
            .json(message)
            .timeout(self.timeout)
            .send()
            .await?;

        if let Some(session_id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(session_id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("MCP server returned {}: {}", status, body);
        }
        Ok(response)
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        request.id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let response = self.post(&request).await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);

        if !is_stream {
            return response
                .json::<JsonRpcResponse>()
                .await
                .context("Failed to parse MCP response body");
        }

        let mut events = Box::pin(response.bytes_stream().eventsource());
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| anyhow::anyhow!("MCP event stream failed: {}", e))?;
            let Ok(value) = serde_json::from_str::<Value>(&event.data) else {
                continue;
            };
            if let Some(reply) = JsonRpcResponse::from_message(value) {
                if reply.id == request.id {
                    return Ok(reply);
                }
            }
        }
        bail!("Event stream ended without a response to request {:?}", request.id)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        self.post(&notification).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.session_id.lock().await.is_none() {
            return Ok(());
        }
        // Session teardown is advisory; servers may not support DELETE
        let _ = self
            .client
            .delete(self.url.clone())
            .headers(self.request_headers().await)
            .timeout(self.timeout)
            .send()
            .await;
        Ok(())
    }
}
