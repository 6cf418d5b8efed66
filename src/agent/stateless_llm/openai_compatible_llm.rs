use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::stateless_llm_interface::{
    LlmCompletion, LlmMessage, LlmRole, LlmToolCall, LlmToolSpec, StatelessLLMInterface,
};
use crate::error::LlmError;

/// OpenAI compatible LLM implementation
/// Talks to any `/chat/completions` endpoint with function calling (DeepSeek, OpenAI, Ollama, ...)
pub struct OpenAICompatibleLLM {
    client: reqwest::Client,
    provider: String,
    model: String,
    base_url: String,
    api_key: String,
    temperature: Option<f32>,
}

impl OpenAICompatibleLLM {
    pub fn new(
        client: reqwest::Client,
        provider: String,
        model: String,
        base_url: String,
        api_key: String,
        temperature: Option<f32>,
    ) -> Self {
        info!(
            "Initialized OpenAICompatibleLLM: provider={}, model={}, base_url={}",
            provider, model, base_url
        );
        Self {
            client,
            provider,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature,
        }
    }

    fn has_credential(&self) -> bool {
        // An unresolved ${VAR} placeholder means the environment never supplied the key
        !self.api_key.trim().is_empty() && !self.api_key.starts_with("${")
    }
}

#[async_trait]
impl StatelessLLMInterface for OpenAICompatibleLLM {
    async fn chat_completion(
        &self,
        messages: &[LlmMessage],
        tools: &[LlmToolSpec],
    ) -> Result<LlmCompletion, LlmError> {
        if !self.has_credential() {
            return Err(LlmError::MissingCredential {
                provider: self.provider.clone(),
            });
        }

        let api_messages: Vec<ApiMessage> = messages.iter().map(ApiMessage::from).collect();
        let api_tools: Vec<ApiTool> = tools.iter().map(ApiTool::from).collect();

        let request = ApiChatRequest {
            model: &self.model,
            messages: &api_messages,
            temperature: self.temperature,
            tools: if api_tools.is_empty() { None } else { Some(&api_tools) },
        };

        debug!(
            model = %self.model,
            messages = api_messages.len(),
            tools = api_tools.len(),
            "LLM request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        debug!(status = %status, body_len = bytes.len(), "LLM response");

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            warn!(status = %status, body = %body, "LLM API error");
            return Err(LlmError::Status { status, body });
        }

        parse_completion(&bytes)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn parse_completion(bytes: &[u8]) -> Result<LlmCompletion, LlmError> {
    let response: ApiChatResponse = serde_json::from_slice(bytes)
        .map_err(|e| LlmError::MalformedOutput(format!("failed to parse response: {}", e)))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedOutput("no choices in response".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| LlmToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect();

    Ok(LlmCompletion {
        content: choice.message.content,
        tool_calls,
    })
}

#[derive(Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ApiTool]>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: LlmRole,
    // Assistant messages carrying only tool calls still need an explicit null content
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&LlmMessage> for ApiMessage {
    fn from(msg: &LlmMessage) -> Self {
        let tool_calls = if msg.tool_calls.is_empty() {
            None
        } else {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function",
                        function: ApiFunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
            )
        };

        Self {
            role: msg.role,
            content: msg.content.clone(),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[derive(Serialize)]
struct ApiToolCall {
    id: String,
    r#type: &'static str,
    function: ApiFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
struct ApiTool {
    r#type: &'static str,
    function: ApiFunction,
}

impl From<&LlmToolSpec> for ApiTool {
    fn from(spec: &LlmToolSpec) -> Self {
        Self {
            r#type: "function",
            function: ApiFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ApiChatResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiResponseToolCall>>,
}

#[derive(Deserialize)]
struct ApiResponseToolCall {
    id: String,
    function: ApiFunctionCall,
}
