use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::agent_interface::AgentInterface;
use crate::agent::input_types::AgentInput;
use crate::agent::prompts::format_user_input;
use crate::agent::stateless_llm::{LlmMessage, LlmToolCall, StatelessLLMInterface};
use crate::agent::tool_policy::{pending_action_for, ToolConfirmationPolicy};
use crate::chat_history::Speaker;
use crate::conversations::confirmation::render_marker_block;
use crate::error::LlmError;
use crate::tools::ToolRegistry;

pub const ITERATION_LIMIT_OUTPUT: &str = "Agent stopped due to iteration limit.";

/// Agent that lets the model call tools until it produces a final answer.
/// Owns the tool registry for exactly one request.
pub struct ToolCallingAgent {
    llm: Arc<dyn StatelessLLMInterface>,
    tools: ToolRegistry,
    policy: Arc<dyn ToolConfirmationPolicy>,
    system_prompt: String,
    max_iterations: usize,
}

impl ToolCallingAgent {
    pub fn new(
        llm: Arc<dyn StatelessLLMInterface>,
        tools: ToolRegistry,
        policy: Arc<dyn ToolConfirmationPolicy>,
        system_prompt: String,
        max_iterations: usize,
    ) -> Self {
        debug!(
            model = llm.model(),
            tools = tools.len(),
            max_iterations,
            "ToolCallingAgent initialized"
        );
        Self {
            llm,
            tools,
            policy,
            system_prompt,
            max_iterations,
        }
    }

    /// System instruction, replayed history, then the tenant-scoped user text
    fn build_messages(&self, input: &AgentInput) -> Vec<LlmMessage> {
        let mut messages = Vec::with_capacity(input.history.len() + 2);
        messages.push(LlmMessage::system(self.system_prompt.as_str()));
        for turn in &input.history {
            messages.push(match turn.speaker {
                Speaker::Human => LlmMessage::user(turn.text.as_str()),
                Speaker::Ai => LlmMessage::assistant(turn.text.as_str()),
            });
        }
        messages.push(LlmMessage::user(format_user_input(&input.text, &input.tenant)));
        messages
    }

    /// Execute one tool call and return the observation for the model
    async fn run_tool(&self, call: &LlmToolCall) -> String {
        if !self.tools.contains(&call.name) {
            let available: Vec<&str> = self.tools.definitions().map(|d| d.name.as_str()).collect();
            warn!(tool = %call.name, "Model called an unknown tool");
            return format!(
                "{} is not a valid tool, try one of [{}].",
                call.name,
                available.join(", ")
            );
        }

        let arguments = match parse_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(observation) => {
                warn!(tool = %call.name, "Unusable tool arguments: {}", call.arguments);
                return observation;
            }
        };

        match self.tools.call(&call.name, arguments).await {
            Ok(output) => {
                debug!(tool = %call.name, "Tool returned {} bytes", output.len());
                output
            }
            Err(e) => {
                warn!(tool = %call.name, "Tool execution failed: {:#}", e);
                format!("Error: {:#}", e)
            }
        }
    }
}

/// Tool arguments must be a JSON object; empty text counts as no arguments
fn parse_arguments(raw: &str) -> Result<Value, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("Error: tool arguments must be a JSON object".to_string()),
        Err(e) => Err(format!("Error: could not parse tool arguments as JSON: {}", e)),
    }
}

#[async_trait]
impl AgentInterface for ToolCallingAgent {
    async fn invoke(&self, input: AgentInput) -> Result<String, LlmError> {
        let specs = self.tools.specs();
        let mut messages = self.build_messages(&input);

        for iteration in 0..self.max_iterations {
            let completion = match self.llm.chat_completion(&messages, &specs).await {
                Ok(completion) => completion,
                Err(e) if e.is_recoverable() => {
                    warn!(iteration, "Degrading malformed model output: {}", e);
                    return Ok(format!("Invalid or incomplete response: {}", e));
                }
                Err(e) => return Err(e),
            };

            if completion.tool_calls.is_empty() {
                debug!(iteration, "Model produced final output");
                return Ok(completion.content.unwrap_or_default());
            }

            if !input.confirmed {
                if let Some(held) = completion
                    .tool_calls
                    .iter()
                    .find(|call| self.policy.requires_confirmation(call))
                {
                    info!(tool = %held.name, "Tool call held back for user confirmation");
                    return Ok(render_marker_block(&pending_action_for(held)));
                }
            }

            messages.push(LlmMessage::assistant_tool_calls(
                completion.content.clone(),
                completion.tool_calls.clone(),
            ));
            for call in &completion.tool_calls {
                let observation = self.run_tool(call).await;
                messages.push(LlmMessage::tool_result(call.id.as_str(), observation));
            }
        }

        warn!(max_iterations = self.max_iterations, "{}", ITERATION_LIMIT_OUTPUT);
        Ok(ITERATION_LIMIT_OUTPUT.to_string())
    }

    async fn release(self: Box<Self>) {
        let agent = *self;
        agent.tools.release().await;
    }
}
