//! Optional confirmation check applied to tool calls before they run.

use std::sync::Arc;

use regex::Regex;
use tracing::info;

use crate::agent::stateless_llm::LlmToolCall;
use crate::conversations::types::PendingAction;

/// Decides whether a proposed tool call must wait for user confirmation
pub trait ToolConfirmationPolicy: Send + Sync {
    fn requires_confirmation(&self, call: &LlmToolCall) -> bool;
}

/// Leaves confirmation entirely to the model's own confirmation blocks
pub struct ModelReportedOnly;

impl ToolConfirmationPolicy for ModelReportedOnly {
    fn requires_confirmation(&self, _call: &LlmToolCall) -> bool {
        false
    }
}

/// Holds back tools whose name matches any configured pattern
pub struct PatternConfirmationPolicy {
    patterns: Vec<Regex>,
}

impl PatternConfirmationPolicy {
    pub fn from_patterns(patterns: &[String]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }
}

impl ToolConfirmationPolicy for PatternConfirmationPolicy {
    fn requires_confirmation(&self, call: &LlmToolCall) -> bool {
        self.patterns.iter().any(|p| p.is_match(&call.name))
    }
}

/// Policy for the configured patterns; no patterns means model-only confirmation
pub fn build_policy(patterns: &[String]) -> Result<Arc<dyn ToolConfirmationPolicy>, regex::Error> {
    if patterns.is_empty() {
        return Ok(Arc::new(ModelReportedOnly));
    }
    info!(patterns = ?patterns, "Tool confirmation policy enabled");
    Ok(Arc::new(PatternConfirmationPolicy::from_patterns(patterns)?))
}

/// Describe a held-back tool call the same way the model describes its own
pub fn pending_action_for(call: &LlmToolCall) -> PendingAction {
    let arguments = call.arguments.trim();
    let arguments = if arguments.is_empty() { "{}" } else { arguments };
    PendingAction {
        action_type: call.name.clone(),
        action_description: format!("调用 {}，参数：{}", call.name, arguments),
        confirm_message: format!("确定要执行 {} 吗？", call.name),
    }
}
