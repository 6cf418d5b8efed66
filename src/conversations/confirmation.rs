//! Confirmation-gated turn protocol.
//!
//! The model is instructed to wrap every mutating action in a marker block:
//!
//! ```text
//! [CONFIRMATION_REQUIRED]
//! 操作类型: 创建门店
//! 操作描述: 在北京创建门店X
//! 确认信息: 确定要创建门店X吗？
//! [/CONFIRMATION_REQUIRED]
//! ```
//!
//! An unconfirmed turn whose output carries the block is turned into a
//! confirmation prompt. A confirmed turn skips detection entirely.

use super::types::{ChatResult, PendingAction};

pub const CONFIRMATION_OPEN: &str = "[CONFIRMATION_REQUIRED]";
pub const CONFIRMATION_CLOSE: &str = "[/CONFIRMATION_REQUIRED]";

pub const LABEL_ACTION_TYPE: &str = "操作类型";
pub const LABEL_ACTION_DESCRIPTION: &str = "操作描述";
pub const LABEL_CONFIRM_MESSAGE: &str = "确认信息";

/// Appended to the user text when the caller approves the pending action
pub const CONFIRMED_ANNOTATION: &str = "（用户已确认此操作）";

const SUCCESS_HEADING: &str = "✅ 操作已确认并执行";
const CONFIRMATION_HEADING: &str = "⚠️ **操作确认**";

/// Where a single turn ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// No marker in the output; the text goes back untouched.
    DirectAnswer(String),
    /// The agent proposed a mutating action that needs approval.
    PendingConfirmation(PendingAction),
    /// The caller approved the action and the agent executed it.
    ConfirmedExecution(String),
}

impl TurnOutcome {
    /// Classify raw agent output for a turn.
    pub fn classify(raw_output: String, confirmed: bool) -> Self {
        if confirmed {
            return TurnOutcome::ConfirmedExecution(raw_output);
        }

        match extract_pending_action(&raw_output) {
            Some(action) => TurnOutcome::PendingConfirmation(action),
            None => TurnOutcome::DirectAnswer(raw_output),
        }
    }

    pub fn into_result(self) -> ChatResult {
        match self {
            TurnOutcome::DirectAnswer(content) => ChatResult::answer(content),
            TurnOutcome::PendingConfirmation(action) => {
                let prompt = render_confirmation_prompt(&action);
                ChatResult::confirmation(prompt, action)
            }
            TurnOutcome::ConfirmedExecution(output) => {
                ChatResult::answer(render_confirmed_output(&output))
            }
        }
    }
}

/// Build the response for a finished agent run.
pub fn resolve_turn(raw_output: String, confirmed: bool) -> ChatResult {
    TurnOutcome::classify(raw_output, confirmed).into_result()
}

/// User text sent to the agent on a confirmed turn
pub fn annotate_confirmed(text: &str) -> String {
    format!("{}{}", text, CONFIRMED_ANNOTATION)
}

/// Find and parse the marker block, if any.
///
/// A missing closing marker extends the block to the end of the output.
/// Labels not present in the block leave their field empty.
pub fn extract_pending_action(output: &str) -> Option<PendingAction> {
    let start = output.find(CONFIRMATION_OPEN)? + CONFIRMATION_OPEN.len();
    let rest = &output[start..];
    let block = match rest.find(CONFIRMATION_CLOSE) {
        Some(end) => &rest[..end],
        None => rest,
    };

    let mut action = PendingAction::default();
    let mut seen = [false; 3];

    for line in block.lines() {
        let line = line.trim();
        let fields = [
            (LABEL_ACTION_TYPE, &mut action.action_type),
            (LABEL_ACTION_DESCRIPTION, &mut action.action_description),
            (LABEL_CONFIRM_MESSAGE, &mut action.confirm_message),
        ];
        for (i, (label, field)) in fields.into_iter().enumerate() {
            if seen[i] {
                continue;
            }
            if let Some(value) = strip_label(line, label) {
                *field = value.to_string();
                seen[i] = true;
                break;
            }
        }
    }

    Some(action)
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(label)?.trim_start();
    let value = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('：'))?;
    Some(value.trim())
}

/// Render a pending action as marker text the protocol understands
pub fn render_marker_block(action: &PendingAction) -> String {
    format!(
        "{}\n{}: {}\n{}: {}\n{}: {}\n{}",
        CONFIRMATION_OPEN,
        LABEL_ACTION_TYPE,
        action.action_type,
        LABEL_ACTION_DESCRIPTION,
        action.action_description,
        LABEL_CONFIRM_MESSAGE,
        action.confirm_message,
        CONFIRMATION_CLOSE
    )
}

pub fn render_confirmation_prompt(action: &PendingAction) -> String {
    format!(
        "{}\n\n{}\n\n操作详情：{}",
        CONFIRMATION_HEADING, action.confirm_message, action.action_description
    )
}

pub fn render_confirmed_output(output: &str) -> String {
    format!("{}\n\n{}", SUCCESS_HEADING, output)
}
