use crate::conversations::types::ChatMessage;
use crate::error::ChatError;

/// Speaker tag used in the agent's working memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Human,
    Ai,
}

impl Speaker {
    fn from_role(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Speaker::Human),
            "assistant" => Some(Speaker::Ai),
            _ => None,
        }
    }
}

/// One prior turn replayed into the agent's memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Split the request messages into prior turns and the current input.
///
/// The last message is always the current input, whatever its role. Earlier
/// messages with a role other than "user" or "assistant" are dropped.
pub fn build_history(messages: &[ChatMessage]) -> Result<(Vec<ConversationTurn>, String), ChatError> {
    let (current, previous) = messages.split_last().ok_or(ChatError::EmptyMessages)?;

    let history = previous
        .iter()
        .filter_map(|msg| match Speaker::from_role(&msg.role) {
            Some(speaker) => Some(ConversationTurn {
                speaker,
                text: msg.content.clone(),
            }),
            None => {
                tracing::debug!(role = %msg.role, "Dropping message with unsupported role from history");
                None
            }
        })
        .collect();

    Ok((history, current.content.clone()))
}
