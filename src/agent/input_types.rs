use crate::chat_history::ConversationTurn;
use crate::conversations::types::TenantContext;

/// Everything the agent needs for one turn
#[derive(Debug, Clone)]
pub struct AgentInput {
    /// Current user text, already annotated when the turn is confirmed
    pub text: String,
    /// Prior turns, oldest first
    pub history: Vec<ConversationTurn>,
    pub tenant: TenantContext,
    /// Whether the user confirmed a pending action with this request
    pub confirmed: bool,
}

impl AgentInput {
    pub fn new(text: String, history: Vec<ConversationTurn>, tenant: TenantContext, confirmed: bool) -> Self {
        Self {
            text,
            history,
            tenant,
            confirmed,
        }
    }
}
