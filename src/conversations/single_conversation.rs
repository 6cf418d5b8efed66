use tracing::{debug, info};

use crate::agent::agent_factory::AgentFactory;
use crate::agent::input_types::AgentInput;
use crate::chat_history::build_history;
use crate::conversations::confirmation::{annotate_confirmed, resolve_turn};
use crate::conversations::types::{ChatRequest, ChatResult, TenantContext};
use crate::error::ChatError;
use crate::state::AppState;

/// Process one chat turn for a tenant.
///
/// History is validated before any network activity. The agent and its tool
/// sessions live only for this call and are released whatever the outcome.
pub async fn process_chat_message(state: &AppState, request: ChatRequest) -> Result<ChatResult, ChatError> {
    let ChatRequest {
        messages,
        tenant_id,
        confirmed,
    } = request;

    let (history, user_text) = build_history(&messages)?;
    let user_text = if confirmed {
        annotate_confirmed(&user_text)
    } else {
        user_text
    };
    debug!(history = history.len(), confirmed, "Built conversation history");

    let tenant = TenantContext::new(tenant_id);
    let agent = AgentFactory::create_agent(state, &tenant).await?;

    let outcome = agent
        .invoke(AgentInput::new(user_text, history, tenant, confirmed))
        .await;
    agent.release().await;

    let result = resolve_turn(outcome?, confirmed);
    info!(
        requires_confirmation = result.requires_confirmation,
        "Chat turn completed"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::types::ChatMessage;
    use crate::testing::{test_state, ScriptedLLM, ScriptedReply, StaticToolProvider};
    use std::sync::Arc;

    const CREATE_STORE_BLOCK: &str = "好的。\n[CONFIRMATION_REQUIRED]\n\
        操作类型: 创建门店\n\
        操作描述: 创建名为X的门店\n\
        确认信息: 确定要创建门店X吗？\n\
        [/CONFIRMATION_REQUIRED]";

    fn request(messages: Vec<ChatMessage>, confirmed: bool) -> ChatRequest {
        ChatRequest {
            messages,
            tenant_id: 1,
            confirmed,
        }
    }

    #[tokio::test]
    async fn confirmation_round_trip() {
        let llm = Arc::new(ScriptedLLM::new(vec![ScriptedReply::text(CREATE_STORE_BLOCK)]));
        let provider = Arc::new(StaticToolProvider::with_tools(&["create_store"]));
        let state = test_state(llm.clone(), provider.clone());

        let first = process_chat_message(&state, request(vec![ChatMessage::user("帮我创建门店X")], false))
            .await
            .expect("first turn");

        assert!(first.requires_confirmation);
        assert_eq!(first.action_type.as_deref(), Some("创建门店"));
        assert_eq!(first.action_description.as_deref(), Some("创建名为X的门店"));
        assert_eq!(
            first.content,
            "⚠️ **操作确认**\n\n确定要创建门店X吗？\n\n操作详情：创建名为X的门店"
        );

        let llm = Arc::new(ScriptedLLM::new(vec![
            ScriptedReply::tool_call("c1", "create_store", r#"{"name":"X"}"#),
            ScriptedReply::text("门店X已创建"),
        ]));
        let state = test_state(llm.clone(), provider.clone());
        let second = process_chat_message(
            &state,
            request(
                vec![
                    ChatMessage::user("帮我创建门店X"),
                    ChatMessage::assistant(first.content.clone()),
                    ChatMessage::user("确认"),
                ],
                true,
            ),
        )
        .await
        .expect("second turn");

        assert!(!second.requires_confirmation);
        assert_eq!(second.content, "✅ 操作已确认并执行\n\n门店X已创建");
        let sent = &llm.requests()[0];
        assert_eq!(
            sent.last().and_then(|m| m.content.as_deref()),
            Some("确认（用户已确认此操作），我的租户ID是：1")
        );
        assert_eq!(provider.released(), 2);
    }

    #[tokio::test]
    async fn confirmed_turn_skips_marker_scan() {
        let llm = Arc::new(ScriptedLLM::new(vec![ScriptedReply::text(CREATE_STORE_BLOCK)]));
        let state = test_state(llm, Arc::new(StaticToolProvider::with_tools(&[])));

        let result = process_chat_message(&state, request(vec![ChatMessage::user("确认")], true))
            .await
            .expect("turn");

        assert!(!result.requires_confirmation);
        assert!(result.content.starts_with("✅ 操作已确认并执行\n\n好的。\n[CONFIRMATION_REQUIRED]"));
    }

    #[tokio::test]
    async fn empty_messages_fail_before_tool_discovery() {
        let llm = Arc::new(ScriptedLLM::new(vec![ScriptedReply::text("unused")]));
        let provider = Arc::new(StaticToolProvider::with_tools(&["get_all_stores"]));
        let state = test_state(llm.clone(), provider.clone());

        let err = process_chat_message(&state, request(Vec::new(), false))
            .await
            .expect_err("empty");

        assert!(matches!(err, ChatError::EmptyMessages));
        assert_eq!(provider.acquired(), 0);
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn registry_failure_is_reported_without_calling_the_model() {
        let llm = Arc::new(ScriptedLLM::new(vec![ScriptedReply::text("unused")]));
        let state = test_state(llm.clone(), Arc::new(StaticToolProvider::unavailable("gateway")));

        let err = process_chat_message(&state, request(vec![ChatMessage::user("查询门店")], false))
            .await
            .expect_err("registry down");

        assert!(matches!(err, ChatError::ToolRegistry(_)));
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn tools_are_released_when_the_model_fails() {
        let llm = Arc::new(ScriptedLLM::new(vec![ScriptedReply::Unavailable]));
        let provider = Arc::new(StaticToolProvider::with_tools(&["get_all_stores"]));
        let state = test_state(llm, provider.clone());

        let err = process_chat_message(&state, request(vec![ChatMessage::user("查询门店")], false))
            .await
            .expect_err("model down");

        assert!(matches!(err, ChatError::Llm(_)));
        assert_eq!(provider.released(), 1);
    }
}
