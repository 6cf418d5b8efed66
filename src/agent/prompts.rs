//! Fixed instructions given to the model.

use crate::conversations::confirmation::{
    CONFIRMATION_CLOSE, CONFIRMATION_OPEN, CONFIRMED_ANNOTATION, LABEL_ACTION_DESCRIPTION,
    LABEL_ACTION_TYPE, LABEL_CONFIRM_MESSAGE,
};
use crate::conversations::types::TenantContext;

/// Built-in system instruction.
///
/// Mutating operations must be announced with a confirmation block instead of
/// being executed; the block format here is what the confirmation parser reads.
pub fn default_system_prompt() -> String {
    format!(
        "你是一个租车SaaS系统的AI助手，可以帮助商户管理门店和车辆。你可以执行查询、创建、更新、删除等操作。\n\n\
         对于创建、更新、删除等修改类操作，在用户确认之前不要调用工具，而是在回复中输出以下格式的确认块：\n\
         {open}\n\
         {action_type}: <操作类型，例如：创建门店>\n\
         {description}: <将要执行的具体操作>\n\
         {confirm}: <请用户确认的问题>\n\
         {close}\n\n\
         当用户消息末尾带有“{confirmed}”时，表示用户已经确认，请直接调用相应工具完成操作并告知结果。\n\
         查询类操作无需确认，可以直接调用工具。",
        open = CONFIRMATION_OPEN,
        action_type = LABEL_ACTION_TYPE,
        description = LABEL_ACTION_DESCRIPTION,
        confirm = LABEL_CONFIRM_MESSAGE,
        close = CONFIRMATION_CLOSE,
        confirmed = CONFIRMED_ANNOTATION,
    )
}

/// Current user text with the tenant scope spelled out for the model
pub fn format_user_input(text: &str, tenant: &TenantContext) -> String {
    format!("{}，我的租户ID是：{}", text, tenant.tenant_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_is_appended_to_user_text() {
        assert_eq!(
            format_user_input("查询所有门店", &TenantContext::new(3)),
            "查询所有门店，我的租户ID是：3"
        );
    }

    #[test]
    fn system_prompt_teaches_the_marker_format() {
        let prompt = default_system_prompt();
        assert!(prompt.contains("[CONFIRMATION_REQUIRED]\n操作类型: "));
        assert!(prompt.contains("确认信息: "));
        assert!(prompt.contains("[/CONFIRMATION_REQUIRED]"));
        assert!(prompt.contains("（用户已确认此操作）"));
    }
}
