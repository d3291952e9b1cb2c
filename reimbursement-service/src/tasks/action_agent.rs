use std::sync::Arc;

use agent_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use crate::domain::Role;
use crate::tasks::session_keys;
use crate::tasks::utils::{llm_agent, run_agent_turn, to_rig_messages, tool_protocol};
use crate::tools::{Tool, ToolScope, ToolSet};

pub const NO_PERMISSIONS_REPLY: &str =
    "Unknown role. You do not have permission to perform actions on reimbursement requests.";

const BASE_PROMPT: &str = "You are the support agent for medical reimbursements.";

const SHARED_RULES: &str = "If the user mentions a 'Beneficiary', use it for the \
'beneficiary_name' argument. Always focus on answering only the user's latest request. \
Do NOT repeat or summarize actions or confirmations of requests already processed in \
earlier turns unless the user asks. Use the available tools only when necessary and be courteous.";

/// Static, role-keyed agent binding: the tool subset plus the prompt sections
/// that do not depend on the caller's identity. Built lazily, reused across
/// requests.
struct RoleBinding {
    tools: Vec<Arc<dyn Tool>>,
    protocol: String,
}

/// The action agent: registers, queries and updates reimbursement requests
/// with the tool subset the caller's role allows.
pub struct ActionAgentTask {
    tool_set: Arc<ToolSet>,
    bindings: DashMap<Role, Arc<RoleBinding>>,
}

impl ActionAgentTask {
    pub fn new(tool_set: Arc<ToolSet>) -> Self {
        Self {
            tool_set,
            bindings: DashMap::new(),
        }
    }

    fn binding_for(&self, role: Role) -> Arc<RoleBinding> {
        self.bindings
            .entry(role)
            .or_insert_with(|| {
                let tools = self.tool_set.subset(role.allowed_tools());
                let protocol = tool_protocol(&tools);
                Arc::new(RoleBinding { tools, protocol })
            })
            .clone()
    }

    /// Role-specific instruction text. Injecting the login and display name
    /// here is a prompt-level convention; the tool layer enforces the login
    /// scoping regardless of what the model passes.
    fn role_instructions(role: Role, login: &str, display_name: &str) -> String {
        match role {
            Role::Administrator => format!(
                "The logged-in user is **{login}** and has full access: 'query_status' \
                 returns any request regardless of owner. \
                 For 'register_request', automatically use **{login}** and **{display_name}** \
                 for the 'login' and 'insured_name' arguments."
            ),
            Role::General => format!(
                "The logged-in user is **{login}**. For 'register_request', automatically \
                 use **{login}** and **{display_name}** for the 'login' and 'insured_name' \
                 arguments. You can only query requests associated with your own user."
            ),
            Role::Unknown => String::new(),
        }
    }
}

#[async_trait]
impl Task for ActionAgentTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let user_input: String = context
            .get(session_keys::USER_INPUT)
            .await
            .ok_or_else(|| FlowError::ContextError("user_input not found".to_string()))?;
        let role: String = context
            .get(session_keys::USER_ROLE)
            .await
            .unwrap_or_default();
        let login: String = context
            .get(session_keys::USER_LOGIN)
            .await
            .unwrap_or_default();
        let display_name: String = context
            .get(session_keys::DISPLAY_NAME)
            .await
            .unwrap_or_default();

        let role = Role::parse(&role);
        let binding = self.binding_for(role);

        // A role with no capabilities gets no agent loop at all, just the
        // fixed refusal.
        if binding.tools.is_empty() {
            context.add_user_message(user_input).await;
            context.add_assistant_message(NO_PERMISSIONS_REPLY).await;
            return Ok(TaskResult::new_with_status(
                Some(NO_PERMISSIONS_REPLY.to_string()),
                NextAction::End,
                Some(format!("refused action for role {role}")),
            ));
        }

        info!(%role, %login, "running action agent");

        let preamble = format!(
            "{BASE_PROMPT} {} {SHARED_RULES}\n{}",
            Self::role_instructions(role, &login, &display_name),
            binding.protocol
        );

        let chat_history = to_rig_messages(&context.get_all_messages().await);
        context.add_user_message(user_input.clone()).await;

        let agent =
            llm_agent(&preamble).map_err(|e| FlowError::TaskExecutionFailed(e.to_string()))?;

        let scope = ToolScope {
            role,
            login,
            display_name,
        };

        let reply = run_agent_turn(&agent, chat_history, &user_input, &binding.tools, &scope)
            .await
            .map_err(|e| FlowError::TaskExecutionFailed(e.to_string()))?;

        context.add_assistant_message(reply.clone()).await;

        Ok(TaskResult::new_with_status(
            Some(reply),
            NextAction::End,
            Some(format!("action agent answered as {role}")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{
        DocumentSearchTool, QueryStatusTool, RegisterRequestTool, UpdateRequestTool,
    };

    fn task() -> ActionAgentTask {
        let tool_set = Arc::new(ToolSet::new(vec![
            Arc::new(RegisterRequestTool::new(None)),
            Arc::new(QueryStatusTool::new(None)),
            Arc::new(UpdateRequestTool::new(None)),
            Arc::new(DocumentSearchTool::new(None)),
        ]));
        ActionAgentTask::new(tool_set)
    }

    #[test]
    fn bindings_follow_capability_table_and_are_cached() {
        let task = task();

        let general = task.binding_for(Role::General);
        assert_eq!(general.tools.len(), 2);
        assert!(!general.protocol.contains("update_request"));

        let admin = task.binding_for(Role::Administrator);
        assert_eq!(admin.tools.len(), 3);
        assert!(admin.protocol.contains("update_request"));

        // Second lookup returns the cached binding.
        assert!(Arc::ptr_eq(&general, &task.binding_for(Role::General)));
    }

    #[test]
    fn unknown_role_has_no_tools() {
        let task = task();
        assert!(task.binding_for(Role::Unknown).tools.is_empty());
    }

    #[tokio::test]
    async fn unknown_role_is_refused_without_an_llm_call() {
        let task = task();
        let context = Context::new();
        context.set(session_keys::USER_INPUT, "approve MED_00001").await;
        context.set(session_keys::USER_ROLE, "intruder").await;
        context.set(session_keys::USER_LOGIN, "someone").await;
        context.set(session_keys::DISPLAY_NAME, "Someone").await;

        let result = task.run(context.clone()).await.unwrap();
        assert_eq!(result.response.as_deref(), Some(NO_PERMISSIONS_REPLY));
        assert!(matches!(result.next_action, NextAction::End));
        // Still one user message and one reply for the turn.
        assert_eq!(context.history_len().await, 2);
    }
}
