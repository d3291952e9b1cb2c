use std::sync::Arc;

use agent_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use tracing::info;

use crate::domain::Role;
use crate::tasks::session_keys;
use crate::tasks::utils::{llm_agent, run_agent_turn, to_rig_messages, tool_protocol};
use crate::tools::{Tool, ToolScope};

const DOCUMENTATION_PROMPT: &str = "You are the documentation agent. Your ONLY job is to use \
the 'document_search' tool to find the reimbursement procedure, policy or steps in the \
documentation index and summarize what you find for the user. \
If the tool returns no information, tell the user you could not find that detail. \
Never invent an answer that is not backed by the retrieved context.";

/// Agent bound to exactly one tool: document search. Answers theoretical
/// questions about policies and procedures.
pub struct DocumentationAgentTask {
    tools: Vec<Arc<dyn Tool>>,
    preamble: String,
}

impl DocumentationAgentTask {
    pub fn new(document_search: Arc<dyn Tool>) -> Self {
        let tools = vec![document_search];
        let preamble = format!("{DOCUMENTATION_PROMPT}\n{}", tool_protocol(&tools));
        Self { tools, preamble }
    }
}

#[async_trait]
impl Task for DocumentationAgentTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let user_input: String = context
            .get(session_keys::USER_INPUT)
            .await
            .ok_or_else(|| FlowError::ContextError("user_input not found".to_string()))?;
        let login: String = context
            .get(session_keys::USER_LOGIN)
            .await
            .unwrap_or_default();
        let display_name: String = context
            .get(session_keys::DISPLAY_NAME)
            .await
            .unwrap_or_default();

        info!("running documentation agent");

        let chat_history = to_rig_messages(&context.get_all_messages().await);
        context.add_user_message(user_input.clone()).await;

        let agent = llm_agent(&self.preamble)
            .map_err(|e| FlowError::TaskExecutionFailed(e.to_string()))?;

        // The documentation tool ignores identity, but the scope is threaded
        // through for uniformity with the action path.
        let scope = ToolScope {
            role: Role::General,
            login,
            display_name,
        };

        let reply = run_agent_turn(&agent, chat_history, &user_input, &self.tools, &scope)
            .await
            .map_err(|e| FlowError::TaskExecutionFailed(e.to_string()))?;

        context.add_assistant_message(reply.clone()).await;

        Ok(TaskResult::new_with_status(
            Some(reply),
            NextAction::End,
            Some("documentation agent answered".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolName;
    use crate::tools::DocumentSearchTool;

    #[test]
    fn bound_to_exactly_one_tool() {
        let task = DocumentationAgentTask::new(Arc::new(DocumentSearchTool::new(None)));
        assert_eq!(task.tools.len(), 1);
        assert_eq!(task.tools[0].name(), ToolName::DocumentSearch);
        assert!(task.preamble.contains("document_search"));
        assert!(!task.preamble.contains("register_request"));
    }
}
