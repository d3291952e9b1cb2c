use std::fmt;

use agent_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use rig::completion::Chat;
use tracing::info;

use crate::tasks::session_keys;
use crate::tasks::utils::{llm_agent, to_rig_messages};

const SUPERVISOR_PROMPT: &str = r#"You are the supervisor agent of a medical reimbursement system. Your job is to route the user's query.
--- CRITICAL PRIORITY RULE ---
1. If the conversation history shows that the AI asked for a required field (e.g. a name, an amount, a date) and the latest user message is a short reply providing that value, you MUST treat it as a continuation of the action and route to EXTERNAL_USER.
2. Only route to DOCUMENTATION if the user's message is a new theoretical question (e.g. 'What documents do I need...?' or 'What does the policy say...?').
Based on the latest message, decide which team it should go to:
- DOCUMENTATION: questions about policies, procedures, requirements, which documents to bring, or any general theoretical information.
- EXTERNAL_USER: anything that implies an ACTION on a request: registering a request, querying its status, or updating it.
Your answer MUST be exactly one of these words: DOCUMENTATION, EXTERNAL_USER."#;

/// The two routes the supervisor can choose between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Documentation,
    ExternalUser,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Documentation => "documentation",
            Route::ExternalUser => "external_user",
        }
    }

    /// Interpret the classifier output. Anything that is not clearly a
    /// documentation route falls through to the action path (fail-safe).
    pub fn parse(decision: &str) -> Self {
        let decision = decision.to_uppercase();
        if decision.contains("DOCUMENTATION") {
            Route::Documentation
        } else {
            Route::ExternalUser
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-shot classifier that chooses between the documentation path and
/// the action path. No retries, no confidence threshold: the first response
/// is final.
pub struct SupervisorTask;

#[async_trait]
impl Task for SupervisorTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let user_input: String = context
            .get(session_keys::USER_INPUT)
            .await
            .ok_or_else(|| FlowError::ContextError("user_input not found".to_string()))?;

        let chat_history = to_rig_messages(&context.get_all_messages().await);

        let agent =
            llm_agent(SUPERVISOR_PROMPT).map_err(|e| FlowError::TaskExecutionFailed(e.to_string()))?;

        let decision = agent
            .chat(
                format!("Latest user message: {user_input}").as_str(),
                chat_history,
            )
            .await
            .map_err(|e| FlowError::TaskExecutionFailed(e.to_string()))?;

        let route = Route::parse(&decision);
        info!(%route, "supervisor routed message");

        context.set(session_keys::ROUTE, route.as_str()).await;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(format!("routed to {route}")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documentation_label_routes_to_documentation() {
        assert_eq!(Route::parse("DOCUMENTATION"), Route::Documentation);
        assert_eq!(Route::parse("documentation"), Route::Documentation);
        assert_eq!(Route::parse("The answer is: DOCUMENTATION."), Route::Documentation);
    }

    #[test]
    fn action_label_routes_to_external_user() {
        assert_eq!(Route::parse("EXTERNAL_USER"), Route::ExternalUser);
    }

    #[test]
    fn unparseable_decision_fails_safe_to_external_user() {
        assert_eq!(Route::parse("I am not sure"), Route::ExternalUser);
        assert_eq!(Route::parse(""), Route::ExternalUser);
    }
}
