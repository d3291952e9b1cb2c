use std::sync::Arc;

use agent_flow::{FlowRunner, Graph, GraphBuilder, SessionStorage, Task};

use crate::domain::ToolName;
use crate::tasks::{ActionAgentTask, DocumentationAgentTask, Route, SupervisorTask, session_keys};
use crate::tools::ToolSet;

/// Task id sessions start from on every turn.
pub fn supervisor_task_id() -> &'static str {
    std::any::type_name::<SupervisorTask>()
}

/// Build the routing graph: supervisor → {documentation, external_user} → end.
/// Each invocation performs exactly one hop from the supervisor to one agent.
pub fn create_graph(tool_set: Arc<ToolSet>) -> Graph {
    let supervisor = Arc::new(SupervisorTask);
    let documentation = Arc::new(DocumentationAgentTask::new(
        tool_set
            .get(ToolName::DocumentSearch)
            .expect("document search tool is always registered"),
    ));
    let action = Arc::new(ActionAgentTask::new(tool_set));

    let documentation_id = documentation.id().to_string();
    let action_id = action.id().to_string();

    GraphBuilder::new("reimbursement_agent")
        .add_task(supervisor)
        .add_task(documentation)
        .add_task(action)
        .set_start_task(supervisor_task_id())
        .add_conditional_edge(
            supervisor_task_id(),
            |ctx| {
                ctx.get_sync::<String>(session_keys::ROUTE).as_deref()
                    == Some(Route::Documentation.as_str())
            },
            documentation_id,
            action_id,
        )
        .build()
}

pub fn create_flow_runner(
    tool_set: Arc<ToolSet>,
    session_storage: Arc<dyn SessionStorage>,
) -> FlowRunner {
    FlowRunner::new(Arc::new(create_graph(tool_set)), session_storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_flow::Context;
    use crate::tools::{
        DocumentSearchTool, QueryStatusTool, RegisterRequestTool, UpdateRequestTool,
    };

    fn tool_set() -> Arc<ToolSet> {
        Arc::new(ToolSet::new(vec![
            Arc::new(RegisterRequestTool::new(None)),
            Arc::new(QueryStatusTool::new(None)),
            Arc::new(UpdateRequestTool::new(None)),
            Arc::new(DocumentSearchTool::new(None)),
        ]))
    }

    #[test]
    fn graph_starts_at_the_supervisor() {
        let graph = create_graph(tool_set());
        assert_eq!(graph.start_task_id().as_deref(), Some(supervisor_task_id()));
    }

    #[tokio::test]
    async fn supervisor_edge_follows_the_route() {
        let graph = create_graph(tool_set());

        let context = Context::new();
        context.set(session_keys::ROUTE, "documentation").await;
        let next = graph.find_next_task(supervisor_task_id(), &context).unwrap();
        assert!(next.contains("DocumentationAgentTask"));

        let context = Context::new();
        context.set(session_keys::ROUTE, "external_user").await;
        let next = graph.find_next_task(supervisor_task_id(), &context).unwrap();
        assert!(next.contains("ActionAgentTask"));

        // No route set: fail-safe to the action path.
        let context = Context::new();
        let next = graph.find_next_task(supervisor_task_id(), &context).unwrap();
        assert!(next.contains("ActionAgentTask"));
    }
}
