pub mod context;
pub mod error;
pub mod graph;
pub mod runner;
pub mod storage;
pub mod task;

// Re-export commonly used types
pub use context::{ChatMessage, Context, MessageRole};
pub use error::{FlowError, Result};
pub use graph::{ExecutionResult, ExecutionStatus, Graph, GraphBuilder};
pub use runner::FlowRunner;
pub use storage::{InMemorySessionStorage, PostgresSessionStorage, Session, SessionStorage};
pub use task::{NextAction, Task, TaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    /// Router task: classifies the input and hands off within the same turn.
    struct RouterTask;

    #[async_trait]
    impl Task for RouterTask {
        fn id(&self) -> &str {
            "router"
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            let input: String = context.get("user_input").await.unwrap_or_default();
            context.add_user_message(input.clone()).await;
            let route = if input.contains("policy") { "docs" } else { "action" };
            context.set("route", route).await;
            Ok(TaskResult::new(None, NextAction::ContinueAndExecute))
        }
    }

    struct ReplyTask {
        id: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl Task for ReplyTask {
        fn id(&self) -> &str {
            self.id
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            context.add_assistant_message(self.reply).await;
            Ok(TaskResult::new(
                Some(self.reply.to_string()),
                NextAction::End,
            ))
        }
    }

    fn routed_graph() -> Graph {
        GraphBuilder::new("test_graph")
            .add_task(Arc::new(RouterTask))
            .add_task(Arc::new(ReplyTask {
                id: "docs",
                reply: "here is the procedure",
            }))
            .add_task(Arc::new(ReplyTask {
                id: "action",
                reply: "request registered",
            }))
            .add_conditional_edge(
                "router",
                |ctx| ctx.get_sync::<String>("route").as_deref() == Some("docs"),
                "docs",
                "action",
            )
            .build()
    }

    #[tokio::test]
    async fn routes_one_hop_and_terminates() {
        let graph = routed_graph();
        let mut session = Session::new_from_task("s1".to_string(), "router");
        session.context.set("user_input", "what is the policy?").await;

        let result = graph.execute_session(&mut session).await.unwrap();

        assert!(matches!(result.status, ExecutionStatus::Completed));
        assert_eq!(result.response.as_deref(), Some("here is the procedure"));
        // Next turn re-enters at the router.
        assert_eq!(session.current_task_id, "router");
    }

    #[tokio::test]
    async fn history_grows_by_two_per_turn() {
        let graph = Arc::new(routed_graph());
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage.clone());

        // The first turn creates the session implicitly.
        for turn in 1..=3 {
            runner
                .run_turn("s2", &[("user_input", json!("register a request"))])
                .await
                .unwrap();

            let session = storage.get("s2").await.unwrap().unwrap();
            assert_eq!(session.context.history_len().await, turn * 2);
        }
    }

    #[tokio::test]
    async fn concurrent_turns_each_process_their_own_input() {
        let graph = Arc::new(routed_graph());
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage.clone());

        // Two simultaneous turns on the same session: the inputs are applied
        // under the session lock, so neither message can be overwritten
        // before its turn consumes it.
        let first_input = [("user_input", json!("register the first request"))];
        let second_input = [("user_input", json!("register the second request"))];
        let first = runner.run_turn("s3", &first_input);
        let second = runner.run_turn("s3", &second_input);
        let (first, second) = tokio::join!(first, second);
        first.unwrap();
        second.unwrap();

        let session = storage.get("s3").await.unwrap().unwrap();
        let messages = session.context.get_all_messages().await;
        assert_eq!(messages.len(), 4);

        let user_messages: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .collect();
        assert!(user_messages.contains(&"register the first request"));
        assert!(user_messages.contains(&"register the second request"));
    }

    #[tokio::test]
    async fn run_fails_for_unknown_session() {
        let graph = Arc::new(routed_graph());
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage);

        let err = runner.run("missing").await.unwrap_err();
        assert!(matches!(err, FlowError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn in_memory_storage_round_trip() {
        let storage = InMemorySessionStorage::new();
        let session = Session::new_from_task("session1".to_string(), "router");
        storage.save(session).await.unwrap();

        let retrieved = storage.get("session1").await.unwrap();
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().current_task_id, "router");

        storage.delete("session1").await.unwrap();
        assert!(storage.get("session1").await.unwrap().is_none());
    }
}
