use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{context::Context, error::Result};

/// Result of a task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Response to send to the user, if any.
    pub response: Option<String>,
    /// Next action to take.
    pub next_action: NextAction,
    /// Internal status message describing where the workflow stands.
    pub status_message: Option<String>,
    /// Id of the task that produced this result (filled in by the graph).
    #[serde(default)]
    pub task_id: String,
}

impl TaskResult {
    pub fn new(response: Option<String>, next_action: NextAction) -> Self {
        Self {
            response,
            next_action,
            status_message: None,
            task_id: String::new(),
        }
    }

    pub fn new_with_status(
        response: Option<String>,
        next_action: NextAction,
        status_message: Option<String>,
    ) -> Self {
        Self {
            response,
            next_action,
            status_message,
            task_id: String::new(),
        }
    }
}

/// Defines what should happen after a task completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NextAction {
    /// Follow the outgoing edge and execute the next task within the same
    /// invocation. Used by router tasks whose output is not user-facing.
    ContinueAndExecute,
    /// Stay at the current task and wait for the next user message.
    WaitForInput,
    /// End the graph execution for this invocation.
    End,
}

/// Core trait that all tasks must implement.
#[async_trait]
pub trait Task: Send + Sync {
    /// Unique identifier for this task.
    fn id(&self) -> &str;

    /// Execute the task with the given context.
    async fn run(&self, context: Context) -> Result<TaskResult>;
}
