use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::{
    context::Context,
    error::{FlowError, Result},
    storage::Session,
    task::{NextAction, Task, TaskResult},
};

/// Type alias for edge condition functions.
pub type EdgeCondition = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Edge between tasks in the graph.
#[derive(Clone)]
enum Edge {
    Direct {
        from: String,
        to: String,
    },
    Conditional {
        from: String,
        condition: EdgeCondition,
        yes_to: String,
        else_to: String,
    },
}

impl Edge {
    fn from(&self) -> &str {
        match self {
            Edge::Direct { from, .. } => from,
            Edge::Conditional { from, .. } => from,
        }
    }
}

/// A graph of tasks that can be executed one step at a time against a session.
pub struct Graph {
    pub id: String,
    tasks: DashMap<String, Arc<dyn Task>>,
    edges: Mutex<Vec<Edge>>,
    start_task_id: Mutex<Option<String>>,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: DashMap::new(),
            edges: Mutex::new(Vec::new()),
            start_task_id: Mutex::new(None),
        }
    }

    /// Add a task to the graph. The first task added becomes the start task.
    pub fn add_task(&self, task: Arc<dyn Task>) -> &Self {
        let task_id = task.id().to_string();
        let is_first = self.tasks.is_empty();
        self.tasks.insert(task_id.clone(), task);
        if is_first {
            *self.start_task_id.lock().expect("start task lock poisoned") = Some(task_id);
        }
        self
    }

    pub fn set_start_task(&self, task_id: impl Into<String>) -> &Self {
        let task_id = task_id.into();
        if self.tasks.contains_key(&task_id) {
            *self.start_task_id.lock().expect("start task lock poisoned") = Some(task_id);
        }
        self
    }

    pub fn add_edge(&self, from: impl Into<String>, to: impl Into<String>) -> &Self {
        self.edges.lock().expect("edges lock poisoned").push(Edge::Direct {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Add a two-way conditional edge: when `condition` holds the flow goes
    /// to `yes_to`, otherwise to `else_to`.
    pub fn add_conditional_edge<F>(
        &self,
        from: impl Into<String>,
        condition: F,
        yes_to: impl Into<String>,
        else_to: impl Into<String>,
    ) -> &Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.edges
            .lock()
            .expect("edges lock poisoned")
            .push(Edge::Conditional {
                from: from.into(),
                condition: Arc::new(condition),
                yes_to: yes_to.into(),
                else_to: else_to.into(),
            });
        self
    }

    /// Execute exactly the session's current task and apply its next action.
    ///
    /// `ContinueAndExecute` follows the outgoing edge and runs the next task
    /// within the same call. `End` resets the session to the start task so
    /// the next invocation re-enters the graph from the top.
    pub async fn execute_session(&self, session: &mut Session) -> Result<ExecutionResult> {
        let result = self
            .execute_single_task(&session.current_task_id, session.context.clone())
            .await?;

        session.status_message = result.status_message.clone();

        match &result.next_action {
            NextAction::ContinueAndExecute => {
                if let Some(next_task_id) = self.find_next_task(&result.task_id, &session.context) {
                    session.current_task_id = next_task_id;
                    return Box::pin(self.execute_session(session)).await;
                }
                // No outgoing edge: treat as terminal.
                session.current_task_id = result.task_id.clone();
                Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::WaitingForInput,
                })
            }
            NextAction::WaitForInput => {
                session.current_task_id = result.task_id.clone();
                Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::WaitingForInput,
                })
            }
            NextAction::End => {
                session.current_task_id = self
                    .start_task_id()
                    .unwrap_or_else(|| result.task_id.clone());
                Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::Completed,
                })
            }
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| FlowError::TaskNotFound(task_id.to_string()))?
            .clone();

        let mut result = task.run(context).await?;
        result.task_id = task_id.to_string();
        Ok(result)
    }

    /// Find the next task based on edges and conditions.
    pub fn find_next_task(&self, current_task_id: &str, context: &Context) -> Option<String> {
        let edges = self.edges.lock().expect("edges lock poisoned");
        for edge in edges.iter() {
            if edge.from() != current_task_id {
                continue;
            }
            match edge {
                Edge::Direct { to, .. } => return Some(to.clone()),
                Edge::Conditional {
                    condition,
                    yes_to,
                    else_to,
                    ..
                } => {
                    return if condition(context) {
                        Some(yes_to.clone())
                    } else {
                        Some(else_to.clone())
                    };
                }
            }
        }
        None
    }

    pub fn start_task_id(&self) -> Option<String> {
        self.start_task_id
            .lock()
            .expect("start task lock poisoned")
            .clone()
    }

    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_id).map(|entry| entry.clone())
    }
}

/// Builder for creating graphs.
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id),
        }
    }

    pub fn add_task(self, task: Arc<dyn Task>) -> Self {
        self.graph.add_task(task);
        self
    }

    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.add_edge(from, to);
        self
    }

    pub fn add_conditional_edge<F>(
        self,
        from: impl Into<String>,
        condition: F,
        yes_to: impl Into<String>,
        else_to: impl Into<String>,
    ) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.graph.add_conditional_edge(from, condition, yes_to, else_to);
        self
    }

    pub fn set_start_task(self, task_id: impl Into<String>) -> Self {
        self.graph.set_start_task(task_id);
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Outcome of a single graph invocation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone)]
pub enum ExecutionStatus {
    /// Waiting for user input to continue.
    WaitingForInput,
    /// The invocation ran to a terminal task.
    Completed,
}
