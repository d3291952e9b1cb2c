//! FlowRunner – convenience wrapper that loads a session, executes exactly
//! one graph step, and persists the updated session back to storage.
//!
//! Interactive services want to run one step per HTTP request, send the
//! assistant's reply back to the client, and have the session saved for the
//! next roundtrip. `FlowRunner` makes that a one-liner and additionally
//! serializes turns per session: two in-flight requests for the same session
//! id cannot interleave their history writes.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    error::{FlowError, Result},
    graph::{ExecutionResult, Graph},
    storage::{Session, SessionStorage},
};

/// High-level helper that orchestrates the common load → execute → save pattern.
#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
    storage: Arc<dyn SessionStorage>,
    session_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            graph,
            storage,
            session_locks: Arc::new(DashMap::new()),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Execute exactly one graph invocation for the given `session_id` and
    /// persist the updated session. The per-session lock is held for the
    /// whole load → execute → save cycle.
    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;

        let result = self.graph.execute_session(&mut session).await?;

        self.storage.save(session).await?;

        Ok(result)
    }

    /// Execute one full conversational turn: load the session (creating it at
    /// the graph's start task on first use), apply the per-turn `inputs` to
    /// its context, execute, and persist. Everything happens under the
    /// per-session lock, so concurrent turns for the same session cannot
    /// overwrite each other's inputs before they are consumed.
    pub async fn run_turn(
        &self,
        session_id: &str,
        inputs: &[(&str, Value)],
    ) -> Result<ExecutionResult> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = match self.storage.get(session_id).await? {
            Some(session) => session,
            None => {
                let start_task_id = self
                    .graph
                    .start_task_id()
                    .ok_or_else(|| FlowError::TaskNotFound(format!("start task of {}", self.graph.id)))?;
                debug!(session_id, "creating new session");
                Session::new_from_task(session_id.to_string(), &start_task_id)
            }
        };

        for (key, value) in inputs {
            session.context.set(*key, value.clone()).await;
        }

        let result = self.graph.execute_session(&mut session).await?;

        self.storage.save(session).await?;

        Ok(result)
    }
}
