use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Context for sharing data between tasks in a graph execution.
///
/// Holds a typed key-value store plus the conversation history. The history
/// is append-only: tasks add messages, nothing removes them.
#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
    history: Arc<RwLock<Vec<ChatMessage>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.data.insert(key.into(), value);
            }
            Err(e) => tracing::error!("failed to serialize context value: {e}"),
        }
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    /// Synchronous variant for use inside edge conditions.
    pub fn get_sync<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    pub async fn add_user_message(&self, content: impl Into<String>) {
        self.push_message(ChatMessage::user(content));
    }

    pub async fn add_assistant_message(&self, content: impl Into<String>) {
        self.push_message(ChatMessage::assistant(content));
    }

    pub async fn get_all_messages(&self) -> Vec<ChatMessage> {
        self.history.read().expect("history lock poisoned").clone()
    }

    pub async fn get_last_messages(&self, n: usize) -> Vec<ChatMessage> {
        let history = self.history.read().expect("history lock poisoned");
        history.iter().rev().take(n).rev().cloned().collect()
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().expect("history lock poisoned").len()
    }

    fn push_message(&self, message: ChatMessage) {
        self.history
            .write()
            .expect("history lock poisoned")
            .push(message);
    }
}

/// Plain, owned form of a [`Context`] used for (de)serialization.
#[derive(Serialize, Deserialize)]
struct ContextSnapshot {
    data: HashMap<String, Value>,
    history: Vec<ChatMessage>,
}

impl Serialize for Context {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let snapshot = ContextSnapshot {
            data: self
                .data
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            history: self.history.read().expect("history lock poisoned").clone(),
        };
        snapshot.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let snapshot = ContextSnapshot::deserialize(deserializer)?;
        let context = Context::new();
        for (k, v) in snapshot.data {
            context.data.insert(k, v);
        }
        *context.history.write().expect("history lock poisoned") = snapshot.history;
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_is_append_only_and_ordered() {
        let context = Context::new();
        context.add_user_message("hello").await;
        context.add_assistant_message("hi there").await;

        let messages = context.get_all_messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::user("hello"));
        assert_eq!(messages[1], ChatMessage::assistant("hi there"));

        let last = context.get_last_messages(1).await;
        assert_eq!(last, vec![ChatMessage::assistant("hi there")]);
    }

    #[tokio::test]
    async fn context_round_trips_through_json() {
        let context = Context::new();
        context.set("route", "documentation").await;
        context.add_user_message("what documents do I need?").await;

        let json = serde_json::to_string(&context).unwrap();
        let restored: Context = serde_json::from_str(&json).unwrap();

        let route: String = restored.get("route").await.unwrap();
        assert_eq!(route, "documentation");
        assert_eq!(restored.history_len().await, 1);
    }
}
