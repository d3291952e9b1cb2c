pub mod document_search;
pub mod query_status;
pub mod register_request;
pub mod update_request;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Role, ToolName};

pub use document_search::DocumentSearchTool;
pub use query_status::QueryStatusTool;
pub use register_request::RegisterRequestTool;
pub use update_request::UpdateRequestTool;

/// Per-turn identity the tool layer enforces, independent of prompt text.
#[derive(Debug, Clone)]
pub struct ToolScope {
    pub role: Role,
    pub login: String,
    pub display_name: String,
}

/// A named callable the reasoning agent may invoke during its turn.
///
/// Tools never surface errors to the agent loop: every downstream failure
/// becomes a human-readable diagnostic string the agent can relay.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    /// Short usage text injected into the agent prompt: what the tool does
    /// and which JSON arguments it takes.
    fn usage(&self) -> &'static str;

    async fn call(&self, args: Value, scope: &ToolScope) -> String;
}

/// The full set of tools built once at startup.
#[derive(Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Subset of tools by name, in the order requested. Unknown names are
    /// skipped silently (the capability table only names registered tools).
    pub fn subset(&self, names: &[ToolName]) -> Vec<Arc<dyn Tool>> {
        names.iter().filter_map(|n| self.get(*n)).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTool(ToolName);

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> ToolName {
            self.0
        }

        fn usage(&self) -> &'static str {
            "fake"
        }

        async fn call(&self, _args: Value, _scope: &ToolScope) -> String {
            "ok".to_string()
        }
    }

    #[test]
    fn subset_follows_capability_table() {
        let set = ToolSet::new(vec![
            Arc::new(FakeTool(ToolName::RegisterRequest)),
            Arc::new(FakeTool(ToolName::QueryStatus)),
            Arc::new(FakeTool(ToolName::UpdateRequest)),
            Arc::new(FakeTool(ToolName::DocumentSearch)),
        ]);

        let admin = set.subset(Role::Administrator.allowed_tools());
        assert_eq!(admin.len(), 3);
        assert!(admin.iter().any(|t| t.name() == ToolName::UpdateRequest));

        let general = set.subset(Role::General.allowed_tools());
        assert_eq!(general.len(), 2);
        assert!(!general.iter().any(|t| t.name() == ToolName::UpdateRequest));

        assert!(set.subset(Role::Unknown.allowed_tools()).is_empty());
    }

    #[test]
    fn usage_texts_are_single_line_without_escapes() {
        // usage() goes verbatim into the agent prompt; a stray backslash or
        // line break there is model-visible noise.
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(RegisterRequestTool::new(None)),
            Arc::new(QueryStatusTool::new(None)),
            Arc::new(UpdateRequestTool::new(None)),
            Arc::new(DocumentSearchTool::new(None)),
        ];
        for tool in tools {
            let usage = tool.usage();
            assert!(!usage.contains('\\'), "{:?} usage contains a backslash", tool.name());
            assert!(!usage.contains('\n'), "{:?} usage spans multiple lines", tool.name());
        }
    }
}
