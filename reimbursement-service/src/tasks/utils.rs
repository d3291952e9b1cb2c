use std::sync::Arc;

use agent_flow::{ChatMessage, MessageRole};
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::{Chat, Message};
use rig::providers::openrouter;
use serde::Deserialize;
use tracing::info;

use crate::tools::{Tool, ToolScope};

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Maximum number of tool invocations within a single agent turn.
pub const MAX_TOOL_CALLS: usize = 5;

pub const TOOL_LIMIT_REPLY: &str =
    "I could not complete the action with the available tools. Could you rephrase your request?";

/// Create an LLM agent using OpenRouter with the given preamble.
pub fn llm_agent(preamble: &str) -> anyhow::Result<Agent<openrouter::CompletionModel>> {
    let api_key = std::env::var("OPENROUTER_API_KEY")
        .map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;
    let model =
        std::env::var("OPENROUTER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let client = openrouter::Client::new(&api_key);
    Ok(client.agent(&model).preamble(preamble).build())
}

/// Convert persisted chat history to rig messages.
pub fn to_rig_messages(messages: &[ChatMessage]) -> Vec<Message> {
    messages
        .iter()
        .map(|msg| match msg.role {
            MessageRole::User => Message::user(msg.content.clone()),
            MessageRole::Assistant => Message::assistant(msg.content.clone()),
            // rig has no system message variant in history; prefix instead.
            MessageRole::System => Message::user(format!("[SYSTEM] {}", msg.content)),
        })
        .collect()
}

/// A tool invocation emitted by the model as a bare JSON object.
#[derive(Debug, Deserialize, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Try to interpret a model response as a tool call. Anything that does not
/// parse as the JSON envelope is a plain reply for the user.
pub fn parse_tool_call(response: &str) -> Option<ToolCall> {
    serde_json::from_str(strip_code_fence(response)).ok()
}

fn strip_code_fence(s: &str) -> &str {
    let s = s.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}

/// Prompt section describing the tool-call protocol and the available tools.
pub fn tool_protocol(tools: &[Arc<dyn Tool>]) -> String {
    let listing = tools
        .iter()
        .map(|t| format!("- {}", t.usage()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "To call a tool, respond with ONLY a JSON object of the form \
         {{\"tool\": \"<name>\", \"args\": {{ ... }}}} and nothing else. \
         When you have everything you need, reply to the user in plain text instead.\n\
         Available tools:\n{listing}"
    )
}

/// One tool-augmented reasoning turn: the model either replies in plain text
/// or requests tool calls, whose outputs are fed back until it answers or the
/// call budget runs out.
pub async fn run_agent_turn(
    agent: &Agent<openrouter::CompletionModel>,
    mut history: Vec<Message>,
    user_input: &str,
    tools: &[Arc<dyn Tool>],
    scope: &ToolScope,
) -> anyhow::Result<String> {
    let mut prompt = user_input.to_string();

    for _ in 0..MAX_TOOL_CALLS {
        let response = agent.chat(prompt.as_str(), history.clone()).await?;

        let Some(call) = parse_tool_call(&response) else {
            return Ok(response);
        };

        let output = match tools.iter().find(|t| t.name().as_str() == call.tool) {
            Some(tool) => {
                info!(tool = %call.tool, "agent invoked tool");
                tool.call(call.args, scope).await
            }
            None => format!("Tool '{}' is not available to you.", call.tool),
        };

        history.push(Message::user(prompt.clone()));
        history.push(Message::assistant(response));
        prompt = format!(
            "TOOL RESULT ({}): {}\nUse this result to answer the user's last request, \
             or call another tool if you still need more information.",
            call.tool, output
        );
    }

    Ok(TOOL_LIMIT_REPLY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_tool_call() {
        assert!(parse_tool_call("Your request MED_00001 is Pending.").is_none());
    }

    #[test]
    fn parses_bare_json_envelope() {
        let call = parse_tool_call(r#"{"tool": "query_status", "args": {"request_code": "MED_00001"}}"#)
            .unwrap();
        assert_eq!(call.tool, "query_status");
        assert_eq!(call.args["request_code"], "MED_00001");
    }

    #[test]
    fn parses_fenced_json_envelope() {
        let response = "```json\n{\"tool\": \"document_search\", \"args\": {\"question\": \"requirements\"}}\n```";
        let call = parse_tool_call(response).unwrap();
        assert_eq!(call.tool, "document_search");
    }

    #[test]
    fn missing_args_default_to_null() {
        let call = parse_tool_call(r#"{"tool": "query_status"}"#).unwrap();
        assert!(call.args.is_null());
    }
}
