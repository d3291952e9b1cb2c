use std::sync::Arc;

use agent_flow::{FlowRunner, SessionStorage};
use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error};
use uuid::Uuid;

use crate::tasks::session_keys;

pub const SERVICE_NAME: &str = "Medical Reimbursement Agent API";

const MISSING_PARAMS_MESSAGE: &str = "Error: missing session, message, or user parameters.";
const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred while executing the agent.";

const DEFAULT_ROLE: &str = "General";
const DEFAULT_USERNAME: &str = "default_user";
const DEFAULT_DISPLAY_NAME: &str = "Unknown User";

#[derive(Clone)]
pub struct AppState {
    pub session_storage: Arc<dyn SessionStorage>,
    pub flow_runner: FlowRunner,
}

/// Parameters accepted on `/agent`, via query string (GET) or JSON body (POST).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentParams {
    pub id_agente: Option<String>,
    pub msg: Option<String>,
    pub user_role: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/agent", get(agent_get).post(agent_post))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Tag every request with a correlation id and wrap it in a tracing span.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

async fn agent_get(
    State(state): State<AppState>,
    Query(params): Query<AgentParams>,
) -> (StatusCode, Json<Value>) {
    handle_agent(state, params).await
}

/// POST accepts a JSON body; clients that send only query parameters still work.
async fn agent_post(
    State(state): State<AppState>,
    Query(query): Query<AgentParams>,
    body: Option<Json<AgentParams>>,
) -> (StatusCode, Json<Value>) {
    let params = body.map(|Json(p)| p).unwrap_or(query);
    handle_agent(state, params).await
}

async fn handle_agent(state: AppState, params: AgentParams) -> (StatusCode, Json<Value>) {
    let session_id = params.id_agente.filter(|s| !s.trim().is_empty());
    let msg = params.msg.filter(|s| !s.trim().is_empty());

    let (Some(session_id), Some(msg)) = (session_id, msg) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "response": MISSING_PARAMS_MESSAGE, "status": "error" })),
        );
    };

    let user_role = params.user_role.unwrap_or_else(|| DEFAULT_ROLE.to_string());
    let username = params.username.unwrap_or_else(|| DEFAULT_USERNAME.to_string());
    let display_name = params
        .display_name
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

    // Per-turn inputs; the runner applies them under the session lock, so
    // concurrent turns on the same session cannot overwrite each other's
    // message before it is consumed. Sessions are created implicitly on
    // first use.
    let inputs = [
        (session_keys::USER_INPUT, json!(msg)),
        (session_keys::USER_ROLE, json!(user_role)),
        (session_keys::USER_LOGIN, json!(username)),
        (session_keys::DISPLAY_NAME, json!(display_name)),
    ];

    match state.flow_runner.run_turn(&session_id, &inputs).await {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "response": result.response.unwrap_or_default(),
                "thread_id": session_id,
                "status": "success"
            })),
        ),
        Err(e) => {
            error!(session_id = %session_id, error = %e, "failed to execute agent graph");
            internal_error(&e.to_string())
        }
    }
}

fn internal_error(detail: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "response": INTERNAL_ERROR_MESSAGE,
            "status": "error",
            "error_detail": detail
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_flow::InMemorySessionStorage;
    use std::sync::Arc;

    use crate::tools::{
        DocumentSearchTool, QueryStatusTool, RegisterRequestTool, ToolSet, UpdateRequestTool,
    };
    use crate::workflow::create_flow_runner;

    fn state() -> AppState {
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let tool_set = Arc::new(ToolSet::new(vec![
            Arc::new(RegisterRequestTool::new(None)),
            Arc::new(QueryStatusTool::new(None)),
            Arc::new(UpdateRequestTool::new(None)),
            Arc::new(DocumentSearchTool::new(None)),
        ]));
        AppState {
            flow_runner: create_flow_runner(tool_set, storage.clone()),
            session_storage: storage,
        }
    }

    #[tokio::test]
    async fn missing_message_is_rejected_with_400() {
        let params = AgentParams {
            id_agente: Some("session-1".to_string()),
            ..Default::default()
        };
        let (status, Json(body)) = handle_agent(state(), params).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(body.get("thread_id").is_none());
    }

    #[tokio::test]
    async fn missing_session_id_is_rejected_with_400() {
        let params = AgentParams {
            msg: Some("hello".to_string()),
            ..Default::default()
        };
        let (status, Json(body)) = handle_agent(state(), params).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn blank_parameters_count_as_missing() {
        let params = AgentParams {
            id_agente: Some("  ".to_string()),
            msg: Some("hello".to_string()),
            ..Default::default()
        };
        let (status, _) = handle_agent(state(), params).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
