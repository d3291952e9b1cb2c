mod config;
mod db;
mod domain;
mod service;
mod tasks;
mod tools;
mod workflow;

use std::sync::Arc;

use agent_flow::{InMemorySessionStorage, PostgresSessionStorage, SessionStorage};
use sqlx::PgPool;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::service::AppState;
use crate::tools::{
    DocumentSearchTool, QueryStatusTool, RegisterRequestTool, ToolSet, UpdateRequestTool,
};
use crate::workflow::create_flow_runner;

/// Initialize structured tracing based on environment variables.
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "reimbursement_service=debug,agent_flow=debug,tower_http=debug".into());

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    // Required for the supervisor and both agents.
    if std::env::var("OPENROUTER_API_KEY").is_err() {
        error!("OPENROUTER_API_KEY not set");
        std::process::exit(1);
    }

    let config = Config::from_env();

    // Every downstream collaborator is initialized defensively: a failure
    // degrades the corresponding capability instead of aborting startup.
    let reimbursements_pool = connect_reimbursements_pool(&config).await;
    let documents_pool = connect_documents_pool(&config).await;
    let session_storage = create_session_storage(reimbursements_pool.clone()).await;

    let tool_set = Arc::new(ToolSet::new(vec![
        Arc::new(RegisterRequestTool::new(reimbursements_pool.clone())),
        Arc::new(QueryStatusTool::new(reimbursements_pool.clone())),
        Arc::new(UpdateRequestTool::new(reimbursements_pool)),
        Arc::new(DocumentSearchTool::new(documents_pool)),
    ]));
    info!("total tools available: {}", tool_set.len());

    let flow_runner = create_flow_runner(tool_set, session_storage.clone());

    let app = service::build_router(AppState {
        session_storage,
        flow_runner,
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    info!("server running on http://{addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("server error: {e}");
        std::process::exit(1);
    }
}

async fn connect_reimbursements_pool(config: &Config) -> Option<PgPool> {
    let url = match &config.database_url {
        Some(url) => url,
        None => {
            info!("DATABASE_URL not set, reimbursement tools disabled");
            return None;
        }
    };

    match db::connect_pool(url, config.db_min_connections, config.db_max_connections).await {
        Ok(pool) => {
            if let Err(e) = db::ensure_schema(&pool).await {
                error!("failed to ensure reimbursements schema: {e}");
            }
            info!("connected to reimbursement database");
            Some(pool)
        }
        Err(e) => {
            error!("failed to connect to reimbursement database, SQL tools disabled: {e}");
            None
        }
    }
}

async fn connect_documents_pool(config: &Config) -> Option<PgPool> {
    let url = match &config.documents_database_url {
        Some(url) => url,
        None => {
            info!("DOCUMENTS_DATABASE_URL not set, document search disabled");
            return None;
        }
    };

    match db::connect_pool(url, 1, 5).await {
        Ok(pool) => {
            info!("connected to documentation index");
            Some(pool)
        }
        Err(e) => {
            error!("failed to connect to documentation index, document search disabled: {e}");
            None
        }
    }
}

async fn create_session_storage(pool: Option<PgPool>) -> Arc<dyn SessionStorage> {
    match pool {
        Some(pool) => match PostgresSessionStorage::with_pool(pool).await {
            Ok(storage) => {
                info!("using PostgreSQL session storage");
                Arc::new(storage)
            }
            Err(e) => {
                error!("failed to initialize PostgreSQL session storage, falling back to in-memory: {e}");
                Arc::new(InMemorySessionStorage::new())
            }
        },
        None => {
            info!("using in-memory session storage (set DATABASE_URL to persist sessions)");
            Arc::new(InMemorySessionStorage::new())
        }
    }
}
