/// Service configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres for sessions and reimbursement records. Optional: without it
    /// the service degrades to in-memory sessions and disabled SQL tools.
    pub database_url: Option<String>,
    /// Postgres holding the pgvector documentation index. Falls back to
    /// `database_url` when unset.
    pub documents_database_url: Option<String>,
    pub db_min_connections: u32,
    pub db_max_connections: u32,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").ok();
        let documents_database_url = std::env::var("DOCUMENTS_DATABASE_URL")
            .ok()
            .or_else(|| database_url.clone());

        Self {
            database_url,
            documents_database_url,
            db_min_connections: env_parse("DB_MIN_CONNECTIONS", 1),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 20),
            port: env_parse("PORT", 8080),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
