use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connect a bounded pool shared by all tool invocations.
pub async fn connect_pool(
    database_url: &str,
    min_connections: u32,
    max_connections: u32,
) -> sqlx::Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(min_connections)
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Ensure the reimbursements table exists, same idiom as the session table.
pub async fn ensure_schema(pool: &PgPool) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reimbursements (
            request_code TEXT PRIMARY KEY,
            requester_login TEXT NOT NULL,
            insured_full_name TEXT NOT NULL,
            beneficiary_full_name TEXT NOT NULL,
            expense_type TEXT NOT NULL,
            amount DOUBLE PRECISION NOT NULL,
            status TEXT NOT NULL DEFAULT 'Pending',
            registration_date DATE NOT NULL,
            response_date DATE,
            team_response TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
