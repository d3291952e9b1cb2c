use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{error, info};

use crate::domain::{ExpenseType, Role, ToolName};

use super::{Tool, ToolScope};

const DEFAULT_TEAM_RESPONSE: &str = "Under review by the Reimbursements team";

#[derive(Debug, Deserialize)]
struct RegisterArgs {
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    insured_name: Option<String>,
    expense_type: String,
    amount: f64,
    #[serde(default)]
    beneficiary_name: Option<String>,
}

/// Registers a new reimbursement request and returns the generated code.
pub struct RegisterRequestTool {
    pool: Option<PgPool>,
}

impl RegisterRequestTool {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    async fn register(&self, args: RegisterArgs, scope: &ToolScope) -> anyhow::Result<String> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("reimbursement database is not available"))?;

        let expense_type = ExpenseType::parse(&args.expense_type);

        // The requester is the authenticated user; an Administrator may
        // register on behalf of someone else by passing an explicit login.
        let login = match scope.role {
            Role::Administrator => args.login.unwrap_or_else(|| scope.login.clone()),
            _ => scope.login.clone(),
        };
        let insured_name = args
            .insured_name
            .unwrap_or_else(|| scope.display_name.clone());
        let beneficiary = args
            .beneficiary_name
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| insured_name.clone());
        let registration_date = chrono::Local::now().date_naive();

        // The read-then-write sequence generator races under concurrency, so
        // both steps run in a transaction holding a per-prefix advisory lock.
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(expense_type.prefix())
            .execute(&mut *tx)
            .await?;

        let max_suffix: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(CAST(SUBSTRING(request_code FROM 5) AS INTEGER)), 0)::BIGINT
            FROM reimbursements
            WHERE request_code LIKE $1 ESCAPE '\'
            "#,
        )
        .bind(code_prefix_pattern(expense_type.prefix()))
        .fetch_one(&mut *tx)
        .await?;

        let request_code = next_code(expense_type.prefix(), max_suffix);

        sqlx::query(
            r#"
            INSERT INTO reimbursements
                (request_code, requester_login, insured_full_name, beneficiary_full_name,
                 expense_type, amount, status, registration_date, response_date, team_response)
            VALUES ($1, $2, $3, $4, $5, $6, 'Pending', $7, NULL, $8)
            "#,
        )
        .bind(&request_code)
        .bind(&login)
        .bind(&insured_name)
        .bind(&beneficiary)
        .bind(expense_type.as_str())
        .bind(args.amount)
        .bind(registration_date)
        .bind(DEFAULT_TEAM_RESPONSE)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(%request_code, %login, "registered reimbursement request");
        Ok(format!(
            "Request registered in the system with code: {request_code}."
        ))
    }
}

/// Next request code for a prefix given the current maximum numeric suffix.
pub fn next_code(prefix: &str, max_suffix: i64) -> String {
    format!("{}_{:05}", prefix, max_suffix + 1)
}

/// LIKE pattern matching codes of one prefix. The underscore separator is
/// escaped: a bare `_` is a single-character wildcard and `MED_%` would also
/// match codes like `MEDX0001`.
fn code_prefix_pattern(prefix: &str) -> String {
    format!("{prefix}\\_%")
}

#[async_trait]
impl Tool for RegisterRequestTool {
    fn name(&self) -> ToolName {
        ToolName::RegisterRequest
    }

    fn usage(&self) -> &'static str {
        concat!(
            "register_request: registers a new medical reimbursement request. ",
            "Arguments: {\"login\": string, \"insured_name\": string, ",
            "\"expense_type\": \"Medicines\" | \"Exams\" | \"Consultations\" | \"Other\", ",
            "\"amount\": number, \"beneficiary_name\": string (optional)}. ",
            "If the user does not name a beneficiary, ask; if they say there is none, ",
            "omit it and the insured name is used. ",
            "If any required field is still missing, ask the user for it instead of calling the tool.",
        )
    }

    async fn call(&self, args: Value, scope: &ToolScope) -> String {
        let args: RegisterArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => {
                return format!(
                    "Invalid arguments for register_request (expected expense_type, amount and optional names): {e}"
                );
            }
        };

        let login_hint = scope.login.clone();
        match self.register(args, scope).await {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "failed to register reimbursement request");
                format!(
                    "Failed to register the request. Check that user '{login_hint}' exists and that the 'reimbursements' table has been created. Details: {e}"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_code_for_empty_prefix() {
        assert_eq!(next_code("MED", 0), "MED_00001");
    }

    #[test]
    fn code_increments_existing_maximum() {
        assert_eq!(next_code("MED", 7), "MED_00008");
        assert_eq!(next_code("OTR", 99_998), "OTR_99999");
    }

    #[test]
    fn prefix_pattern_escapes_the_underscore() {
        // `MED_%` with a wildcard underscore would also match `MEDX0001`.
        assert_eq!(code_prefix_pattern("MED"), r"MED\_%");
        assert_eq!(code_prefix_pattern("EXA"), r"EXA\_%");
    }
}
