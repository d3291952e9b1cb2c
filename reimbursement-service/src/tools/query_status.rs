use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::Row;
use tracing::error;

use crate::domain::{Role, ToolName};

use super::{Tool, ToolScope};

#[derive(Debug, Deserialize)]
struct QueryStatusArgs {
    request_code: String,
}

/// Looks up a reimbursement request by code, optionally scoped to a requester.
pub struct QueryStatusTool {
    pool: Option<PgPool>,
}

impl QueryStatusTool {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    async fn query(&self, code: &str, login: Option<&str>) -> anyhow::Result<Option<String>> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("reimbursement database is not available"))?;

        let row = match login {
            Some(login) => {
                sqlx::query(
                    r#"
                    SELECT request_code, requester_login, insured_full_name, beneficiary_full_name,
                           expense_type, amount, status, registration_date, response_date, team_response
                    FROM reimbursements
                    WHERE request_code = $1 AND requester_login = $2
                    "#,
                )
                .bind(code)
                .bind(login)
                .fetch_optional(pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT request_code, requester_login, insured_full_name, beneficiary_full_name,
                           expense_type, amount, status, registration_date, response_date, team_response
                    FROM reimbursements
                    WHERE request_code = $1
                    "#,
                )
                .bind(code)
                .fetch_optional(pool)
                .await?
            }
        };

        Ok(row.map(|row| {
            let response_date: Option<NaiveDate> = row.get("response_date");
            format!(
                "Details for request **{}**:\n\
                 - Requester: {}\n\
                 - Insured: {}\n\
                 - Beneficiary: {}\n\
                 - Expense type: {}\n\
                 - Amount: {:.2}\n\
                 - Registration date: {}\n\
                 - Status: {}\n\
                 - Team response: {}\n\
                 - Response date: {}",
                row.get::<String, _>("request_code"),
                row.get::<String, _>("requester_login"),
                row.get::<String, _>("insured_full_name"),
                row.get::<String, _>("beneficiary_full_name"),
                row.get::<String, _>("expense_type"),
                row.get::<f64, _>("amount"),
                row.get::<NaiveDate, _>("registration_date"),
                row.get::<String, _>("status"),
                row.get::<String, _>("team_response"),
                response_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "pending".to_string()),
            )
        }))
    }
}

/// Single not-found message. A code owned by another user and a code that
/// does not exist must be indistinguishable to the caller.
pub fn not_found_message(code: &str) -> String {
    format!("No request was found with code: **{code}**.")
}

/// Shared final step for both the scoped and the unfiltered lookup: an empty
/// result always resolves to the same not-found message.
fn lookup_reply(code: &str, details: Option<String>) -> String {
    details.unwrap_or_else(|| not_found_message(code))
}

#[async_trait]
impl Tool for QueryStatusTool {
    fn name(&self) -> ToolName {
        ToolName::QueryStatus
    }

    fn usage(&self) -> &'static str {
        concat!(
            "query_status: looks up the status and details of a reimbursement request by its code. ",
            "Arguments: {\"request_code\": string (e.g. MED_00001)}. ",
            "Access is scoped automatically: non-administrators only see their own requests.",
        )
    }

    async fn call(&self, args: Value, scope: &ToolScope) -> String {
        let args: QueryStatusArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => {
                return format!("Invalid arguments for query_status (expected request_code): {e}");
            }
        };

        let code = args.request_code.trim().to_string();

        // Access scope is decided here, not by whatever the model put in the
        // arguments: General users only ever see their own requests, while
        // Administrators query unfiltered.
        let login = match scope.role {
            Role::Administrator => None,
            _ => Some(scope.login.as_str()),
        };

        match self.query(&code, login).await {
            Ok(details) => lookup_reply(&code, details),
            Err(e) => {
                error!(error = %e, "failed to query reimbursement request");
                format!("Failed to query the reimbursement database. Details: {e}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_lookup_does_not_leak_ownership() {
        // A foreign-owned code (scoped query, no row) and a nonexistent code
        // (unfiltered query, no row) both land in lookup_reply with None and
        // must produce the exact same message.
        let reply = lookup_reply("MED_00001", None);
        assert_eq!(reply, "No request was found with code: **MED_00001**.");
        assert_eq!(reply, not_found_message("MED_00001"));
        assert!(!reply.contains("user"));
    }

    #[test]
    fn found_lookup_passes_the_details_through() {
        let details = "Details for request **MED_00001**".to_string();
        assert_eq!(lookup_reply("MED_00001", Some(details.clone())), details);
    }

    #[test]
    fn stray_login_argument_is_ignored() {
        // Access scoping is decided by the caller's role, so a login the
        // model invents in the arguments must not break parsing.
        let args: QueryStatusArgs = serde_json::from_value(serde_json::json!({
            "request_code": "MED_00001",
            "login": "someone_else",
        }))
        .unwrap();
        assert_eq!(args.request_code, "MED_00001");
        assert!(!QueryStatusTool::new(None).usage().contains("login"));
    }
}
