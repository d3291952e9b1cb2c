use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{error, info};

use crate::domain::{RequestStatus, ToolName, VALID_STATUSES};

use super::{Tool, ToolScope, query_status::not_found_message};

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    request_code: String,
    new_status: String,
    new_response: String,
}

/// Resolves a reimbursement request: sets status, team response and response
/// date together. Last write wins; there is no optimistic-concurrency check.
pub struct UpdateRequestTool {
    pool: Option<PgPool>,
}

impl UpdateRequestTool {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    async fn update(
        &self,
        code: &str,
        status: RequestStatus,
        response: &str,
    ) -> anyhow::Result<bool> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("reimbursement database is not available"))?;

        let response_date = chrono::Local::now().date_naive();

        let result = sqlx::query(
            r#"
            UPDATE reimbursements
            SET status = $1, team_response = $2, response_date = $3
            WHERE request_code = $4
            "#,
        )
        .bind(status.as_str())
        .bind(response)
        .bind(response_date)
        .bind(code)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

pub fn invalid_status_message() -> String {
    format!("Invalid status. It must be one of: {VALID_STATUSES}")
}

#[async_trait]
impl Tool for UpdateRequestTool {
    fn name(&self) -> ToolName {
        ToolName::UpdateRequest
    }

    fn usage(&self) -> &'static str {
        concat!(
            "update_request: updates the status, team response and response date ",
            "of a registered reimbursement request. ",
            "Arguments: {\"request_code\": string, ",
            "\"new_status\": \"Pending\" | \"Approved\" | \"Rejected\" | \"Observed\", ",
            "\"new_response\": string}. ",
            "When the user only says 'status' or 'response', map those to new_status and new_response.",
        )
    }

    async fn call(&self, args: Value, _scope: &ToolScope) -> String {
        let args: UpdateArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => {
                return format!(
                    "Invalid arguments for update_request (expected request_code, new_status, new_response): {e}"
                );
            }
        };

        // Validate before touching the database; an invalid status must leave
        // the record unmodified.
        let Some(status) = RequestStatus::parse(&args.new_status) else {
            return invalid_status_message();
        };

        let code = args.request_code.trim().to_string();

        match self.update(&code, status, &args.new_response).await {
            Ok(true) => {
                info!(request_code = %code, status = %status, "updated reimbursement request");
                format!(
                    "Request **{code}** updated successfully:\n\
                     - New status: **{status}**\n\
                     - New response: **{}**",
                    args.new_response
                )
            }
            Ok(false) => not_found_message(&code),
            Err(e) => {
                error!(error = %e, "failed to update reimbursement request");
                format!("Failed to update the request in the database. Details: {e}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_status_lists_valid_values() {
        let message = invalid_status_message();
        for status in ["Pending", "Approved", "Rejected", "Observed"] {
            assert!(message.contains(status));
        }
    }
}
