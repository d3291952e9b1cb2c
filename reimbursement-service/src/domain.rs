use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller role for a single turn. Supplied with every request, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    General,
    Unknown,
}

impl Role {
    /// Parse the free-text role string sent by the frontend. Anything
    /// unrecognized collapses to `Unknown`, which carries no capabilities.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "administrator" | "admin" => Role::Administrator,
            "general" => Role::General,
            _ => Role::Unknown,
        }
    }

    /// Declarative capability table: which tools an agent built for this
    /// role may invoke. Checked at agent construction, not left to prompt text.
    pub fn allowed_tools(&self) -> &'static [ToolName] {
        match self {
            Role::Administrator => &[
                ToolName::RegisterRequest,
                ToolName::QueryStatus,
                ToolName::UpdateRequest,
            ],
            Role::General => &[ToolName::RegisterRequest, ToolName::QueryStatus],
            Role::Unknown => &[],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Administrator => write!(f, "Administrator"),
            Role::General => write!(f, "General"),
            Role::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    RegisterRequest,
    QueryStatus,
    UpdateRequest,
    DocumentSearch,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::RegisterRequest => "register_request",
            ToolName::QueryStatus => "query_status",
            ToolName::UpdateRequest => "update_request",
            ToolName::DocumentSearch => "document_search",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expense category of a reimbursement request. Determines the request-code prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseType {
    Medicines,
    Exams,
    Consultations,
    Other,
}

impl ExpenseType {
    /// Normalize free text (trim + capitalize) into an expense type.
    /// Unrecognized values fall into `Other`.
    pub fn parse(s: &str) -> Self {
        match capitalize(s.trim()).as_str() {
            "Medicines" => ExpenseType::Medicines,
            "Exams" => ExpenseType::Exams,
            "Consultations" => ExpenseType::Consultations,
            _ => ExpenseType::Other,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            ExpenseType::Medicines => "MED",
            ExpenseType::Exams => "EXA",
            ExpenseType::Consultations => "CON",
            ExpenseType::Other => "OTR",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseType::Medicines => "Medicines",
            ExpenseType::Exams => "Exams",
            ExpenseType::Consultations => "Consultations",
            ExpenseType::Other => "Other",
        }
    }
}

impl fmt::Display for ExpenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a reimbursement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Observed,
}

pub const VALID_STATUSES: &str = "Pending, Approved, Rejected, Observed";

impl RequestStatus {
    /// Normalize free text (trim + capitalize) into a status. Returns
    /// `None` for anything outside the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        match capitalize(s.trim()).as_str() {
            "Pending" => Some(RequestStatus::Pending),
            "Approved" => Some(RequestStatus::Approved),
            "Rejected" => Some(RequestStatus::Rejected),
            "Observed" => Some(RequestStatus::Observed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Approved => "Approved",
            RequestStatus::Rejected => "Rejected",
            RequestStatus::Observed => "Observed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First letter uppercase, rest lowercase.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
