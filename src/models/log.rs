//! Audit log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed enumeration of auditable operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Login,
    Logout,
    InvoiceCreate,
    InvoiceDuplicate,
    InvoiceParseError,
    InvoiceSaveError,
    InvoiceProcessError,
    InvoiceEdit,
    InvoiceDelete,
    UserCreate,
    UserEdit,
    UserDelete,
    UserPasswordChange,
    UserRoleChange,
    UserStatusToggle,
    ConfigUpdate,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Login => "LOGIN",
            ActionKind::Logout => "LOGOUT",
            ActionKind::InvoiceCreate => "INVOICE_CREATE",
            ActionKind::InvoiceDuplicate => "INVOICE_DUPLICATE",
            ActionKind::InvoiceParseError => "INVOICE_PARSE_ERROR",
            ActionKind::InvoiceSaveError => "INVOICE_SAVE_ERROR",
            ActionKind::InvoiceProcessError => "INVOICE_PROCESS_ERROR",
            ActionKind::InvoiceEdit => "INVOICE_EDIT",
            ActionKind::InvoiceDelete => "INVOICE_DELETE",
            ActionKind::UserCreate => "USER_CREATE",
            ActionKind::UserEdit => "USER_EDIT",
            ActionKind::UserDelete => "USER_DELETE",
            ActionKind::UserPasswordChange => "USER_PASSWORD_CHANGE",
            ActionKind::UserRoleChange => "USER_ROLE_CHANGE",
            ActionKind::UserStatusToggle => "USER_STATUS_TOGGLE",
            ActionKind::ConfigUpdate => "CONFIG_UPDATE",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable audit trail entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: Uuid,
    /// None for operations with no resolved user (e.g. failed logins)
    pub user_id: Option<Uuid>,
    /// Always present, even when the user is unknown
    pub username: String,
    pub action: String,
    pub description: String,
    pub ip_address: String,
    pub user_agent: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub success: bool,
    pub error_message: String,
    /// Best-effort geolocation, filled at read time; never persisted here
    pub ip_location: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filters for the admin log viewer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilters {
    pub action: Option<String>,
    /// Substring match on username
    pub username: Option<String>,
    /// Substring match on client IP
    pub ip_address: Option<String>,
    pub success: Option<bool>,
    /// Inclusive date range, YYYY-MM-DD
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// A page of log entries
#[derive(Debug, Serialize)]
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    pub pagination: super::Pagination,
}

/// Login/activity rollup counters for the admin dashboard
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogStatistics {
    /// Logins today
    pub today_logins: u64,
    /// Logins in the last 7 days
    pub week_logins: u64,
    /// Logins in the last 30 days
    pub month_logins: u64,
    /// Distinct users active in the last 30 days
    pub active_users: u64,
    /// Failed logins in the last 7 days
    pub failed_logins: u64,
}
