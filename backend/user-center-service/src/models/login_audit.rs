use super::session::ClientInfo;
use crate::validators::{truncate, MAX_AUDIT_USERNAME_LENGTH};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Append-only record of one authentication attempt
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LoginAuditEntry {
    pub id: i64,
    /// `None` when the submitted name resolved to no user
    pub user_id: Option<i64>,
    pub username: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoginAudit {
    pub user_id: Option<i64>,
    pub username: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub message: String,
}

impl NewLoginAudit {
    /// The submitted name is recorded as typed, cut to the column width
    pub fn attempt(
        user_id: Option<i64>,
        username: &str,
        client: &ClientInfo,
        success: bool,
        message: &str,
    ) -> Self {
        Self {
            user_id,
            username: truncate(username, MAX_AUDIT_USERNAME_LENGTH),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            success,
            message: message.to_string(),
        }
    }
}
