//! Caller-supplied inputs for account operations.
//!
//! Required strings default to empty so that a missing field surfaces as a
//! validation failure from the account service instead of a decode error.
//! Roles and statuses arrive as strings and are parsed at the service boundary.
use serde::Deserialize;

/// Self-service registration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub nickname: Option<String>,
    pub source: Option<String>,
}

/// Login with a username or an email in the same field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default, alias = "email", alias = "account")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default, alias = "old_password")]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Fields a user may change on their own profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdateRequest {
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub password: Option<String>,
}

/// Admin-created account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminCreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub source: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub disabled_remark: Option<String>,
}

/// Admin edit of any account field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub disabled_remark: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddProductRequest {
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub name: String,
}
