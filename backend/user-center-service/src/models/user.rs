use crate::error::UserCenterError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use std::str::FromStr;

/// Role enum matching database user_role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        }
    }
}

impl FromStr for Role {
    type Err = UserCenterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::SuperAdmin),
            other => Err(UserCenterError::Validation(format!("unknown role: {}", other))),
        }
    }
}

/// Account status enum matching database user_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
    Blocked,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Inactive => "inactive",
            Status::Blocked => "blocked",
        }
    }
}

impl FromStr for Status {
    type Err = UserCenterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(Status::Active),
            "inactive" => Ok(Status::Inactive),
            "blocked" => Ok(Status::Blocked),
            other => Err(UserCenterError::Validation(format!(
                "unknown status: {}",
                other
            ))),
        }
    }
}

/// Product attached to a user; `product_id` is unique within one user's list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ProductAssociation {
    pub product_id: String,
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

/// User model - core identity entity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub nickname: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub status: Status,
    pub disabled_remark: Option<String>,
    pub source: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Loaded separately from user_products, in join order
    #[sqlx(skip)]
    pub products: Vec<ProductAssociation>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    pub fn has_product(&self, product_id: &str) -> bool {
        self.products.iter().any(|p| p.product_id == product_id)
    }
}

/// Minimal authenticated projection of a user; never carries the password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub nickname: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub status: Status,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            avatar: user.avatar.clone(),
            role: user.role,
            status: user.status,
        }
    }
}

/// Row to insert when creating a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub nickname: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub status: Status,
    pub disabled_remark: Option<String>,
    pub source: Option<String>,
}

/// Partial update; `None` leaves a column untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<Role>,
    pub status: Option<Status>,
    /// `Some(None)` clears the remark
    pub disabled_remark: Option<Option<String>>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self == &UserChanges::default()
    }
}

/// Filters for the admin user listing; every field is optional
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Substring match
    pub username: Option<String>,
    /// Substring match
    pub email: Option<String>,
    pub role: Option<Role>,
    pub status: Option<Status>,
    pub source: Option<String>,
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.page_size as i64
    }
}

/// One page of results plus the unpaged total
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}
