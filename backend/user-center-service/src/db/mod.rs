/// Persistence layer for users, sessions, product associations and login audit
///
/// [`CredentialStore`] is the seam between the account logic and storage.
/// Two implementations exist:
///
/// - `postgres`: sqlx over a pooled PostgreSQL connection
/// - `memory`: a lock-guarded in-process store for local runs and tests
///
/// Uniqueness violations surface as [`UserCenterError::DuplicateKey`] with the
/// colliding field; multi-row mutations are atomic in both implementations.
///
/// [`UserCenterError::DuplicateKey`]: crate::error::UserCenterError::DuplicateKey
pub mod memory;
pub mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

use crate::error::Result;
use crate::models::{
    LoginAuditEntry, NewLoginAudit, NewSession, NewUser, PageRequest, ProductAssociation, Session,
    User, UserChanges, UserFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find a user whose username equals `username` or whose email equals `email`
    ///
    /// A username match wins when both exist. `exclude_id` skips one record,
    /// used when re-checking uniqueness during an update.
    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
        exclude_id: Option<i64>,
    ) -> Result<Option<User>>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Apply a partial update and return the new record
    ///
    /// Fails with `NotFound` when the user is absent. When `password_hash` is
    /// set, every session of the user is deleted in the same atomic step.
    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<User>;

    /// Remove the user with its sessions, audit entries and products
    ///
    /// Returns `false` when no such user existed.
    async fn delete_user_cascade(&self, id: i64) -> Result<bool>;

    /// Filtered page ordered by id, plus the unpaged total
    async fn list_users(&self, filter: &UserFilter, page: &PageRequest)
        -> Result<(Vec<User>, i64)>;

    async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Fails `NotFound` for an unknown user, `DuplicateAssociation` for a repeated product id
    async fn add_product(&self, user_id: i64, product: ProductAssociation) -> Result<()>;

    /// Fails `NotFound` for an unknown user, `AssociationNotFound` for an unknown product id
    async fn remove_product(&self, user_id: i64, product_id: &str) -> Result<()>;

    async fn create_session(&self, session: NewSession) -> Result<Session>;

    /// Session with exactly this token that has not yet expired
    async fn find_valid_session(&self, token: &str) -> Result<Option<Session>>;

    async fn delete_session(&self, token: &str) -> Result<u64>;

    async fn delete_all_sessions(&self, user_id: i64) -> Result<u64>;

    /// Unexpired sessions, newest first
    async fn list_sessions(&self, user_id: i64) -> Result<Vec<Session>>;

    async fn append_login_audit(&self, entry: NewLoginAudit) -> Result<()>;

    /// Newest first
    async fn list_login_audit(&self, user_id: i64, limit: i64) -> Result<Vec<LoginAuditEntry>>;

    /// Release held resources; called once at shutdown
    async fn close(&self);
}
