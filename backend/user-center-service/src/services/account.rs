//! Account service: registration, login, profile administration and product links.
//!
//! Every operation that needs a caller takes the [`Identity`] produced by
//! session validation; role checks happen here rather than in the transport.
use crate::config::{AccountSettings, BootstrapSettings};
use crate::db::CredentialStore;
use crate::error::{Result, UniqueField, UserCenterError};
use crate::models::{
    requests::{
        AddProductRequest, AdminCreateUserRequest, AdminUpdateUserRequest, ChangePasswordRequest,
        ListUsersQuery, LoginRequest, ProfileUpdateRequest, RegisterRequest,
    },
    ClientInfo, Identity, LoginAuditEntry, NewLoginAudit, NewUser, Page, PageRequest,
    ProductAssociation, Role, Session, Status, User, UserChanges, UserFilter,
};
use crate::security::{
    ensure_can_manage, ensure_not_self, hash_password, require_role, verify_password,
    SessionAuthority, ADMIN_ROLES,
};
use crate::validators::{
    check_email, check_password, check_username, optional, optional_bounded, required,
    required_bounded, MAX_NICKNAME_LENGTH, MAX_PRODUCT_ID_LENGTH, MAX_PRODUCT_NAME_LENGTH,
    MAX_SOURCE_LENGTH,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

/// Successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    #[serde(rename = "user")]
    pub identity: Identity,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Why a login attempt failed, kept for the audit trail
struct FailedAttempt {
    user_id: Option<i64>,
    reason: String,
    error: UserCenterError,
}

impl FailedAttempt {
    fn new(user_id: Option<i64>, reason: impl Into<String>, error: UserCenterError) -> Self {
        Self {
            user_id,
            reason: reason.into(),
            error,
        }
    }
}

/// Fields shared by self registration and admin creation
struct AccountDraft {
    username: String,
    email: String,
    password: String,
    nickname: Option<String>,
    avatar: Option<String>,
    source: Option<String>,
    role: Role,
    status: Status,
    disabled_remark: Option<String>,
}

pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    sessions: SessionAuthority,
    settings: AccountSettings,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: SessionAuthority,
        settings: AccountSettings,
    ) -> Self {
        Self {
            store,
            sessions,
            settings,
        }
    }

    pub fn sessions(&self) -> &SessionAuthority {
        &self.sessions
    }

    // ========================================================================
    // Registration
    // ========================================================================

    pub async fn register(&self, req: RegisterRequest) -> Result<User> {
        let user = self
            .create_account(AccountDraft {
                username: req.username,
                email: req.email,
                password: req.password,
                nickname: req.nickname,
                avatar: None,
                source: req.source,
                role: Role::User,
                status: Status::Active,
                disabled_remark: None,
            })
            .await?;

        info!(user_id = user.id, username = %user.username, "User registered");
        Ok(user)
    }

    pub async fn admin_create_user(
        &self,
        actor: &Identity,
        req: AdminCreateUserRequest,
    ) -> Result<User> {
        require_role(actor, ADMIN_ROLES)?;
        let role = parse_or(req.role.as_deref(), Role::User)?;
        let status = parse_or(req.status.as_deref(), Status::Active)?;
        ensure_can_manage(actor, role)?;

        let disabled_remark = optional(req.disabled_remark.as_deref());
        if status == Status::Blocked && disabled_remark.is_none() {
            return Err(blocked_needs_remark());
        }

        let user = self
            .create_account(AccountDraft {
                username: req.username,
                email: req.email,
                password: req.password,
                nickname: req.nickname,
                avatar: req.avatar,
                source: req.source,
                role,
                status,
                disabled_remark,
            })
            .await?;

        info!(
            user_id = user.id,
            actor_id = actor.id,
            role = user.role.as_str(),
            "User created by admin"
        );
        Ok(user)
    }

    /// Create the configured superadmin unless its username or email is taken
    pub async fn ensure_bootstrap_superadmin(
        &self,
        bootstrap: &BootstrapSettings,
    ) -> Result<Option<User>> {
        if let Some(existing) = self
            .store
            .find_user_by_username_or_email(&bootstrap.username, &bootstrap.email, None)
            .await?
        {
            info!(user_id = existing.id, "Bootstrap superadmin already present");
            return Ok(None);
        }

        let user = self
            .create_account(AccountDraft {
                username: bootstrap.username.clone(),
                email: bootstrap.email.clone(),
                password: bootstrap.password.clone(),
                nickname: None,
                avatar: None,
                source: Some("bootstrap".to_string()),
                role: Role::SuperAdmin,
                status: Status::Active,
                disabled_remark: None,
            })
            .await?;

        info!(user_id = user.id, username = %user.username, "Bootstrap superadmin created");
        Ok(Some(user))
    }

    async fn create_account(&self, draft: AccountDraft) -> Result<User> {
        let username = check_username(&draft.username)?;
        let email = check_email(&draft.email)?;
        check_password(&draft.password, self.settings.password_min_length)?;
        let nickname = optional_bounded("nickname", draft.nickname.as_deref(), MAX_NICKNAME_LENGTH)?
            .unwrap_or_else(|| username.clone());
        let source = optional_bounded("source", draft.source.as_deref(), MAX_SOURCE_LENGTH)?;
        self.ensure_unique(&username, &email, None).await?;

        let password_hash = hash_password(&draft.password)?;

        self.store
            .create_user(NewUser {
                username,
                email,
                password_hash,
                nickname,
                avatar: optional(draft.avatar.as_deref()),
                role: draft.role,
                status: draft.status,
                disabled_remark: draft.disabled_remark,
                source,
            })
            .await
    }

    /// One lookup against both columns, reporting the field that collided
    async fn ensure_unique(&self, username: &str, email: &str, exclude_id: Option<i64>) -> Result<()> {
        match self
            .store
            .find_user_by_username_or_email(username, email, exclude_id)
            .await?
        {
            Some(existing) => {
                let field = if existing.username == username {
                    UniqueField::Username
                } else {
                    UniqueField::Email
                };
                Err(UserCenterError::DuplicateKey { field })
            }
            None => Ok(()),
        }
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Authenticate by username or email and open a session
    ///
    /// Every attempt is audited. Unknown accounts and wrong passwords fail
    /// with the same error.
    pub async fn login(&self, req: LoginRequest, client: ClientInfo) -> Result<LoginOutcome> {
        let identifier = req.username.trim().to_string();
        let attempt = self.attempt_login(&identifier, &req.password, &client).await;

        let entry = match &attempt {
            Ok(outcome) => NewLoginAudit::attempt(
                Some(outcome.identity.id),
                &identifier,
                &client,
                true,
                "login succeeded",
            ),
            Err(failed) => {
                NewLoginAudit::attempt(failed.user_id, &identifier, &client, false, &failed.reason)
            }
        };
        self.record_attempt(entry).await;

        match attempt {
            Ok(outcome) => {
                info!(user_id = outcome.identity.id, "User logged in");
                Ok(outcome)
            }
            Err(failed) => Err(failed.error),
        }
    }

    async fn attempt_login(
        &self,
        identifier: &str,
        password: &str,
        client: &ClientInfo,
    ) -> std::result::Result<LoginOutcome, FailedAttempt> {
        if identifier.is_empty() || password.is_empty() {
            return Err(FailedAttempt::new(
                None,
                "missing username or password",
                UserCenterError::Validation("username and password are required".to_string()),
            ));
        }

        let user = self
            .store
            .find_user_by_username_or_email(identifier, identifier, None)
            .await
            .map_err(|e| FailedAttempt::new(None, "account lookup failed", e))?
            .ok_or_else(|| {
                FailedAttempt::new(None, "unknown account", UserCenterError::InvalidCredentials)
            })?;

        self.verify_credentials(&user, password).map_err(|e| {
            let reason = match e {
                UserCenterError::InvalidCredentials => "wrong password",
                _ => "password check failed",
            };
            FailedAttempt::new(Some(user.id), reason, e)
        })?;

        if !user.is_active() {
            return Err(FailedAttempt::new(
                Some(user.id),
                format!("account {}", user.status.as_str()),
                UserCenterError::AccountDisabled,
            ));
        }

        let issued = self
            .sessions
            .issue(&user, client)
            .await
            .map_err(|e| FailedAttempt::new(Some(user.id), "session issue failed", e))?;

        if let Err(e) = self.store.touch_last_login(user.id, Utc::now()).await {
            warn!(user_id = user.id, error = %e, "Failed to stamp last login");
        }

        Ok(LoginOutcome {
            identity: Identity::from(&user),
            token: issued.token,
            expires_at: issued.expires_at,
        })
    }

    /// Password check shared by login and change-password
    fn verify_credentials(&self, user: &User, password: &str) -> Result<()> {
        if verify_password(password, &user.password_hash)? {
            Ok(())
        } else {
            Err(UserCenterError::InvalidCredentials)
        }
    }

    async fn record_attempt(&self, entry: NewLoginAudit) {
        if let Err(e) = self.store.append_login_audit(entry).await {
            warn!(error = %e, "Failed to record login attempt");
        }
    }

    pub async fn current_identity(&self, token: &str) -> Result<Identity> {
        self.sessions.validate(token).await
    }

    pub async fn logout(&self, identity: &Identity, token: &str) -> Result<()> {
        self.sessions.revoke(identity.id, Some(token)).await?;
        Ok(())
    }

    pub async fn logout_all(&self, identity: &Identity) -> Result<u64> {
        self.sessions.revoke(identity.id, None).await
    }

    pub async fn list_own_sessions(&self, identity: &Identity) -> Result<Vec<Session>> {
        self.store.list_sessions(identity.id).await
    }

    // ========================================================================
    // Self service
    // ========================================================================

    /// Replace the password after re-checking the current one
    ///
    /// The store drops every session of the user together with the hash.
    pub async fn change_password(&self, user_id: i64, req: ChangePasswordRequest) -> Result<()> {
        if req.current_password.is_empty() {
            return Err(UserCenterError::Validation(
                "current password is required".to_string(),
            ));
        }

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(UserCenterError::user_not_found)?;
        self.verify_credentials(&user, &req.current_password)?;
        check_password(&req.new_password, self.settings.password_min_length)?;

        let password_hash = hash_password(&req.new_password)?;
        self.store
            .update_user(
                user_id,
                UserChanges {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id, "Password changed, all sessions revoked");
        Ok(())
    }

    pub async fn update_own_profile(&self, user_id: i64, req: ProfileUpdateRequest) -> Result<User> {
        let changes = UserChanges {
            nickname: optional_bounded("nickname", req.nickname.as_deref(), MAX_NICKNAME_LENGTH)?,
            avatar: optional(req.avatar.as_deref()),
            password_hash: self.new_password_hash(req.password.as_deref())?,
            ..Default::default()
        };
        if changes.is_empty() {
            return Err(nothing_to_update());
        }

        let revoked = changes.password_hash.is_some();
        let user = self.store.update_user(user_id, changes).await?;
        info!(user_id, password_changed = revoked, "Profile updated");
        Ok(user)
    }

    pub async fn add_product_association(
        &self,
        user_id: i64,
        req: AddProductRequest,
    ) -> Result<Vec<ProductAssociation>> {
        let product = ProductAssociation {
            product_id: required_bounded("product_id", &req.product_id, MAX_PRODUCT_ID_LENGTH)?
                .to_string(),
            name: required_bounded("name", &req.name, MAX_PRODUCT_NAME_LENGTH)?.to_string(),
            joined_at: Utc::now(),
        };
        self.store.add_product(user_id, product).await?;
        self.products_of(user_id).await
    }

    pub async fn remove_product_association(
        &self,
        user_id: i64,
        product_id: &str,
    ) -> Result<Vec<ProductAssociation>> {
        let product_id = required("product_id", product_id)?;
        self.store.remove_product(user_id, product_id).await?;
        self.products_of(user_id).await
    }

    async fn products_of(&self, user_id: i64) -> Result<Vec<ProductAssociation>> {
        Ok(self.load_user(user_id).await?.products)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    pub async fn get_user(&self, actor: &Identity, user_id: i64) -> Result<User> {
        require_role(actor, ADMIN_ROLES)?;
        self.load_user(user_id).await
    }

    pub async fn list_users(&self, actor: &Identity, query: ListUsersQuery) -> Result<Page<User>> {
        require_role(actor, ADMIN_ROLES)?;

        let filter = UserFilter {
            username: optional(query.username.as_deref()),
            email: optional(query.email.as_deref()),
            role: parse_optional(query.role.as_deref())?,
            status: parse_optional(query.status.as_deref())?,
            source: optional(query.source.as_deref()),
        };
        let page = PageRequest {
            page: query.page.unwrap_or(1).max(1),
            page_size: query
                .page_size
                .unwrap_or(self.settings.default_page_size)
                .clamp(1, self.settings.max_page_size),
        };

        let (items, total) = self.store.list_users(&filter, &page).await?;
        Ok(Page {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    /// Admin path of profile editing
    ///
    /// Blocking requires a remark. Leaving the blocked state without a new
    /// remark clears the old one.
    pub async fn admin_update_user(
        &self,
        actor: &Identity,
        target_id: i64,
        req: AdminUpdateUserRequest,
    ) -> Result<User> {
        require_role(actor, ADMIN_ROLES)?;
        let target = self.load_user(target_id).await?;
        ensure_can_manage(actor, target.role)?;

        let role: Option<Role> = parse_optional(req.role.as_deref())?;
        if let Some(role) = role {
            ensure_can_manage(actor, role)?;
        }
        let status: Option<Status> = parse_optional(req.status.as_deref())?;

        let username = match req.username.as_deref() {
            Some(raw) => Some(check_username(raw)?).filter(|u| *u != target.username),
            None => None,
        };
        let email = match req.email.as_deref() {
            Some(raw) => Some(check_email(raw)?).filter(|e| *e != target.email),
            None => None,
        };

        let remark = optional(req.disabled_remark.as_deref());
        let disabled_remark = match (status, remark) {
            (_, Some(remark)) => Some(Some(remark)),
            (Some(Status::Blocked), None) => {
                if target.status == Status::Blocked && target.disabled_remark.is_some() {
                    None
                } else {
                    return Err(blocked_needs_remark());
                }
            }
            (Some(_), None) if target.status == Status::Blocked => Some(None),
            _ => None,
        };

        let changes = UserChanges {
            username,
            email,
            password_hash: self.new_password_hash(req.password.as_deref())?,
            nickname: optional_bounded("nickname", req.nickname.as_deref(), MAX_NICKNAME_LENGTH)?,
            avatar: optional(req.avatar.as_deref()),
            role,
            status,
            disabled_remark,
        };
        if changes.is_empty() {
            return Err(nothing_to_update());
        }

        if changes.username.is_some() || changes.email.is_some() {
            let username = changes.username.as_deref().unwrap_or(&target.username);
            let email = changes.email.as_deref().unwrap_or(&target.email);
            self.ensure_unique(username, email, Some(target_id)).await?;
        }

        let user = self.store.update_user(target_id, changes).await?;
        info!(
            user_id = target_id,
            actor_id = actor.id,
            status = user.status.as_str(),
            "User updated by admin"
        );
        Ok(user)
    }

    /// Remove a user with all sessions and audit entries
    pub async fn delete_user(&self, actor: &Identity, target_id: i64) -> Result<()> {
        require_role(actor, ADMIN_ROLES)?;
        ensure_not_self(actor, target_id)?;
        let target = self.load_user(target_id).await?;
        ensure_can_manage(actor, target.role)?;

        if !self.store.delete_user_cascade(target_id).await? {
            return Err(UserCenterError::user_not_found());
        }
        info!(user_id = target_id, actor_id = actor.id, "User deleted");
        Ok(())
    }

    pub async fn login_history(
        &self,
        actor: &Identity,
        user_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<LoginAuditEntry>> {
        require_role(actor, ADMIN_ROLES)?;
        self.load_user(user_id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.store.list_login_audit(user_id, limit).await
    }

    async fn load_user(&self, user_id: i64) -> Result<User> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(UserCenterError::user_not_found)
    }

    /// Validate and hash a password supplied through a profile edit
    fn new_password_hash(&self, password: Option<&str>) -> Result<Option<String>> {
        match password {
            Some(password) if !password.is_empty() => {
                check_password(password, self.settings.password_min_length)?;
                Ok(Some(hash_password(password)?))
            }
            _ => Ok(None),
        }
    }
}

fn parse_or<T>(raw: Option<&str>, default: T) -> Result<T>
where
    T: std::str::FromStr<Err = UserCenterError>,
{
    Ok(parse_optional(raw)?.unwrap_or(default))
}

fn parse_optional<T>(raw: Option<&str>) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = UserCenterError>,
{
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => raw.parse().map(Some),
        None => Ok(None),
    }
}

fn blocked_needs_remark() -> UserCenterError {
    UserCenterError::Validation("a disabled remark is required when blocking a user".to_string())
}

fn nothing_to_update() -> UserCenterError {
    UserCenterError::Validation("no fields to update".to_string())
}
