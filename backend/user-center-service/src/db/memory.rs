//! In-process credential store
//!
//! All state sits behind one `RwLock`. Mutations build their result first and
//! commit it only once every check has passed, so a failure leaves the state
//! untouched.
use super::CredentialStore;
use crate::error::{Result, UniqueField, UserCenterError};
use crate::models::{
    LoginAuditEntry, NewLoginAudit, NewSession, NewUser, PageRequest, ProductAssociation, Session,
    User, UserChanges, UserFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    sessions: Vec<Session>,
    audit: Vec<LoginAuditEntry>,
    last_user_id: i64,
    last_session_id: i64,
    last_audit_id: i64,
}

impl MemoryState {
    fn conflict(&self, username: &str, email: &str, exclude_id: Option<i64>) -> Option<UniqueField> {
        let others = || self.users.values().filter(move |u| Some(u.id) != exclude_id);
        if others().any(|u| u.username == username) {
            Some(UniqueField::Username)
        } else if others().any(|u| u.email == email) {
            Some(UniqueField::Email)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: RwLock<MemoryState>,
    #[cfg(test)]
    fail_before_commit: std::sync::atomic::AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored sessions for a user, expired ones included
    pub async fn session_count(&self, user_id: i64) -> usize {
        let state = self.state.read().await;
        state.sessions.iter().filter(|s| s.user_id == user_id).count()
    }

    pub async fn audit_count(&self, user_id: i64) -> usize {
        let state = self.state.read().await;
        state
            .audit
            .iter()
            .filter(|a| a.user_id == Some(user_id))
            .count()
    }

    #[cfg(test)]
    fn inject_commit_failure(&self) {
        self.fail_before_commit
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_commit(&self) -> Result<()> {
        if self
            .fail_before_commit
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(UserCenterError::Database("injected commit failure".to_string()));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_commit(&self) -> Result<()> {
        Ok(())
    }
}

fn contains(haystack: &str, needle: &Option<String>) -> bool {
    needle.as_deref().map_or(true, |n| haystack.contains(n))
}

fn matches_filter(user: &User, filter: &UserFilter) -> bool {
    contains(&user.username, &filter.username)
        && contains(&user.email, &filter.email)
        && filter.role.map_or(true, |r| user.role == r)
        && filter.status.map_or(true, |s| user.status == s)
        && filter
            .source
            .as_deref()
            .map_or(true, |s| user.source.as_deref() == Some(s))
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
        exclude_id: Option<i64>,
    ) -> Result<Option<User>> {
        let state = self.state.read().await;
        let candidates = || {
            state
                .users
                .values()
                .filter(move |u| Some(u.id) != exclude_id)
        };
        let found = candidates()
            .find(|u| u.username == username)
            .or_else(|| candidates().find(|u| u.email == email));
        Ok(found.cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut state = self.state.write().await;
        if let Some(field) = state.conflict(&user.username, &user.email, None) {
            return Err(UserCenterError::DuplicateKey { field });
        }

        let now = Utc::now();
        state.last_user_id += 1;
        let record = User {
            id: state.last_user_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            nickname: user.nickname,
            avatar: user.avatar,
            role: user.role,
            status: user.status,
            disabled_remark: user.disabled_remark,
            source: user.source,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            products: Vec::new(),
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<User> {
        let mut state = self.state.write().await;
        let mut user = state
            .users
            .get(&id)
            .cloned()
            .ok_or_else(UserCenterError::user_not_found)?;

        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(field) = state.conflict(&user.username, &user.email, Some(id)) {
            return Err(UserCenterError::DuplicateKey { field });
        }

        let revoke_sessions = changes.password_hash.is_some();
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(nickname) = changes.nickname {
            user.nickname = nickname;
        }
        if let Some(avatar) = changes.avatar {
            user.avatar = Some(avatar);
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(status) = changes.status {
            user.status = status;
        }
        if let Some(remark) = changes.disabled_remark {
            user.disabled_remark = remark;
        }
        user.updated_at = Utc::now();

        self.check_commit()?;
        if revoke_sessions {
            state.sessions.retain(|s| s.user_id != id);
        }
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn delete_user_cascade(&self, id: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&id) {
            return Ok(false);
        }

        let sessions: Vec<Session> = state
            .sessions
            .iter()
            .filter(|s| s.user_id != id)
            .cloned()
            .collect();
        let audit: Vec<LoginAuditEntry> = state
            .audit
            .iter()
            .filter(|a| a.user_id != Some(id))
            .cloned()
            .collect();

        self.check_commit()?;
        state.sessions = sessions;
        state.audit = audit;
        state.users.remove(&id);
        debug!(user_id = id, "Deleted user from memory store");
        Ok(true)
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<(Vec<User>, i64)> {
        let state = self.state.read().await;
        let matching: Vec<&User> = state
            .users
            .values()
            .filter(|u| matches_filter(u, filter))
            .collect();
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn add_product(&self, user_id: i64, product: ProductAssociation) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(UserCenterError::user_not_found)?;
        if user.has_product(&product.product_id) {
            return Err(UserCenterError::DuplicateAssociation);
        }
        user.products.push(product);
        Ok(())
    }

    async fn remove_product(&self, user_id: i64, product_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(UserCenterError::user_not_found)?;
        let before = user.products.len();
        user.products.retain(|p| p.product_id != product_id);
        if user.products.len() == before {
            return Err(UserCenterError::AssociationNotFound);
        }
        Ok(())
    }

    async fn create_session(&self, session: NewSession) -> Result<Session> {
        let mut state = self.state.write().await;
        if state.sessions.iter().any(|s| s.token == session.token) {
            return Err(UserCenterError::Internal(
                "session token collision".to_string(),
            ));
        }
        state.last_session_id += 1;
        let record = Session {
            id: state.last_session_id,
            user_id: session.user_id,
            token: session.token,
            expires_at: session.expires_at,
            ip_address: session.client.ip_address,
            user_agent: session.client.user_agent,
            device_id: session.client.device_id,
            created_at: Utc::now(),
        };
        state.sessions.push(record.clone());
        Ok(record)
    }

    async fn find_valid_session(&self, token: &str) -> Result<Option<Session>> {
        let now = Utc::now();
        let state = self.state.read().await;
        Ok(state
            .sessions
            .iter()
            .find(|s| s.token == token && !s.is_expired_at(now))
            .cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|s| s.token != token);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn delete_all_sessions(&self, user_id: i64) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|s| s.user_id != user_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn list_sessions(&self, user_id: i64) -> Result<Vec<Session>> {
        let now = Utc::now();
        let state = self.state.read().await;
        // ids grow with insertion, so reversing gives newest first
        Ok(state
            .sessions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id && !s.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn append_login_audit(&self, entry: NewLoginAudit) -> Result<()> {
        let mut state = self.state.write().await;
        state.last_audit_id += 1;
        let record = LoginAuditEntry {
            id: state.last_audit_id,
            user_id: entry.user_id,
            username: entry.username,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            success: entry.success,
            message: entry.message,
            created_at: Utc::now(),
        };
        state.audit.push(record);
        Ok(())
    }

    async fn list_login_audit(&self, user_id: i64, limit: i64) -> Result<Vec<LoginAuditEntry>> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|a| a.user_id == Some(user_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn close(&self) {
        debug!("Memory credential store closed");
    }
}
