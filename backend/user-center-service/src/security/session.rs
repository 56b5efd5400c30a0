/// Bearer token issuance and validation
///
/// Validation runs in three stages:
///
/// 1. Signature and claim check, no I/O (`InvalidToken` / `ExpiredToken`)
/// 2. Session row lookup, so logout takes effect (`SessionRevoked`)
/// 3. Owning user re-read, so deactivation takes effect (`UserInactive`)
use crate::db::CredentialStore;
use crate::error::{Result, UserCenterError};
use crate::models::{ClientInfo, Identity, NewSession, Session, User};
use chrono::{DateTime, Utc};
use crypto_core::JwtKeys;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: Session,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionAuthority {
    store: Arc<dyn CredentialStore>,
    keys: JwtKeys,
}

impl SessionAuthority {
    pub fn new(store: Arc<dyn CredentialStore>, keys: JwtKeys) -> Self {
        Self { store, keys }
    }

    /// Sign a token for `user` and persist the matching session row
    ///
    /// The row expiry is taken from the token's `exp` claim so both agree.
    pub async fn issue(&self, user: &User, client: &ClientInfo) -> Result<IssuedSession> {
        let (token, claims) =
            self.keys
                .issue(&user.id.to_string(), &user.username, user.role.as_str())?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or_else(|| {
            UserCenterError::Internal(format!("token expiry out of range: {}", claims.exp))
        })?;

        let session = self
            .store
            .create_session(NewSession {
                user_id: user.id,
                token: token.clone(),
                expires_at,
                client: client.clone(),
            })
            .await?;

        debug!(user_id = user.id, session_id = session.id, "Session issued");
        Ok(IssuedSession {
            token,
            session,
            expires_at,
        })
    }

    pub async fn validate(&self, token: &str) -> Result<Identity> {
        let claims = self.keys.decode(token)?;
        let subject: i64 = claims
            .sub
            .parse()
            .map_err(|_| UserCenterError::InvalidToken)?;

        let session = self
            .store
            .find_valid_session(token)
            .await?
            .ok_or(UserCenterError::SessionRevoked)?;
        if session.user_id != subject {
            return Err(UserCenterError::InvalidToken);
        }

        let user = self
            .store
            .find_user_by_id(session.user_id)
            .await?
            .filter(User::is_active)
            .ok_or(UserCenterError::UserInactive)?;

        Ok(Identity::from(&user))
    }

    /// Drop one session (`token` given) or all of the user's sessions
    ///
    /// Revoking something already gone is not an error.
    pub async fn revoke(&self, user_id: i64, token: Option<&str>) -> Result<u64> {
        let revoked = match token {
            Some(token) => self.store.delete_session(token).await?,
            None => self.store.delete_all_sessions(user_id).await?,
        };
        info!(user_id, revoked, all = token.is_none(), "Sessions revoked");
        Ok(revoked)
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        self.keys.ttl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryCredentialStore;
    use crate::models::{NewUser, Role, Status, UserChanges};
    use crypto_core::Claims;

    const SECRET: &[u8] = b"session-authority-test-secret-0123456789";

    async fn setup() -> (Arc<MemoryCredentialStore>, SessionAuthority, User) {
        let store = Arc::new(MemoryCredentialStore::new());
        let keys = JwtKeys::from_secret(SECRET, "user-center", 3600).unwrap();
        let authority = SessionAuthority::new(store.clone(), keys);
        let user = store
            .create_user(NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: "$argon2id$placeholder".into(),
                nickname: "alice".into(),
                avatar: None,
                role: Role::Admin,
                status: Status::Active,
                disabled_remark: None,
                source: None,
            })
            .await
            .unwrap();
        (store, authority, user)
    }

    #[tokio::test]
    async fn test_issue_then_validate() {
        let (_store, authority, user) = setup().await;
        let issued = authority.issue(&user, &ClientInfo::default()).await.unwrap();

        assert_eq!(issued.session.expires_at, issued.expires_at);
        let identity = authority.validate(&issued.token).await.unwrap();
        assert_eq!(identity.id, user.id);
        assert_eq!(identity.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let (_store, authority, user) = setup().await;
        let issued = authority.issue(&user, &ClientInfo::default()).await.unwrap();

        let mut tampered = issued.token.clone();
        tampered.push('x');
        assert_eq!(
            authority.validate(&tampered).await,
            Err(UserCenterError::InvalidToken)
        );
        assert_eq!(
            authority.validate("not.a.jwt").await,
            Err(UserCenterError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn test_expired_claims_rejected() {
        let (_store, authority, user) = setup().await;
        let keys = JwtKeys::from_secret(SECRET, "user-center", 3600).unwrap();
        let now = Utc::now().timestamp();
        let token = keys
            .encode(&Claims {
                sub: user.id.to_string(),
                username: user.username.clone(),
                role: "admin".into(),
                iss: "user-center".into(),
                iat: now - 120,
                exp: now - 60,
                jti: "expired".into(),
            })
            .unwrap();

        assert_eq!(
            authority.validate(&token).await,
            Err(UserCenterError::ExpiredToken)
        );
    }

    #[tokio::test]
    async fn test_revoke_single_and_all() {
        let (_store, authority, user) = setup().await;
        let first = authority.issue(&user, &ClientInfo::default()).await.unwrap();
        let second = authority.issue(&user, &ClientInfo::default()).await.unwrap();
        let third = authority.issue(&user, &ClientInfo::default()).await.unwrap();
        assert_ne!(first.token, second.token);

        assert_eq!(authority.revoke(user.id, Some(&first.token)).await.unwrap(), 1);
        assert_eq!(
            authority.validate(&first.token).await,
            Err(UserCenterError::SessionRevoked)
        );
        assert!(authority.validate(&second.token).await.is_ok());

        // idempotent
        assert_eq!(authority.revoke(user.id, Some(&first.token)).await.unwrap(), 0);

        assert_eq!(authority.revoke(user.id, None).await.unwrap(), 2);
        for token in [&second.token, &third.token] {
            assert_eq!(
                authority.validate(token).await,
                Err(UserCenterError::SessionRevoked)
            );
        }
    }

    #[tokio::test]
    async fn test_inactive_user_rejected() {
        let (store, authority, user) = setup().await;
        let issued = authority.issue(&user, &ClientInfo::default()).await.unwrap();

        store
            .update_user(
                user.id,
                UserChanges {
                    status: Some(Status::Inactive),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            authority.validate(&issued.token).await,
            Err(UserCenterError::UserInactive)
        );
    }
}
