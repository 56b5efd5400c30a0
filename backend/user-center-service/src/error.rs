use crypto_core::JwtError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UserCenterError>;

/// Unique column that a write collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::Username => f.write_str("Username"),
            UniqueField::Email => f.write_str("Email"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserCenterError {
    #[error("{0}")]
    Validation(String),

    #[error("{field} already exists")]
    DuplicateKey { field: UniqueField },

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Session revoked")]
    SessionRevoked,

    #[error("User inactive")]
    UserInactive,

    #[error("no credential supplied")]
    MissingCredential,

    #[error("invalid credential format")]
    MalformedCredential,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Product association already exists")]
    DuplicateAssociation,

    #[error("Product association not found")]
    AssociationNotFound,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Corrupt password digest")]
    CorruptDigest,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

const INTERNAL_MESSAGE: &str = "Internal server error";
const UNAUTHENTICATED_MESSAGE: &str = "Invalid or expired credential";

impl UserCenterError {
    pub fn user_not_found() -> Self {
        UserCenterError::NotFound("User".to_string())
    }

    /// Envelope `code` for this failure
    pub fn code(&self) -> u16 {
        match self {
            UserCenterError::Validation(_) => 400,
            UserCenterError::InvalidCredentials
            | UserCenterError::InvalidToken
            | UserCenterError::ExpiredToken
            | UserCenterError::SessionRevoked
            | UserCenterError::UserInactive
            | UserCenterError::MissingCredential
            | UserCenterError::MalformedCredential => 401,
            UserCenterError::AccountDisabled | UserCenterError::Forbidden(_) => 403,
            UserCenterError::NotFound(_) | UserCenterError::AssociationNotFound => 404,
            UserCenterError::DuplicateKey { .. } | UserCenterError::DuplicateAssociation => 409,
            UserCenterError::CorruptDigest
            | UserCenterError::Database(_)
            | UserCenterError::Internal(_) => 500,
        }
    }

    /// Failures whose detail must stay server-side
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            UserCenterError::CorruptDigest
                | UserCenterError::Database(_)
                | UserCenterError::Internal(_)
        )
    }

    /// Message safe to return to the caller
    ///
    /// The session stages collapse into one message so callers cannot tell
    /// which check rejected the token.
    pub fn public_message(&self) -> String {
        match self {
            UserCenterError::InvalidToken
            | UserCenterError::ExpiredToken
            | UserCenterError::SessionRevoked
            | UserCenterError::UserInactive => UNAUTHENTICATED_MESSAGE.to_string(),
            err if err.is_internal() => INTERNAL_MESSAGE.to_string(),
            err => err.to_string(),
        }
    }
}

// Conversions from external error types
impl From<sqlx::Error> for UserCenterError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                match db_err.constraint() {
                    Some("users_username_key") => {
                        return UserCenterError::DuplicateKey {
                            field: UniqueField::Username,
                        }
                    }
                    Some("users_email_key") => {
                        return UserCenterError::DuplicateKey {
                            field: UniqueField::Email,
                        }
                    }
                    Some("user_products_pkey") => return UserCenterError::DuplicateAssociation,
                    _ => {}
                }
            }
        }

        tracing::error!("Database error: {}", err);
        UserCenterError::Database(err.to_string())
    }
}

impl From<JwtError> for UserCenterError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => UserCenterError::ExpiredToken,
            JwtError::Invalid(_) => UserCenterError::InvalidToken,
            JwtError::Key(msg) | JwtError::Signing(msg) => {
                tracing::error!("JWT error: {}", msg);
                UserCenterError::Internal(msg)
            }
        }
    }
}
