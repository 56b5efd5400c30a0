/// Shared JWT module for bearer-token issuance and verification
///
/// Tokens are signed with either an RSA key pair (RS256, production) or a
/// shared secret (HS256, development). The algorithm is pinned per key set, so
/// a token signed with any other algorithm is rejected on decode.
///
/// ## Usage
///
/// ```rust
/// use crypto_core::jwt::JwtKeys;
///
/// let keys = JwtKeys::from_secret(b"a-development-secret", "user-center", 3600).unwrap();
/// let (token, claims) = keys.issue("42", "alice", "user").unwrap();
/// let decoded = keys.decode(&token).unwrap();
/// assert_eq!(decoded.jti, claims.jti);
/// ```
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Data Structures
// ============================================================================

/// JWT Claims structure - registered claims plus identity fields
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Username at issue time
    pub username: String,
    /// Role at issue time
    pub role: String,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token ID
    pub jti: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JwtError {
    #[error("token expired")]
    Expired,

    #[error("token validation failed: {0}")]
    Invalid(String),

    #[error("invalid key material: {0}")]
    Key(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

// ============================================================================
// Key Storage
// ============================================================================

/// Signing and verification keys with the token policy bound to them
#[derive(Clone)]
pub struct JwtKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
    ttl: Duration,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("ttl_seconds", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    /// Build HS256 keys from a shared secret
    ///
    /// Development only; production deployments should provide an RSA pair.
    pub fn from_secret(
        secret: &[u8],
        issuer: impl Into<String>,
        ttl_seconds: i64,
    ) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::Key("HS256 secret must not be empty".to_string()));
        }

        Self::build(
            EncodingKey::from_secret(secret),
            DecodingKey::from_secret(secret),
            Algorithm::HS256,
            issuer.into(),
            ttl_seconds,
        )
    }

    /// Build RS256 keys from PEM-formatted RSA private and public keys
    pub fn from_rsa_pem(
        private_key_pem: &str,
        public_key_pem: &str,
        issuer: impl Into<String>,
        ttl_seconds: i64,
    ) -> Result<Self, JwtError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("Failed to parse RSA private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("Failed to parse RSA public key: {e}")))?;

        Self::build(
            encoding_key,
            decoding_key,
            Algorithm::RS256,
            issuer.into(),
            ttl_seconds,
        )
    }

    fn build(
        encoding_key: EncodingKey,
        decoding_key: DecodingKey,
        algorithm: Algorithm,
        issuer: String,
        ttl_seconds: i64,
    ) -> Result<Self, JwtError> {
        if ttl_seconds <= 0 {
            return Err(JwtError::Key(format!(
                "token lifetime must be positive, got {ttl_seconds}s"
            )));
        }

        let ttl = Duration::try_seconds(ttl_seconds)
            .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
            .ok_or_else(|| {
                JwtError::Key(format!("token lifetime out of range, got {ttl_seconds}s"))
            })?;

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm,
            issuer,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    // ========================================================================
    // Token Generation
    // ========================================================================

    /// Mint a token for `subject` valid for the configured lifetime
    ///
    /// Every token carries a fresh `jti`, so two tokens issued in the same
    /// second for the same user are still distinct strings.
    pub fn issue(
        &self,
        subject: &str,
        username: &str,
        role: &str,
    ) -> Result<(String, Claims), JwtError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| JwtError::Signing("token expiry out of range".to_string()))?;
        let claims = Claims {
            sub: subject.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = self.encode(&claims)?;
        Ok((token, claims))
    }

    /// Sign arbitrary claims with these keys
    pub fn encode(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    // ========================================================================
    // Token Validation
    // ========================================================================

    /// Verify signature, issuer and expiry, then return the claims
    ///
    /// No leeway is applied to `exp`.
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e.to_string()),
            })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::from_secret(b"unit-test-secret", "user-center-test", 3600).unwrap()
    }

    #[test]
    fn test_issue_and_decode() {
        let keys = keys();
        let (token, claims) = keys.issue("7", "alice", "admin").unwrap();

        assert_eq!(token.matches('.').count(), 2);
        let decoded = keys.decode(&token).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.sub, "7");
        assert_eq!(decoded.role, "admin");
        assert_eq!(decoded.exp - decoded.iat, 3600);
    }

    #[test]
    fn test_tokens_are_unique() {
        let keys = keys();
        let (first, _) = keys.issue("7", "alice", "user").unwrap();
        let (second, _) = keys.issue("7", "alice", "user").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_expired_token() {
        let keys = keys();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "7".to_string(),
            username: "alice".to_string(),
            role: "user".to_string(),
            iss: "user-center-test".to_string(),
            iat: now - 120,
            exp: now - 60,
            jti: Uuid::new_v4().to_string(),
        };
        let token = keys.encode(&claims).unwrap();

        assert_eq!(keys.decode(&token), Err(JwtError::Expired));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (token, _) = keys().issue("7", "alice", "user").unwrap();
        let other = JwtKeys::from_secret(b"another-secret", "user-center-test", 3600).unwrap();

        assert!(matches!(other.decode(&token), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let (token, _) = keys().issue("7", "alice", "user").unwrap();
        let other = JwtKeys::from_secret(b"unit-test-secret", "someone-else", 3600).unwrap();

        assert!(matches!(other.decode(&token), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            keys().decode("invalid.token.here"),
            Err(JwtError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_empty_secret_and_bad_ttl() {
        assert!(JwtKeys::from_secret(b"", "iss", 60).is_err());
        assert!(JwtKeys::from_secret(b"secret", "iss", 0).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_ttl() {
        for ttl in [1_000_000_000_000_000, i64::MAX] {
            assert!(matches!(
                JwtKeys::from_secret(b"secret", "iss", ttl),
                Err(JwtError::Key(_))
            ));
        }

        // a century still fits and issues normally
        let keys = JwtKeys::from_secret(b"secret", "iss", 100 * 365 * 24 * 3600).unwrap();
        let (_, claims) = keys.issue("1", "bob", "user").unwrap();
        assert!(claims.exp > claims.iat);
    }
}
