/// Password hashing and verification using Argon2id
use crate::error::{Result, UserCenterError};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password using Argon2id algorithm
///
/// ## Security
///
/// - Algorithm: Argon2id (default configuration)
/// - Salt: Random 16-byte salt generated per password
///
/// Length rules belong to the caller; this only produces the PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| UserCenterError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against its stored digest
///
/// Returns `Ok(false)` on mismatch. A digest that cannot be parsed is a
/// data problem, reported as [`UserCenterError::CorruptDigest`].
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash).map_err(|e| {
        tracing::error!("Stored password digest is unparseable: {}", e);
        UserCenterError::CorruptDigest
    })?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(UserCenterError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_valid_password() {
        let hash = hash_password("hunter22").expect("should hash password successfully");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash).expect("should verify successfully"));
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hash_password("hunter22").expect("should hash password successfully");
        assert!(!verify_password("hunter23", &hash).expect("verification should succeed"));
    }

    #[test]
    fn test_corrupt_digest() {
        let result = verify_password("hunter22", "not-a-phc-string");
        assert_eq!(result, Err(UserCenterError::CorruptDigest));
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hash1 = hash_password("hunter22").expect("should hash successfully");
        let hash2 = hash_password("hunter22").expect("should hash successfully");
        // Different salts should produce different hashes
        assert_ne!(hash1, hash2);
    }
}
