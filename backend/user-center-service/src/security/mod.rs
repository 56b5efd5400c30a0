/// Security module for authentication and authorization
///
/// - **password**: Argon2id password hashing
/// - **session**: bearer token issuance, two-stage validation and revocation
///   (token codec from `crypto-core::jwt`)
/// - **authorization**: role gate and account-management rules
pub mod authorization;
pub mod password;
pub mod session;

pub use authorization::{authorize, ensure_can_manage, ensure_not_self, require_role, ADMIN_ROLES};
pub use password::{hash_password, verify_password};
pub use session::{IssuedSession, SessionAuthority};
