//! Shared cryptographic primitives for backend services.
//!
//! - `jwt`: signed, tamper-evident bearer tokens (HS256 or RS256)
pub mod jwt;

pub use jwt::{Claims, JwtError, JwtKeys};
