/// User Center Service Library
///
/// Account registration, credential verification, revocable bearer sessions
/// and role-gated account administration.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Credential store trait with PostgreSQL and in-memory implementations
/// - `error`: Error types
/// - `http`: axum router and response envelope
/// - `models`: Data models and request payloads
/// - `security`: Password hashing, session authority, role gate
/// - `services`: Account business logic
/// - `validators`: Input validation
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod security;
pub mod services;
pub mod validators;

// Re-export commonly used types
pub use error::{Result, UserCenterError};
pub use services::AccountService;
