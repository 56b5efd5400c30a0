// Shared fixtures for the integration tests: an account service over the
// in-memory store with HS256 keys.
#![allow(dead_code)]

use crypto_core::JwtKeys;
use std::sync::Arc;
use user_center_service::{
    config::AccountSettings,
    db::{CredentialStore, MemoryCredentialStore},
    models::{requests::RegisterRequest, ClientInfo, Identity},
    security::SessionAuthority,
    AccountService,
};

pub const TEST_SECRET: &[u8] = b"integration-test-secret-please-rotate";

pub struct TestContext {
    pub store: Arc<MemoryCredentialStore>,
    pub accounts: Arc<AccountService>,
}

pub fn context() -> TestContext {
    let store = Arc::new(MemoryCredentialStore::new());
    let dyn_store: Arc<dyn CredentialStore> = store.clone();
    let keys = JwtKeys::from_secret(TEST_SECRET, "user-center", 3600).expect("test keys");
    let accounts = Arc::new(AccountService::new(
        Arc::clone(&dyn_store),
        SessionAuthority::new(dyn_store, keys),
        AccountSettings::default(),
    ));
    TestContext { store, accounts }
}

pub fn register_request(username: &str, email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        nickname: None,
        source: None,
    }
}

pub fn client() -> ClientInfo {
    ClientInfo {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("integration-test".to_string()),
        device_id: None,
    }
}

pub fn identity_of(user: &user_center_service::models::User) -> Identity {
    Identity::from(user)
}
