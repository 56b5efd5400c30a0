/// HTTP API for account and session operations
///
/// Every response uses the `{ code, message, data? }` envelope. Protected
/// routes take a `Bearer` token resolved by the [`CurrentUser`] extractor;
/// admin routes additionally require the admin or superadmin role, checked
/// by the account service.
mod auth;
mod handlers;
mod response;

pub use auth::{client_address, parse_bearer, Client, CurrentUser};
pub use response::{login_failure, ApiResponse};

use crate::services::AccountService;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared HTTP server state
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    /// Whether `X-Forwarded-For` names the client; otherwise the socket peer does
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(accounts: Arc<AccountService>) -> Self {
        Self {
            accounts,
            trust_forwarded_for: false,
        }
    }

    pub fn with_trusted_proxy(mut self, trusted: bool) -> Self {
        self.trust_forwarded_for = trusted;
        self
    }
}

/// Build the HTTP router with all endpoints
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/users/register", post(handlers::register))
        .route("/api/users/login", post(handlers::login))
        .route("/api/users/logout", post(handlers::logout))
        .route("/api/users/logout-all", post(handlers::logout_all))
        .route(
            "/api/users/me",
            get(handlers::current_user).put(handlers::update_profile),
        )
        .route("/api/users/me/password", put(handlers::change_password))
        .route("/api/users/me/sessions", get(handlers::list_sessions))
        .route("/api/users/me/products", post(handlers::add_product))
        .route(
            "/api/users/me/products/:product_id",
            delete(handlers::remove_product),
        )
        .route(
            "/api/admin/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/api/admin/users/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route(
            "/api/admin/users/:id/login-history",
            get(handlers::login_history),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests
pub async fn start_http_server<F>(state: AppState, addr: &str, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Starting HTTP API server on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
