// Integration tests for the HTTP surface
//
// Drives the axum router in-process with `tower::ServiceExt::oneshot`:
// - Response envelope and transport status coupling
// - Bearer header handling (missing vs malformed)
// - Role gate on admin routes
//
//   cargo test -p user-center-service --test http_api_test

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::context;
use serde_json::{json, Value};
use tower::ServiceExt;
use user_center_service::{
    config::BootstrapSettings,
    db::CredentialStore,
    http::{build_router, AppState},
};

fn app() -> (Router, common::TestContext) {
    let ctx = context();
    let router = build_router(AppState::new(ctx.accounts.clone()));
    (router, ctx)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn register_and_login(app: &Router, username: &str, password: &str) -> String {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/users/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{}@x.com", username),
            "password": password,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(
        app,
        Method::POST,
        "/api/users/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    body["data"]["token"]
        .as_str()
        .expect("login returns a token")
        .to_string()
}

#[tokio::test]
async fn test_health() {
    let (app, _ctx) = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);
}

#[tokio::test]
async fn test_bob_end_to_end_over_http() {
    let (app, _ctx) = app();
    let token = register_and_login(&app, "bob", "secret1").await;

    let (status, body) = send(&app, Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);
    assert_eq!(body["data"]["username"], "bob");
    assert!(body["data"].get("password_hash").is_none());

    let (status, _) = send(&app, Method::POST, "/api/users/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);
}

#[tokio::test]
async fn test_failed_login_is_transport_ok() {
    let (app, _ctx) = app();
    register_and_login(&app, "alice", "secret1").await;

    let (status, wrong) = send(
        &app,
        Method::POST,
        "/api/users/login",
        None,
        Some(json!({ "username": "alice", "password": "wrongpass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wrong["code"], 401);
    assert!(wrong.get("data").is_none());

    let (_, unknown) = send(
        &app,
        Method::POST,
        "/api/users/login",
        None,
        Some(json!({ "username": "nonexistent", "password": "x" })),
    )
    .await;
    assert_eq!(wrong, unknown);

    let (status, missing) = send(
        &app,
        Method::POST,
        "/api/users/login",
        None,
        Some(json!({ "username": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(missing["code"], 400);
}

#[tokio::test]
async fn test_missing_and_malformed_credentials() {
    let (app, _ctx) = app();

    let (status, missing) = send(&app, Method::GET, "/api/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing["message"], "no credential supplied");

    let request = Request::builder()
        .uri("/api/users/me")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let malformed: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(malformed["message"], "invalid credential format");

    let (status, forged) = send(&app, Method::GET, "/api/users/me", Some("a.b.c"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_ne!(forged["message"], missing["message"]);
}

#[tokio::test]
async fn test_session_failures_share_message() {
    let (app, _ctx) = app();
    let token = register_and_login(&app, "alice", "secret1").await;

    let (_, forged) = send(&app, Method::GET, "/api/users/me", Some("a.b.c"), None).await;
    send(&app, Method::POST, "/api/users/logout", Some(&token), None).await;
    let (_, revoked) = send(&app, Method::GET, "/api/users/me", Some(&token), None).await;

    assert_eq!(forged["code"], 401);
    assert_eq!(forged, revoked);
}

#[tokio::test]
async fn test_admin_routes_gated_by_role() {
    let (app, ctx) = app();
    let token = register_and_login(&app, "alice", "secret1").await;

    let (status, body) = send(&app, Method::GET, "/api/admin/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);

    ctx.accounts
        .ensure_bootstrap_superadmin(&BootstrapSettings {
            username: "root".into(),
            email: "root@example.com".into(),
            password: "rootpass1".into(),
        })
        .await
        .unwrap();
    let (_, login) = send(
        &app,
        Method::POST,
        "/api/users/login",
        None,
        Some(json!({ "username": "root", "password": "rootpass1" })),
    )
    .await;
    let root_token = login["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/admin/users?page=1&page_size=5&role=user",
        Some(&root_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["username"], "alice");

    let alice_id = body["data"]["items"][0]["id"].as_i64().unwrap();
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/admin/users/{}", alice_id),
        Some(&root_token),
        Some(json!({ "status": "blocked" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/admin/users/{}", alice_id),
        Some(&root_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/admin/users/{}", alice_id),
        Some(&root_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/admin/users/not-a-number",
        Some(&root_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_product_routes() {
    let (app, _ctx) = app();
    let token = register_and_login(&app, "alice", "secret1").await;
    let product = json!({ "product_id": "crm", "name": "CRM" });

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users/me/products",
        Some(&token),
        Some(product.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["product_id"], "crm");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users/me/products",
        Some(&token),
        Some(product),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/users/me/products/unknown",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // undecodable path segment still answers with the envelope
    let (status, body) = send(
        &app,
        Method::DELETE,
        "/api/users/me/products/%FF",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_overlong_nickname_is_bad_request() {
    let (app, _ctx) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users/register",
        None,
        Some(json!({
            "username": "alice",
            "email": "alice@x.com",
            "password": "secret1",
            "nickname": "n".repeat(65),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

async fn audited_ip(trust_forwarded_for: bool) -> Option<String> {
    let ctx = context();
    let app = build_router(
        AppState::new(ctx.accounts.clone()).with_trusted_proxy(trust_forwarded_for),
    );
    register_and_login(&app, "alice", "secret1").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/users/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "198.51.100.9, 10.0.0.1")
        .body(Body::from(
            json!({ "username": "alice", "password": "secret1" }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let login: Value = serde_json::from_slice(&bytes).unwrap();
    let user_id = login["data"]["user"]["id"].as_i64().unwrap();

    let entries = ctx.store.list_login_audit(user_id, 10).await.unwrap();
    let latest = entries.first().expect("login was audited");
    latest.ip_address.clone()
}

#[tokio::test]
async fn test_forwarded_for_recorded_only_when_trusted() {
    assert_eq!(audited_ip(false).await, None);
    assert_eq!(audited_ip(true).await.as_deref(), Some("198.51.100.9"));
}

#[tokio::test]
async fn test_change_password_over_http() {
    let (app, _ctx) = app();
    let token = register_and_login(&app, "alice", "secret1").await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/users/me/password",
        Some(&token),
        Some(json!({ "old_password": "secret1", "new_password": "secret2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
