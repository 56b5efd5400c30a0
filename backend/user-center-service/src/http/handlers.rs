/// Route handlers: decode the request, call the account service, wrap the result
use super::auth::{Client, CurrentUser};
use super::response::{login_failure, ApiResponse};
use super::AppState;
use crate::error::{Result, UserCenterError};
use crate::models::{
    requests::{
        AddProductRequest, AdminCreateUserRequest, AdminUpdateUserRequest, ChangePasswordRequest,
        ListUsersQuery, LoginRequest, ProfileUpdateRequest, RegisterRequest,
    },
    Identity, LoginAuditEntry, Page, ProductAssociation, Session, User,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};

type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;
type PathParam<T> = std::result::Result<Path<T>, PathRejection>;
type QueryParams<T> = std::result::Result<Query<T>, QueryRejection>;

fn body<T>(payload: JsonBody<T>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| UserCenterError::Validation(e.body_text()))
}

fn user_id(path: PathParam<i64>) -> Result<i64> {
    path.map(|Path(id)| id)
        .map_err(|_| UserCenterError::Validation("user id must be an integer".to_string()))
}

fn product_id(path: PathParam<String>) -> Result<String> {
    path.map(|Path(id)| id)
        .map_err(|e| UserCenterError::Validation(e.body_text()))
}

fn query<T>(params: QueryParams<T>) -> Result<T> {
    params
        .map(|Query(value)| value)
        .map_err(|e| UserCenterError::Validation(e.body_text()))
}

pub async fn health_check() -> ApiResponse<()> {
    ApiResponse::message("OK")
}

// ============================================================================
// Public endpoints
// ============================================================================

pub async fn register(
    State(state): State<AppState>,
    payload: JsonBody<RegisterRequest>,
) -> Result<ApiResponse<User>> {
    let user = state.accounts.register(body(payload)?).await?;
    Ok(ApiResponse::created(user))
}

pub async fn login(
    State(state): State<AppState>,
    Client(client): Client,
    payload: JsonBody<LoginRequest>,
) -> Response {
    let req = match body(payload) {
        Ok(req) => req,
        Err(e) => return login_failure(e),
    };
    match state.accounts.login(req, client).await {
        Ok(outcome) => ApiResponse::ok(outcome).into_response(),
        Err(e) => login_failure(e),
    }
}

// ============================================================================
// Authenticated caller
// ============================================================================

pub async fn logout(
    State(state): State<AppState>,
    CurrentUser { identity, token }: CurrentUser,
) -> Result<ApiResponse<()>> {
    state.accounts.logout(&identity, &token).await?;
    Ok(ApiResponse::message("Logged out"))
}

pub async fn logout_all(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
) -> Result<ApiResponse<Value>> {
    let revoked = state.accounts.logout_all(&identity).await?;
    Ok(ApiResponse::with_code(
        200,
        "Logged out of all sessions",
        json!({ "revoked": revoked }),
    ))
}

pub async fn current_user(CurrentUser { identity, .. }: CurrentUser) -> ApiResponse<Identity> {
    ApiResponse::ok(identity)
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
    payload: JsonBody<ProfileUpdateRequest>,
) -> Result<ApiResponse<User>> {
    let user = state
        .accounts
        .update_own_profile(identity.id, body(payload)?)
        .await?;
    Ok(ApiResponse::ok(user))
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
    payload: JsonBody<ChangePasswordRequest>,
) -> Result<ApiResponse<()>> {
    state
        .accounts
        .change_password(identity.id, body(payload)?)
        .await?;
    Ok(ApiResponse::message(
        "Password changed, please log in again",
    ))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
) -> Result<ApiResponse<Vec<Session>>> {
    let sessions = state.accounts.list_own_sessions(&identity).await?;
    Ok(ApiResponse::ok(sessions))
}

pub async fn add_product(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
    payload: JsonBody<AddProductRequest>,
) -> Result<ApiResponse<Vec<ProductAssociation>>> {
    let products = state
        .accounts
        .add_product_association(identity.id, body(payload)?)
        .await?;
    Ok(ApiResponse::ok(products))
}

pub async fn remove_product(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
    path: PathParam<String>,
) -> Result<ApiResponse<Vec<ProductAssociation>>> {
    let products = state
        .accounts
        .remove_product_association(identity.id, &product_id(path)?)
        .await?;
    Ok(ApiResponse::ok(products))
}

// ============================================================================
// Administration
// ============================================================================

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
    params: QueryParams<ListUsersQuery>,
) -> Result<ApiResponse<Page<User>>> {
    let page = state.accounts.list_users(&identity, query(params)?).await?;
    Ok(ApiResponse::ok(page))
}

pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
    payload: JsonBody<AdminCreateUserRequest>,
) -> Result<ApiResponse<User>> {
    let user = state
        .accounts
        .admin_create_user(&identity, body(payload)?)
        .await?;
    Ok(ApiResponse::created(user))
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
    path: PathParam<i64>,
) -> Result<ApiResponse<User>> {
    let user = state.accounts.get_user(&identity, user_id(path)?).await?;
    Ok(ApiResponse::ok(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
    path: PathParam<i64>,
    payload: JsonBody<AdminUpdateUserRequest>,
) -> Result<ApiResponse<User>> {
    let user = state
        .accounts
        .admin_update_user(&identity, user_id(path)?, body(payload)?)
        .await?;
    Ok(ApiResponse::ok(user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
    path: PathParam<i64>,
) -> Result<ApiResponse<()>> {
    state.accounts.delete_user(&identity, user_id(path)?).await?;
    Ok(ApiResponse::message("User deleted"))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn login_history(
    State(state): State<AppState>,
    CurrentUser { identity, .. }: CurrentUser,
    path: PathParam<i64>,
    params: QueryParams<HistoryQuery>,
) -> Result<ApiResponse<Vec<LoginAuditEntry>>> {
    let entries = state
        .accounts
        .login_history(&identity, user_id(path)?, query(params)?.limit)
        .await?;
    Ok(ApiResponse::ok(entries))
}
