//! Response envelope shared by every endpoint: `{ code, message, data? }`
use crate::error::UserCenterError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_code(200, "success", data)
    }

    pub fn created(data: T) -> Self {
        Self::with_code(201, "created", data)
    }

    pub fn with_code(code: u16, message: impl Into<String>, data: T) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// Envelope without a payload
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: 200,
            message: message.into(),
            data: None,
        }
    }

    pub fn error(err: &UserCenterError) -> Self {
        Self {
            code: err.code(),
            message: err.public_message(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

fn log_failure(err: &UserCenterError) {
    if err.is_internal() {
        error!(error = %err, "Request failed with internal error");
    } else {
        debug!(error = %err, code = err.code(), "Request rejected");
    }
}

impl IntoResponse for UserCenterError {
    fn into_response(self) -> Response {
        log_failure(&self);
        ApiResponse::error(&self).into_response()
    }
}

/// Login failures keep transport status 200 and carry the real code in the body
///
/// Existing clients branch on the envelope `code` for these outcomes. Internal
/// failures still use the matching transport status.
pub fn login_failure(err: UserCenterError) -> Response {
    match err {
        UserCenterError::InvalidCredentials
        | UserCenterError::AccountDisabled
        | UserCenterError::Validation(_) => {
            log_failure(&err);
            (StatusCode::OK, Json(ApiResponse::error(&err))).into_response()
        }
        other => other.into_response(),
    }
}
