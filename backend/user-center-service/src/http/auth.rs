/// Request extractors for the caller's credential and client details
use super::AppState;
use crate::error::{Result, UserCenterError};
use crate::models::{ClientInfo, Identity};
use crate::validators::{truncate, MAX_DEVICE_ID_LENGTH, MAX_IP_ADDRESS_LENGTH};
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;

const DEVICE_ID_HEADER: &str = "x-device-id";

/// Extract the token from an `Authorization` header value
///
/// An absent or blank header is a missing credential; anything that is not
/// `Bearer <token>` is malformed.
pub fn parse_bearer(header: Option<&str>) -> Result<&str> {
    let value = header
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(UserCenterError::MissingCredential)?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(UserCenterError::MalformedCredential)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return Err(UserCenterError::MalformedCredential);
    }
    Ok(token)
}

/// Authenticated caller, resolved through session validation
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: Identity,
    pub token: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = UserCenterError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = match parts.headers.get(header::AUTHORIZATION) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| UserCenterError::MalformedCredential)?,
            ),
            None => None,
        };
        let token = parse_bearer(header)?.to_string();
        let identity = state.accounts.current_identity(&token).await?;

        Ok(CurrentUser { identity, token })
    }
}

/// Where the request came from, for session rows and the login audit
#[derive(Debug, Clone, Default)]
pub struct Client(pub ClientInfo);

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve the address recorded for a request
///
/// The first `X-Forwarded-For` hop is used only when `trust_forwarded_for` is
/// set; an untrusted header is ignored so callers cannot choose the audited IP.
pub fn client_address(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Option<String> {
    let forwarded = trust_forwarded_for
        .then(|| header_value(headers, "x-forwarded-for"))
        .flatten()
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty());

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .map(|ip| truncate(&ip, MAX_IP_ADDRESS_LENGTH))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Client {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Client(ClientInfo {
            ip_address: client_address(&parts.headers, peer, state.trust_forwarded_for),
            user_agent: header_value(&parts.headers, header::USER_AGENT.as_str()),
            device_id: header_value(&parts.headers, DEVICE_ID_HEADER)
                .map(|id| truncate(&id, MAX_DEVICE_ID_LENGTH)),
        }))
    }
}
