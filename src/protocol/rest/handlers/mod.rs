//! REST API Handlers
//!
//! Contains all HTTP endpoint handlers organized by domain, plus the session
//! identity helpers they share.

pub mod admin;
pub mod query;
pub mod sessions;
pub mod upload;

use axum::http::{header, HeaderMap, HeaderValue};

use crate::protocol::rest::error::RestError;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "nlsql_session";

/// Header carrying the session token. Wins over the cookie.
pub const SESSION_HEADER: &str = "x-session-id";

/// Session token sent by the client, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Session token, or 404 when the client sent none.
pub fn require_session(headers: &HeaderMap) -> Result<String, RestError> {
    session_token(headers)
        .ok_or_else(|| RestError::not_found("No session; upload a dataset first"))
}

/// `Set-Cookie` value binding the client to `token`.
pub fn session_cookie(token: &str) -> Result<HeaderValue, RestError> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .map_err(|e| RestError::internal(format!("Invalid session cookie: {e}")))
}

/// `Set-Cookie` value removing the session cookie.
pub fn expired_session_cookie() -> HeaderValue {
    HeaderValue::from_static("nlsql_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
