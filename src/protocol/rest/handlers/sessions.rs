//! Session Handlers
//!
//! Endpoints for explicit session lifecycle management. Uploading without a
//! session creates one implicitly, so these are optional for clients.

use std::sync::Arc;

use axum::{
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension, Json,
};

use super::{expired_session_cookie, require_session, session_cookie};
use crate::orchestrator::{Orchestrator, SessionInfo};
use crate::protocol::rest::dto::{ApiResponse, SessionCreatedDto};
use crate::protocol::rest::error::RestError;

/// Create a new, empty session
pub async fn create_session(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
) -> Result<impl IntoResponse, RestError> {
    let session_id = orchestrator.create_session()?;
    let cookie = session_cookie(&session_id)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(SessionCreatedDto { session_id })),
    ))
}

/// Get session info
pub async fn get_session(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<SessionInfo>>, RestError> {
    let token = require_session(&headers)?;
    Ok(Json(ApiResponse::success(orchestrator.session_info(&token)?)))
}

/// Close a session
pub async fn close_session(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RestError> {
    let token = require_session(&headers)?;
    orchestrator.close_session(&token)?;
    Ok((
        [(header::SET_COOKIE, expired_session_cookie())],
        Json(ApiResponse::success(format!("Session {token} closed"))),
    ))
}
