//! Query Handlers
//!
//! Asking questions and reading back the session's history.

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, http::HeaderMap, Extension, Json};

use super::require_session;
use crate::orchestrator::Orchestrator;
use crate::protocol::rest::dto::{ApiResponse, ClearedDto, QueryRecordDto, QueryRequest};
use crate::protocol::rest::error::RestError;

/// Translate (and by default run) a question.
///
/// Translation and engine failures come back as `200` with
/// `status = "error"`; they are part of the history like any other answer.
pub async fn query(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    headers: HeaderMap,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<QueryRecordDto>>, RestError> {
    let token = require_session(&headers)?;
    let Json(request) = request?;

    let record = orchestrator
        .ask(&token, &request.question, request.execute)
        .await?;

    Ok(Json(ApiResponse::success(record.into())))
}

/// History in the order questions were asked
pub async fn history(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<QueryRecordDto>>>, RestError> {
    let token = require_session(&headers)?;
    let records = orchestrator.history(&token)?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(QueryRecordDto::from).collect(),
    )))
}

/// Forget the dataset and history; the session itself stays.
pub async fn clear(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<ClearedDto>>, RestError> {
    let token = require_session(&headers)?;
    orchestrator.clear(&token)?;
    Ok(Json(ApiResponse::success(ClearedDto {
        session_id: token,
        cleared: true,
    })))
}
