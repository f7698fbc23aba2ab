//! Admin Handlers
//!
//! Health check endpoint.

use std::sync::Arc;

use axum::{Extension, Json};

use crate::orchestrator::Orchestrator;
use crate::protocol::rest::dto::{ApiResponse, HealthDto};
use crate::protocol::rest::error::RestError;

/// Health check endpoint
pub async fn health(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
) -> Result<Json<ApiResponse<HealthDto>>, RestError> {
    let health = HealthDto {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: orchestrator.uptime_seconds(),
        sessions: orchestrator.sessions().session_count(),
        uploads: orchestrator.total_uploads(),
        queries: orchestrator.total_queries(),
    };

    Ok(Json(ApiResponse::success(health)))
}
