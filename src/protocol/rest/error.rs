//! REST API Error Types
//!
//! Provides error types and conversions for the REST API.

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{ErrorKind, NlSqlError};
use crate::protocol::rest::dto::ApiResponse;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

/// REST API error that can be returned from handlers
#[derive(Debug)]
pub struct RestError {
    pub status: StatusCode,
    pub error: ApiError,
}

impl RestError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::not_found(message),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::bad_request(message),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::internal(message),
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.error.code, self.error.message);
        (self.status, Json(body)).into_response()
    }
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ParseError | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::SizeLimitExceeded => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::SessionLimit => StatusCode::SERVICE_UNAVAILABLE,
        // Normally recorded in history rather than surfaced here
        ErrorKind::TranslationError => StatusCode::BAD_GATEWAY,
        ErrorKind::QueryError => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// Conversions from domain errors
impl From<NlSqlError> for RestError {
    fn from(err: NlSqlError) -> Self {
        let kind = err.kind();
        Self {
            status: status_for(kind),
            error: ApiError::new(kind.as_str().to_ascii_uppercase(), err.to_string()),
        }
    }
}

impl From<JsonRejection> for RestError {
    fn from(rejection: JsonRejection) -> Self {
        RestError::bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for RestError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            ErrorKind::SizeLimitExceeded.as_str().to_ascii_uppercase()
        } else {
            "BAD_REQUEST".to_string()
        };
        Self {
            status,
            error: ApiError::new(code, err.body_text()),
        }
    }
}
