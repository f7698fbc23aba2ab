//! REST API Data Transfer Objects
//!
//! Defines request/response types for the REST API endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::relation::{Column, Value};
use crate::session::{QueryOutcome, QueryRecord, SessionToken};

/// JSON response: { success, data?, error? }
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorDto>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiErrorDto {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// Error details in API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorDto {
    pub code: String,
    pub message: String,
}

// Query DTOs
/// Question about the uploaded dataset
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    /// Run the generated SQL (default) or only translate it
    #[serde(default = "default_execute")]
    pub execute: bool,
}

fn default_execute() -> bool {
    true
}

/// Query execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Success,
    Error,
    NotExecuted,
}

/// Failure attached to a history record
#[derive(Debug, Clone, Serialize)]
pub struct QueryErrorDto {
    pub kind: ErrorKind,
    pub message: String,
}

/// One answered (or failed) question, as returned by `/query` and `/history`
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecordDto {
    pub id: usize,
    pub question: String,
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub status: QueryStatus,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryErrorDto>,
    pub timestamp: DateTime<Utc>,
}

impl From<QueryRecord> for QueryRecordDto {
    fn from(record: QueryRecord) -> Self {
        let (status, columns, rows, truncated, error) = match record.outcome {
            QueryOutcome::Rows {
                relation,
                truncated,
            } => {
                let (columns, rows) = relation.into_parts();
                (QueryStatus::Success, columns, rows, truncated, None)
            }
            QueryOutcome::Failed { kind, message } => (
                QueryStatus::Error,
                Vec::new(),
                Vec::new(),
                false,
                Some(QueryErrorDto { kind, message }),
            ),
            QueryOutcome::NotExecuted => {
                (QueryStatus::NotExecuted, Vec::new(), Vec::new(), false, None)
            }
        };
        Self {
            id: record.id,
            question: record.question,
            sql: record.sql,
            explanation: record.explanation,
            status,
            row_count: rows.len(),
            columns,
            rows,
            truncated,
            error,
            timestamp: record.timestamp,
        }
    }
}

// Session DTOs
#[derive(Debug, Serialize)]
pub struct SessionCreatedDto {
    pub session_id: SessionToken,
}

#[derive(Debug, Serialize)]
pub struct ClearedDto {
    pub session_id: SessionToken,
    pub cleared: bool,
}

// Admin DTOs
/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub sessions: usize,
    pub uploads: u64,
    pub queries: u64,
}
