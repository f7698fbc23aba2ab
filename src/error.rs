//! Error types for the nlsql service.
//!
//! Every failure that can reach a caller is one of these variants. The
//! orchestrator records translation and query failures in session history;
//! the REST layer maps the rest onto HTTP statuses.

use serde::{Deserialize, Serialize};

/// nlsql error type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum NlSqlError {
    // Upload Errors
    /// Malformed upload (bad encoding, ragged rows, missing header)
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// Upload exceeds a configured byte or row ceiling
    #[error("Size limit exceeded: {resource} (limit: {limit}, got: {actual})")]
    SizeLimitExceeded {
        resource: String,
        limit: usize,
        actual: usize,
    },

    // Query Errors
    /// External translation service failed or produced nothing usable
    #[error("Translation error: {message}")]
    TranslationError { message: String },

    /// Generated SQL was rejected or failed in the engine
    #[error("Query error: {message}")]
    QueryError { message: String },

    // Session Errors
    /// Unknown or expired session token
    #[error("Session not found: {token}")]
    SessionNotFound { token: String },

    /// Session exists but no dataset has been uploaded
    #[error("No dataset bound to session {token}; upload a dataset first")]
    NoDataset { token: String },

    /// Maximum number of concurrent sessions reached
    #[error("Maximum number of sessions ({max}) exceeded")]
    SessionLimit { max: usize },

    // Request Errors
    /// Request is missing or has invalid fields
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Internal server error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result alias used throughout the crate.
pub type NlSqlResult<T> = Result<T, NlSqlError>;

impl NlSqlError {
    pub fn parse(message: impl Into<String>) -> Self {
        NlSqlError::ParseError {
            message: message.into(),
        }
    }

    pub fn translation(message: impl Into<String>) -> Self {
        NlSqlError::TranslationError {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        NlSqlError::QueryError {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        NlSqlError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        NlSqlError::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable error kind.
    ///
    /// Unknown sessions and sessions without a dataset share `not_found`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NlSqlError::ParseError { .. } => ErrorKind::ParseError,
            NlSqlError::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            NlSqlError::TranslationError { .. } => ErrorKind::TranslationError,
            NlSqlError::QueryError { .. } => ErrorKind::QueryError,
            NlSqlError::SessionNotFound { .. } | NlSqlError::NoDataset { .. } => {
                ErrorKind::NotFound
            }
            NlSqlError::SessionLimit { .. } => ErrorKind::SessionLimit,
            NlSqlError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            NlSqlError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// The message without the variant prefix, as shown to users.
    pub fn detail(&self) -> String {
        match self {
            NlSqlError::ParseError { message }
            | NlSqlError::TranslationError { message }
            | NlSqlError::QueryError { message }
            | NlSqlError::InvalidRequest { message }
            | NlSqlError::Internal { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Coarse error classification carried in API responses and history records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    SizeLimitExceeded,
    TranslationError,
    QueryError,
    NotFound,
    SessionLimit,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse_error",
            ErrorKind::SizeLimitExceeded => "size_limit_exceeded",
            ErrorKind::TranslationError => "translation_error",
            ErrorKind::QueryError => "query_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::SessionLimit => "session_limit",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<rusqlite::Error> for NlSqlError {
    fn from(e: rusqlite::Error) -> Self {
        NlSqlError::QueryError {
            message: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for NlSqlError {
    fn from(e: tokio::task::JoinError) -> Self {
        NlSqlError::Internal {
            message: format!("Background task failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_match_serde() {
        for kind in [
            ErrorKind::ParseError,
            ErrorKind::SizeLimitExceeded,
            ErrorKind::TranslationError,
            ErrorKind::QueryError,
            ErrorKind::NotFound,
            ErrorKind::SessionLimit,
            ErrorKind::InvalidRequest,
            ErrorKind::Internal,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_missing_dataset_is_not_found() {
        let err = NlSqlError::NoDataset {
            token: "abc".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("upload a dataset first"));
    }

    #[test]
    fn test_detail_strips_prefix() {
        let err = NlSqlError::query("no such column: agee");
        assert_eq!(err.detail(), "no such column: agee");
        assert_eq!(err.to_string(), "Query error: no such column: agee");
    }

    #[test]
    fn test_size_limit_display() {
        let err = NlSqlError::SizeLimitExceeded {
            resource: "rows".to_string(),
            limit: 10,
            actual: 11,
        };
        assert_eq!(
            err.to_string(),
            "Size limit exceeded: rows (limit: 10, got: 11)"
        );
        assert_eq!(err.kind(), ErrorKind::SizeLimitExceeded);
    }

    #[test]
    fn test_rusqlite_error_becomes_query_error() {
        let err: NlSqlError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.kind(), ErrorKind::QueryError);
    }
}
