//! Request Orchestrator
//!
//! Single entry point for the HTTP layer: upload, ask, clear and history.
//! Wires the loader, translator and executor around the session store and
//! records every question asked, whether it succeeded or not.
//!
//! Uses `AtomicU64` for the lock-free counters reported by `/health`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::error::{NlSqlError, NlSqlResult};
use crate::executor::QueryExecutor;
use crate::loader::DatasetLoader;
use crate::relation::{Column, ColumnType, Relation, Value};
use crate::session::{Dataset, QueryOutcome, QueryRecord, SessionStats, SessionStore, SessionToken};
use crate::translator::Translator;

/// Table name used when the upload does not name one.
pub const DEFAULT_TABLE_NAME: &str = "data";

/// Table names with this prefix are reserved by SQLite.
const RESERVED_TABLE_PREFIX: &str = "sqlite_";

/// File extensions accepted at upload, compared case-insensitively.
const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Questions containing any of these are answered from the bound schema
/// without calling the translator.
const SCHEMA_KEYWORDS: &[&str] = &[
    "schema",
    "columns",
    "data types",
    "table info",
    "structure",
    "describe",
];

/// What a successful upload reports back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSummary {
    pub session_id: SessionToken,
    pub table_name: String,
    pub file_name: Option<String>,
    pub columns: Vec<Column>,
    pub total_rows: usize,
    pub preview_rows: Vec<Vec<Value>>,
}

/// Read-only view of a session for `GET /session`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionToken,
    pub table_name: Option<String>,
    pub columns: Vec<Column>,
    pub row_count: usize,
    pub history_len: usize,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// Thread-safe orchestrator shared by all request handlers.
pub struct Orchestrator {
    sessions: SessionStore,
    loader: DatasetLoader,
    executor: QueryExecutor,
    translator: Arc<dyn Translator>,
    preview_rows: usize,
    start_time: Instant,
    upload_count: AtomicU64,
    query_count: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        sessions: SessionStore,
        loader: DatasetLoader,
        executor: QueryExecutor,
        translator: Arc<dyn Translator>,
    ) -> Self {
        let preview_rows = loader.config().preview_rows;
        Self {
            sessions,
            loader,
            executor,
            translator,
            preview_rows,
            start_time: Instant::now(),
            upload_count: AtomicU64::new(0),
            query_count: AtomicU64::new(0),
        }
    }

    /// Build every component from configuration.
    pub fn from_config(config: &Config, translator: Arc<dyn Translator>) -> Self {
        Self::new(
            SessionStore::new(&config.session),
            DatasetLoader::new(config.loader.clone()),
            QueryExecutor::new(config.executor.clone()),
            translator,
        )
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn total_uploads(&self) -> u64 {
        self.upload_count.load(Ordering::Relaxed)
    }

    pub fn total_queries(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }

    pub fn session_stats(&self) -> SessionStats {
        self.sessions.stats()
    }

    /// Parse an upload and bind it to the caller's session.
    ///
    /// An absent, unknown or expired token gets a fresh session. Nothing is
    /// bound when parsing fails, so an earlier dataset stays in place.
    pub async fn upload(
        &self,
        token: Option<&str>,
        file_name: Option<String>,
        table_name: Option<&str>,
        bytes: Vec<u8>,
    ) -> NlSqlResult<UploadSummary> {
        validate_file_name(file_name.as_deref())?;
        let table_name = validate_table_name(table_name)?;
        let byte_count = bytes.len();

        let loader = self.loader.clone();
        let parsed = tokio::task::spawn_blocking(move || loader.load(&bytes)).await?;
        let relation = match parsed {
            Ok(relation) => relation,
            Err(e) => {
                tracing::warn!(
                    session = token.unwrap_or("-"),
                    file = file_name.as_deref().unwrap_or("-"),
                    bytes = byte_count,
                    kind = %e.kind(),
                    error = %e,
                    "upload_rejected"
                );
                return Err(e);
            }
        };

        let summary = UploadSummary {
            session_id: String::new(),
            table_name: table_name.clone(),
            file_name: file_name.clone(),
            columns: relation.columns().to_vec(),
            total_rows: relation.row_count(),
            preview_rows: relation.preview(self.preview_rows).to_vec(),
        };
        let dataset = Dataset::new(table_name, file_name, relation);

        let token = match token.filter(|t| self.sessions.contains(t)) {
            Some(t) => t.to_string(),
            None => self.sessions.create()?,
        };
        let token = match self.sessions.set_dataset(&token, dataset.clone()) {
            Ok(()) => token,
            // Expired between the check and the bind
            Err(NlSqlError::SessionNotFound { .. }) => {
                let fresh = self.sessions.create()?;
                self.sessions.set_dataset(&fresh, dataset)?;
                fresh
            }
            Err(e) => return Err(e),
        };

        self.upload_count.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            session = %token,
            table = %summary.table_name,
            rows = summary.total_rows,
            columns = summary.columns.len(),
            bytes = byte_count,
            "dataset_bound"
        );

        Ok(UploadSummary {
            session_id: token,
            ..summary
        })
    }

    /// Answer a question against the session's dataset and record it.
    ///
    /// Translation and execution failures are recorded and returned as a
    /// failed record, not as an error. With `execute = false` the SQL is
    /// generated but not run.
    pub async fn ask(&self, token: &str, question: &str, execute: bool) -> NlSqlResult<QueryRecord> {
        let question = question.trim();
        if question.is_empty() {
            return Err(NlSqlError::invalid_request("question must not be empty"));
        }

        let dataset = self
            .sessions
            .dataset(token)?
            .ok_or_else(|| NlSqlError::NoDataset {
                token: token.to_string(),
            })?;
        self.query_count.fetch_add(1, Ordering::Relaxed);

        let record = if is_schema_question(question) {
            describe_record(question, &dataset)
        } else {
            self.translate_and_run(token, question, execute, dataset).await
        };

        let stored = self.sessions.append_history(token, record)?;
        tracing::info!(
            session = %token,
            id = stored.id,
            success = stored.outcome.is_success(),
            "query_recorded"
        );
        Ok(stored)
    }

    async fn translate_and_run(
        &self,
        token: &str,
        question: &str,
        execute: bool,
        dataset: Arc<Dataset>,
    ) -> QueryRecord {
        let schema = dataset.relation.schema();
        let translation = match self
            .translator
            .translate(question, &dataset.table_name, &schema)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(session = %token, error = %e, "translation_failed");
                return QueryRecord::new(question, None, None, QueryOutcome::failed(&e));
            }
        };

        if !execute {
            return QueryRecord::new(
                question,
                Some(translation.sql),
                translation.explanation,
                QueryOutcome::NotExecuted,
            );
        }

        let executor = self.executor.clone();
        let sql = translation.sql.clone();
        let run = tokio::task::spawn_blocking(move || {
            executor.execute(&dataset.relation, &dataset.table_name, &sql)
        })
        .await
        .map_err(NlSqlError::from)
        .and_then(|r| r);

        let outcome = match run {
            Ok(output) => QueryOutcome::Rows {
                relation: output.relation,
                truncated: output.truncated,
            },
            Err(e) => {
                tracing::warn!(session = %token, sql = %translation.sql, error = %e, "query_failed");
                QueryOutcome::failed(&e)
            }
        };
        QueryRecord::new(
            question,
            Some(translation.sql),
            translation.explanation,
            outcome,
        )
    }

    /// Drop the session's dataset and history.
    pub fn clear(&self, token: &str) -> NlSqlResult<()> {
        self.sessions.clear(token)
    }

    pub fn history(&self, token: &str) -> NlSqlResult<Vec<QueryRecord>> {
        self.sessions.history(token)
    }

    pub fn create_session(&self) -> NlSqlResult<SessionToken> {
        self.sessions.create()
    }

    pub fn close_session(&self, token: &str) -> NlSqlResult<()> {
        self.sessions.close(token)
    }

    pub fn session_info(&self, token: &str) -> NlSqlResult<SessionInfo> {
        let session = self.sessions.get(token)?;
        let (table_name, columns, row_count) = match &session.dataset {
            Some(d) => (
                Some(d.table_name.clone()),
                d.relation.columns().to_vec(),
                d.relation.row_count(),
            ),
            None => (None, Vec::new(), 0),
        };
        Ok(SessionInfo {
            session_id: session.token,
            table_name,
            columns,
            row_count,
            history_len: session.history.len(),
            created_at: session.created_at,
            last_active_at: session.last_active_at,
        })
    }
}

/// Whether a question asks about the table layout rather than its data.
pub fn is_schema_question(question: &str) -> bool {
    let lower = question.to_lowercase();
    SCHEMA_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Resolve the requested table name, defaulting to [`DEFAULT_TABLE_NAME`].
///
/// Must be a plain identifier: a letter or `_`, then letters, digits or `_`.
/// The `sqlite_` prefix is reserved by the engine.
pub fn validate_table_name(name: Option<&str>) -> NlSqlResult<String> {
    let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => n,
        None => return Ok(DEFAULT_TABLE_NAME.to_string()),
    };
    if name
        .get(..RESERVED_TABLE_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(RESERVED_TABLE_PREFIX))
    {
        return Err(NlSqlError::invalid_request(format!(
            "invalid table name '{name}': names starting with '{RESERVED_TABLE_PREFIX}' are reserved"
        )));
    }
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name.to_string())
    } else {
        Err(NlSqlError::invalid_request(format!(
            "invalid table name '{name}': use letters, digits and underscores, not starting with a digit"
        )))
    }
}

/// Reject uploads whose file name carries an unsupported extension.
///
/// Uploads without a file name are parsed as delimited text.
pub fn validate_file_name(file_name: Option<&str>) -> NlSqlResult<()> {
    let Some(file_name) = file_name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(());
    };
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS
        .iter()
        .any(|e| e.eq_ignore_ascii_case(extension))
    {
        Ok(())
    } else {
        Err(NlSqlError::parse(format!(
            "unsupported file format '{file_name}': upload a .csv file"
        )))
    }
}

fn describe_record(question: &str, dataset: &Dataset) -> QueryRecord {
    let columns = vec![
        Column::new("column_name", ColumnType::Text),
        Column::new("column_type", ColumnType::Text),
    ];
    let rows = dataset
        .relation
        .columns()
        .iter()
        .map(|c| vec![Value::text(&c.name), Value::text(c.column_type.as_str())])
        .collect();
    QueryRecord::new(
        question,
        Some(format!("DESCRIBE {};", dataset.table_name)),
        Some(format!(
            "Lists the columns of the '{}' table with their inferred types.",
            dataset.table_name
        )),
        QueryOutcome::Rows {
            relation: Relation::new(columns, rows).unwrap_or_else(|_| Relation::empty(Vec::new())),
            truncated: false,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_schema_keywords() {
        assert!(is_schema_question("What is the schema?"));
        assert!(is_schema_question("Show me the COLUMNS"));
        assert!(is_schema_question("describe the table"));
        assert!(!is_schema_question("What is the average age?"));
    }

    #[test]
    fn test_table_name_defaults() {
        assert_eq!(validate_table_name(None).unwrap(), "data");
        assert_eq!(validate_table_name(Some("  ")).unwrap(), "data");
        assert_eq!(validate_table_name(Some("sales_2024")).unwrap(), "sales_2024");
        assert_eq!(validate_table_name(Some("_t")).unwrap(), "_t");
    }

    #[test]
    fn test_file_name_extension() {
        for ok in [None, Some("people.csv"), Some("PEOPLE.CSV"), Some("tabs.tsv"), Some("notes.txt")] {
            assert!(validate_file_name(ok).is_ok(), "{ok:?}");
        }
        for bad in ["report.json", "sheet.xlsx", "people", "archive.csv.gz"] {
            assert_eq!(
                validate_file_name(Some(bad)).unwrap_err().kind(),
                ErrorKind::ParseError,
                "{bad}"
            );
        }
    }

    #[test]
    fn test_table_name_rejects_non_identifiers() {
        for bad in ["2024", "my table", "t;drop", "naïve", "sqlite_people", "SQLite_Master"] {
            assert_eq!(
                validate_table_name(Some(bad)).unwrap_err().kind(),
                ErrorKind::InvalidRequest,
                "{bad}"
            );
        }
    }

    #[test]
    fn test_describe_record_lists_columns() {
        let rel = Relation::new(
            vec![
                Column::new("name", ColumnType::Text),
                Column::new("age", ColumnType::Numeric),
            ],
            Vec::new(),
        )
        .unwrap();
        let record = describe_record("schema?", &Dataset::new("people", None, rel));
        assert_eq!(record.sql.as_deref(), Some("DESCRIBE people;"));
        match record.outcome {
            QueryOutcome::Rows { relation, .. } => {
                assert_eq!(relation.column_names(), vec!["column_name", "column_type"]);
                assert_eq!(
                    relation.rows()[1],
                    vec![Value::text("age"), Value::text("numeric")]
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
