//! Session Store
//!
//! Per-client state: the currently bound dataset and the ordered history of
//! questions asked against it. Sessions are keyed by opaque UUID tokens and
//! owned exclusively by the store; nothing is shared between sessions.
//!
//! ## Session Lifecycle
//!
//! 1. `create()` → token (first upload, or an explicit `POST /session`)
//! 2. `set_dataset()` → replaces the bound dataset, history untouched
//! 3. `append_history()` → one record per question, success or failure
//! 4. `clear()` → drops dataset and history, token stays valid
//! 5. idle timeout or `close()` → session gone, token is `NotFound`
//!
//! Expiry is lazy: an expired session is removed when it is next looked up,
//! and `create()` sweeps all expired sessions before inserting.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SessionConfig;
use crate::error::{ErrorKind, NlSqlError, NlSqlResult};
use crate::relation::Relation;

/// Opaque session identifier (UUID v4, not guessable)
pub type SessionToken = String;

/// An uploaded relation bound to a table name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub table_name: String,
    pub file_name: Option<String>,
    pub relation: Relation,
    pub loaded_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(table_name: impl Into<String>, file_name: Option<String>, relation: Relation) -> Self {
        Self {
            table_name: table_name.into(),
            file_name,
            relation,
            loaded_at: Utc::now(),
        }
    }
}

/// What happened to a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// SQL ran; `relation` holds the (possibly truncated) result
    Rows { relation: Relation, truncated: bool },
    /// Translation or execution failed
    Failed { kind: ErrorKind, message: String },
    /// Translated only, execution was not requested
    NotExecuted,
}

impl QueryOutcome {
    pub fn failed(err: &NlSqlError) -> Self {
        QueryOutcome::Failed {
            kind: err.kind(),
            message: err.detail(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, QueryOutcome::Failed { .. })
    }
}

/// One question and what came of it. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    /// Position in the session's history (assigned on append)
    pub id: usize,
    pub question: String,
    /// `None` when translation failed before producing SQL
    pub sql: Option<String>,
    pub explanation: Option<String>,
    pub outcome: QueryOutcome,
    pub timestamp: DateTime<Utc>,
}

impl QueryRecord {
    pub fn new(
        question: impl Into<String>,
        sql: Option<String>,
        explanation: Option<String>,
        outcome: QueryOutcome,
    ) -> Self {
        Self {
            id: 0,
            question: question.into(),
            sql,
            explanation,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

/// A single client's state
#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub dataset: Option<Arc<Dataset>>,
    pub history: Vec<QueryRecord>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    last_active: Instant,
    next_record_id: usize,
}

impl Session {
    fn new(token: SessionToken) -> Self {
        let now = Utc::now();
        Self {
            token,
            dataset: None,
            history: Vec::new(),
            created_at: now,
            last_active_at: now,
            last_active: Instant::now(),
            next_record_id: 0,
        }
    }

    fn touch(&mut self) {
        self.last_active = Instant::now();
        self.last_active_at = Utc::now();
    }

    /// No dataset and no history
    pub fn is_empty(&self) -> bool {
        self.dataset.is_none() && self.history.is_empty()
    }
}

/// Summary statistics about sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub sessions_with_dataset: usize,
    pub history_records: usize,
}

/// Owns all live sessions.
///
/// Thread-safe via an internal `RwLock`; a single active dataset per token
/// with last-write-wins semantics.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionToken, Session>>,
    max_sessions: usize,
    idle_timeout: Option<Duration>,
    max_history: usize,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: config.max_sessions,
            idle_timeout: config.idle_timeout(),
            max_history: config.max_history,
        }
    }

    /// Override the per-session history cap (0 = unlimited).
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Override the idle timeout (sub-second values are useful in tests).
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        self.idle_timeout
            .is_some_and(|t| now.duration_since(session.last_active) >= t)
    }

    /// Create a new, empty session.
    pub fn create(&self) -> NlSqlResult<SessionToken> {
        self.reap_expired();

        let mut sessions = self.sessions.write();
        if self.max_sessions > 0 && sessions.len() >= self.max_sessions {
            return Err(NlSqlError::SessionLimit {
                max: self.max_sessions,
            });
        }

        let token = uuid::Uuid::new_v4().to_string();
        sessions.insert(token.clone(), Session::new(token.clone()));
        drop(sessions);

        tracing::info!(session = %token, "session_created");
        Ok(token)
    }

    /// Run `f` against a live session, touching it. Expired sessions are removed.
    fn with_live_session<F, R>(&self, token: &str, f: F) -> NlSqlResult<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let not_found = || NlSqlError::SessionNotFound {
            token: token.to_string(),
        };

        let mut sessions = self.sessions.write();
        let now = Instant::now();
        match sessions.get(token).map(|s| self.is_expired(s, now)) {
            None => Err(not_found()),
            Some(true) => {
                sessions.remove(token);
                drop(sessions);
                tracing::info!(session = %token, "session_expired");
                Err(not_found())
            }
            Some(false) => {
                let session = sessions.get_mut(token).ok_or_else(not_found)?;
                session.touch();
                Ok(f(session))
            }
        }
    }

    /// Snapshot of a session.
    pub fn get(&self, token: &str) -> NlSqlResult<Session> {
        self.with_live_session(token, |s| s.clone())
    }

    /// Whether `token` names a live session (does not touch it).
    pub fn contains(&self, token: &str) -> bool {
        let now = Instant::now();
        self.sessions
            .read()
            .get(token)
            .is_some_and(|s| !self.is_expired(s, now))
    }

    /// The currently bound dataset, if any.
    pub fn dataset(&self, token: &str) -> NlSqlResult<Option<Arc<Dataset>>> {
        self.with_live_session(token, |s| s.dataset.clone())
    }

    /// Replace the bound dataset. History is left as is.
    pub fn set_dataset(&self, token: &str, dataset: Dataset) -> NlSqlResult<()> {
        self.with_live_session(token, |s| s.dataset = Some(Arc::new(dataset)))
    }

    /// Append a record, assigning the next `id`. Returns the stored record.
    ///
    /// Ids count from 0 since the last clear, so they match positions until
    /// the history cap starts dropping the oldest records.
    pub fn append_history(&self, token: &str, mut record: QueryRecord) -> NlSqlResult<QueryRecord> {
        let max_history = self.max_history;
        self.with_live_session(token, |s| {
            record.id = s.next_record_id;
            s.next_record_id += 1;
            s.history.push(record.clone());
            if max_history > 0 && s.history.len() > max_history {
                let excess = s.history.len() - max_history;
                s.history.drain(..excess);
            }
            record
        })
    }

    /// History in insertion order.
    pub fn history(&self, token: &str) -> NlSqlResult<Vec<QueryRecord>> {
        self.with_live_session(token, |s| s.history.clone())
    }

    /// Drop dataset and history; the token remains valid.
    pub fn clear(&self, token: &str) -> NlSqlResult<()> {
        self.with_live_session(token, |s| {
            s.dataset = None;
            s.history.clear();
            s.next_record_id = 0;
        })?;
        tracing::info!(session = %token, "session_cleared");
        Ok(())
    }

    /// Destroy a session.
    pub fn close(&self, token: &str) -> NlSqlResult<()> {
        self.sessions
            .write()
            .remove(token)
            .ok_or_else(|| NlSqlError::SessionNotFound {
                token: token.to_string(),
            })?;
        tracing::info!(session = %token, "session_closed");
        Ok(())
    }

    /// Remove idle sessions. Returns the number removed.
    pub fn reap_expired(&self) -> usize {
        if self.idle_timeout.is_none() {
            return 0;
        }
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s, now));
        let reaped = before - sessions.len();
        drop(sessions);
        if reaped > 0 {
            tracing::info!(reaped, "sessions_reaped");
        }
        reaped
    }

    /// Get the number of sessions currently held (expired ones included until reaped)
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn stats(&self) -> SessionStats {
        let sessions = self.sessions.read();
        SessionStats {
            total_sessions: sessions.len(),
            sessions_with_dataset: sessions.values().filter(|s| s.dataset.is_some()).count(),
            history_records: sessions.values().map(|s| s.history.len()).sum(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}
