//! # nlsql
//!
//! Ask plain-English questions about an uploaded CSV file. A hosted
//! chat-completion model writes the SQL; an embedded SQLite engine runs it.
//!
//! ## Pipeline
//!
//! ```text
//! CSV upload
//!     ↓
//! [DatasetLoader]      → Relation (names + inferred column types)
//!     ↓
//! [SessionStore]       → bound to the caller's session
//!
//! Question
//!     ↓
//! [Translator]         → SQL candidate (+ explanation)
//!     ↓
//! [QueryExecutor]      → result Relation, read-only, fresh engine per call
//!     ↓
//! [SessionStore]       → appended to history, success or failure
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nlsql::{ChatCompletionTranslator, Config, Orchestrator};
//!
//! let config = Config::load()?;
//! let translator = Arc::new(ChatCompletionTranslator::new(config.translator.clone())?);
//! let orchestrator = Orchestrator::from_config(&config, translator);
//!
//! let summary = orchestrator
//!     .upload(None, Some("people.csv".into()), None, b"name,age\nAlice,30\nBob,25\n".to_vec())
//!     .await?;
//! let record = orchestrator
//!     .ask(&summary.session_id, "What is the average age?", true)
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod loader;
pub mod orchestrator;
pub mod protocol;
pub mod relation;
pub mod session;
pub mod translator;

pub use config::Config;
pub use error::{ErrorKind, NlSqlError, NlSqlResult};
pub use executor::{QueryExecutor, QueryOutput};
pub use loader::DatasetLoader;
pub use orchestrator::{Orchestrator, SessionInfo, UploadSummary};
pub use relation::{Column, ColumnType, Relation, Value};
pub use session::{Dataset, QueryOutcome, QueryRecord, SessionStore, SessionToken};
pub use translator::{ChatCompletionTranslator, Translation, Translator};
