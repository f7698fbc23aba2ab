//! nlsql Protocol
//!
//! Client-server communication over HTTP.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                      nlsql Protocol                          |
//! +-------------------------------------------------------------+
//! |  HTTP Endpoints:                                            |
//! |    - /upload, /query, /clear, /history: dataset questions   |
//! |    - /session: explicit session lifecycle                   |
//! |    - /health: health check and counters                     |
//! +-------------------------------------------------------------+
//! |  Wire Format: JSON envelope { success, data?, error? }      |
//! |  Session identity: nlsql_session cookie or x-session-id     |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Module Structure
//!
//! - `rest` - REST API handlers and routing

pub mod rest;

pub use rest::{body_limit_for, create_router, start_http_server};
