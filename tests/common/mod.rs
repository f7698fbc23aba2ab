//! Shared helpers for integration tests: deterministic translators and
//! request builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use nlsql::config::HttpConfig;
use nlsql::protocol::rest::{body_limit_for, create_router};
use nlsql::{ColumnType, Config, NlSqlError, NlSqlResult, Orchestrator, Translation, Translator};

pub const PEOPLE_CSV: &str = "name,age\nAlice,30\nBob,25\n";

/// Answers by keyword: the first rule whose key appears in the question wins.
pub struct StubTranslator {
    rules: Vec<(&'static str, &'static str)>,
    calls: AtomicUsize,
}

impl StubTranslator {
    pub fn new(rules: Vec<(&'static str, &'static str)>) -> Arc<Self> {
        Arc::new(Self {
            rules,
            calls: AtomicUsize::new(0),
        })
    }

    /// Rules covering the people dataset used throughout the tests.
    pub fn people() -> Arc<Self> {
        Self::new(vec![
            ("average age", "SELECT AVG(age) FROM data"),
            ("selekt", "SELEKT *"),
            ("oldest", "SELECT name FROM data ORDER BY age DESC LIMIT 1"),
            ("count", "SELECT COUNT(*) AS n FROM data"),
            ("drop", "DROP TABLE data"),
        ])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for StubTranslator {
    async fn translate(
        &self,
        question: &str,
        _table_name: &str,
        _schema: &[(String, ColumnType)],
    ) -> NlSqlResult<Translation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = question.to_lowercase();
        self.rules
            .iter()
            .find(|(key, _)| lower.contains(key))
            .map(|(_, sql)| Translation {
                sql: (*sql).to_string(),
                explanation: Some(format!("stub answer for '{question}'")),
            })
            .ok_or_else(|| NlSqlError::translation("service returned HTTP 503: unavailable"))
    }
}

pub fn orchestrator_with(config: &Config, translator: Arc<dyn Translator>) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::from_config(config, translator))
}

pub fn router_with(config: &Config, translator: Arc<dyn Translator>) -> Router {
    create_router(
        orchestrator_with(config, translator),
        &HttpConfig::default(),
        body_limit_for(config.loader.max_upload_bytes),
    )
}

/// Multipart body with a `file` part and an optional `table_name` part.
pub fn multipart_upload(
    file_name: &str,
    csv: &str,
    table_name: Option<&str>,
) -> (String, Vec<u8>) {
    let boundary = "nlsqltestboundary";
    let mut body = String::new();
    if let Some(table) = table_name {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"table_name\"\r\n\r\n{table}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: text/csv\r\n\r\n{csv}\r\n--{boundary}--\r\n"
    ));
    (
        format!("multipart/form-data; boundary={boundary}"),
        body.into_bytes(),
    )
}

pub fn upload_request(session: Option<&str>, csv: &str, table_name: Option<&str>) -> Request<Body> {
    let (content_type, body) = multipart_upload("people.csv", csv, table_name);
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header("content-type", content_type);
    if let Some(token) = session {
        builder = builder.header("x-session-id", token);
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn query_request(session: &str, question: &str) -> Request<Body> {
    json_request(
        "POST",
        "/query",
        Some(session),
        serde_json::json!({ "question": question }),
    )
}

pub fn json_request(
    method: &str,
    uri: &str,
    session: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = session {
        builder = builder.header("x-session-id", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = session {
        builder = builder.header("x-session-id", token);
    }
    builder.body(Body::empty()).unwrap()
}

/// Send a request and decode the JSON envelope.
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, headers, json)
}

/// Upload the people dataset and return the new session id.
pub async fn upload_people(app: &Router) -> String {
    let (status, _, json) = send(app, upload_request(None, PEOPLE_CSV, None)).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {json}");
    json["data"]["session_id"].as_str().unwrap().to_string()
}
