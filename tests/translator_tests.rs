//! Chat-completion translator against a local stand-in for the hosted API.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;

use nlsql::config::TranslatorConfig;
use nlsql::{ChatCompletionTranslator, ColumnType, ErrorKind, Translator};

type Seen = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

/// Serve `body` with `status` on a random local port, recording requests.
async fn spawn_mock(status: StatusCode, body: serde_json::Value, delay: Duration) -> (String, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, Json(request): Json<serde_json::Value>| {
            let recorder = Arc::clone(&recorder);
            let body = body.clone();
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                recorder.lock().push((auth, request));
                tokio::time::sleep(delay).await;
                (status, Json(body))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1/chat/completions"), seen)
}

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    })
}

fn translator(base_url: String, timeout_ms: u64) -> ChatCompletionTranslator {
    ChatCompletionTranslator::new(TranslatorConfig {
        base_url,
        api_key: Some("test-key".to_string()),
        timeout_ms,
        ..TranslatorConfig::default()
    })
    .unwrap()
}

fn schema() -> Vec<(String, ColumnType)> {
    vec![
        ("name".to_string(), ColumnType::Text),
        ("age".to_string(), ColumnType::Numeric),
    ]
}

#[tokio::test]
async fn test_translate_fenced_json_reply() {
    let reply = "```json\n{\"sql_query\": \"SELECT AVG(age) FROM data\", \"explanation\": \"Mean of age.\"}\n```";
    let (url, seen) = spawn_mock(StatusCode::OK, completion(reply), Duration::ZERO).await;

    let t = translator(url, 5_000)
        .translate("What is the average age?", "data", &schema())
        .await
        .unwrap();
    assert_eq!(t.sql, "SELECT AVG(age) FROM data");
    assert_eq!(t.explanation.as_deref(), Some("Mean of age."));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let (auth, request) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer test-key"));
    assert_eq!(request["model"], "llama-3.1-8b-instant");
    assert_eq!(request["temperature"], 0.0);
    assert_eq!(request["messages"][0]["role"], "system");
    let system = request["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("- name (text)"));
    assert!(system.contains("- age (numeric)"));
    assert_eq!(
        request["messages"][1]["content"],
        "Natural language question: What is the average age?"
    );
}

#[tokio::test]
async fn test_translate_raw_sql_reply() {
    let (url, _) = spawn_mock(
        StatusCode::OK,
        completion("SELECT COUNT(*) FROM data"),
        Duration::ZERO,
    )
    .await;
    let t = translator(url, 5_000)
        .translate("how many rows", "data", &schema())
        .await
        .unwrap();
    assert_eq!(t.sql, "SELECT COUNT(*) FROM data");
    assert!(t.explanation.is_none());
}

#[tokio::test]
async fn test_non_success_status_is_translation_error() {
    let (url, _) = spawn_mock(
        StatusCode::TOO_MANY_REQUESTS,
        serde_json::json!({ "error": { "message": "rate limited" } }),
        Duration::ZERO,
    )
    .await;
    let err = translator(url, 5_000)
        .translate("q", "data", &schema())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TranslationError);
    assert!(err.detail().contains("429"));
    assert!(err.detail().contains("rate limited"));
}

#[tokio::test]
async fn test_empty_completion_is_translation_error() {
    let (url, _) = spawn_mock(
        StatusCode::OK,
        serde_json::json!({ "choices": [] }),
        Duration::ZERO,
    )
    .await;
    let err = translator(url, 5_000)
        .translate("q", "data", &schema())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TranslationError);
}

#[tokio::test]
async fn test_malformed_body_is_translation_error() {
    let (url, _) = spawn_mock(
        StatusCode::OK,
        serde_json::json!({ "choices": "nope" }),
        Duration::ZERO,
    )
    .await;
    let err = translator(url, 5_000)
        .translate("q", "data", &schema())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TranslationError);
    assert!(err.detail().contains("malformed"));
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let (url, _) = spawn_mock(
        StatusCode::OK,
        completion("SELECT 1"),
        Duration::from_millis(500),
    )
    .await;
    let err = translator(url, 50)
        .translate("q", "data", &schema())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TranslationError);
    assert!(err.detail().contains("timed out"), "{err}");
}

#[tokio::test]
async fn test_unreachable_service_is_translation_error() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = translator(format!("http://{addr}/v1/chat/completions"), 2_000)
        .translate("q", "data", &schema())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TranslationError);
}
