//! HTTP API Module
//!
//! JSON endpoints for uploading a dataset and asking questions about it,
//! plus session management, a health probe and optional GUI file serving.
//!
//! | Method | Path       | Purpose                                  |
//! |--------|------------|------------------------------------------|
//! | POST   | `/upload`  | multipart CSV upload, binds the dataset  |
//! | POST   | `/query`   | translate and run a question             |
//! | POST   | `/clear`   | drop dataset and history                 |
//! | GET    | `/history` | questions asked so far, oldest first     |
//! | POST   | `/session` | create an empty session                  |
//! | GET    | `/session` | session info                             |
//! | DELETE | `/session` | close the session                        |
//! | GET    | `/health`  | liveness and counters                    |

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::config::HttpConfig;
use crate::orchestrator::Orchestrator;

use self::handlers::{admin, query, sessions, upload};

/// Room for multipart boundaries and form fields on top of the file itself.
pub const MULTIPART_ALLOWANCE: usize = 64 * 1024;

/// Request body ceiling for a given upload limit (0 = unlimited).
pub fn body_limit_for(max_upload_bytes: usize) -> usize {
    if max_upload_bytes == 0 {
        0
    } else {
        max_upload_bytes.saturating_add(MULTIPART_ALLOWANCE)
    }
}

/// Creates the Axum router
///
/// `body_limit` caps request bodies in bytes; 0 disables the cap.
pub fn create_router(
    orchestrator: Arc<Orchestrator>,
    config: &HttpConfig,
    body_limit: usize,
) -> Router {
    // Build CORS layer
    let cors = if !config.cors_origins.is_empty() {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| {
                let parsed = s.parse();
                if parsed.is_err() {
                    tracing::warn!(origin = %s, "invalid CORS origin ignored");
                }
                parsed.ok()
            })
            .collect();
        Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else if config.cors_allow_all {
        Some(CorsLayer::permissive())
    } else {
        // Same-origin only
        None
    };

    let mut app = Router::new()
        .route("/upload", post(upload::upload))
        .route("/query", post(query::query))
        .route("/clear", post(query::clear))
        .route("/history", get(query::history))
        .route(
            "/session",
            post(sessions::create_session)
                .get(sessions::get_session)
                .delete(sessions::close_session),
        )
        .route("/health", get(admin::health))
        .layer(Extension(orchestrator));

    app = if body_limit > 0 {
        app.layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(body_limit))
    } else {
        app.layer(DefaultBodyLimit::disable())
    };

    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    // Serve GUI static files if enabled
    if config.gui.enabled {
        let static_dir = &config.gui.static_dir;
        let index_file = format!("{static_dir}/index.html");
        app = app.fallback_service(ServeDir::new(static_dir).fallback(ServeFile::new(index_file)));
    }

    app
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Listens for SIGINT (ctrl-c) and SIGTERM. Sessions live only in memory, so
/// nothing needs flushing on the way out.
pub async fn start_http_server(
    orchestrator: Arc<Orchestrator>,
    config: &HttpConfig,
    body_limit: usize,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(orchestrator, config, body_limit);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let socket = tokio::net::TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;

    tracing::info!(%addr, "HTTP server listening");
    if config.gui.enabled {
        tracing::info!(static_dir = %config.gui.static_dir, "GUI available at http://{addr}/");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await;
                tracing::info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::error::{NlSqlError, NlSqlResult};
    use crate::relation::ColumnType;
    use crate::translator::{Translation, Translator};

    struct Unreachable;

    #[async_trait]
    impl Translator for Unreachable {
        async fn translate(
            &self,
            _question: &str,
            _table_name: &str,
            _schema: &[(String, ColumnType)],
        ) -> NlSqlResult<Translation> {
            Err(NlSqlError::translation("not available in tests"))
        }
    }

    fn make_orchestrator() -> Arc<Orchestrator> {
        Arc::new(Orchestrator::from_config(
            &crate::Config::default(),
            Arc::new(Unreachable),
        ))
    }

    fn router() -> Router {
        create_router(make_orchestrator(), &HttpConfig::default(), body_limit_for(1024))
    }

    #[test]
    fn test_body_limit_for() {
        assert_eq!(body_limit_for(0), 0);
        assert_eq!(body_limit_for(10), 10 + MULTIPART_ALLOWANCE);
        assert_eq!(body_limit_for(usize::MAX), usize::MAX);
    }

    #[tokio::test]
    async fn test_router_health() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_history_without_session_is_404() {
        let req = Request::builder()
            .uri("/history")
            .body(Body::empty())
            .unwrap();
        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404_when_gui_disabled() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let body = vec![b'a'; body_limit_for(1024) + 1];
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-type", "multipart/form-data; boundary=X")
            .header("content-length", body.len())
            .body(Body::from(body))
            .unwrap();
        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_permissive_cors_sets_header() {
        let config = HttpConfig {
            cors_allow_all: true,
            ..HttpConfig::default()
        };
        let app = create_router(make_orchestrator(), &config, 0);
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://example.com")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp
            .headers()
            .contains_key("access-control-allow-origin"));
    }
}
