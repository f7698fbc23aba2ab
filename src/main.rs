//! nlsql Server Binary
//!
//! Serves the question-answering HTTP API and, optionally, a static GUI.
//!
//! ## Usage
//!
//! ```bash
//! # Start server with default settings (config.toml if present)
//! GROQ_API_KEY=gsk_... cargo run --bin nlsql-server
//!
//! # Custom address and config file
//! cargo run --bin nlsql-server -- --host 0.0.0.0 --port 9000 --config prod.toml
//! ```
//!
//! ## Logging
//!
//! Logs go to stderr, or to `NLSQL_LOG_FILE` when set. `RUST_LOG` overrides
//! `logging.level`; `logging.format = "json"` switches to JSON lines.

use std::env;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nlsql::config::LoggingConfig;
use nlsql::protocol::rest;
use nlsql::{ChatCompletionTranslator, Config, Orchestrator};

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser)]
#[command(name = "nlsql-server")]
#[command(about = "Natural-language questions over uploaded CSV files")]
#[command(version)]
struct Cli {
    /// Host address to bind to (overrides http.host)
    #[arg(long)]
    host: Option<String>,

    /// Port number to bind to (overrides http.port)
    #[arg(long)]
    port: Option<u16>,

    /// Configuration file (default: config.toml + config.local.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    init_tracing(&config.logging);

    if let Some(host) = cli.host {
        config.http.host = host;
    }
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    if config.translator.api_key.is_none() {
        config.translator.api_key = env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty());
    }
    if config.translator.api_key.is_none() {
        tracing::warn!("no translator API key configured; questions other than schema lookups will fail");
    }

    let translator = Arc::new(ChatCompletionTranslator::new(config.translator.clone())?);
    let orchestrator = Arc::new(Orchestrator::from_config(&config, translator));

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.translator.model,
        max_upload_bytes = config.loader.max_upload_bytes,
        max_rows = config.loader.max_rows,
        max_sessions = config.session.max_sessions,
        "nlsql server starting"
    );

    let body_limit = rest::body_limit_for(config.loader.max_upload_bytes);
    rest::start_http_server(orchestrator, &config.http, body_limit).await?;

    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    // RUST_LOG takes precedence over the config file level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging_config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let json = logging_config.format == "json";

    let writer = match env::var("NLSQL_LOG_FILE") {
        Ok(log_path) => match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                let _ = TRACE_GUARD.set(guard);
                Some(non_blocking)
            }
            Err(e) => {
                eprintln!("ERROR: Unable to open NLSQL_LOG_FILE '{log_path}': {e}");
                None
            }
        },
        Err(_) => None,
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = match (writer, json) {
        (Some(w), true) => Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(w)
                .json()
                .finish(),
        ),
        (Some(w), false) => Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(w)
                .compact()
                .finish(),
        ),
        (None, true) => Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .finish(),
        ),
        (None, false) => Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .compact()
                .finish(),
        ),
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
