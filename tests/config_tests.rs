//! Config loading from TOML files and env var overrides.

use std::fs;

use nlsql::Config;
use tempfile::TempDir;

fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

// Default Configuration Tests
#[test]
fn test_default_session_settings() {
    let config = Config::default();
    assert_eq!(config.session.max_sessions, 1000);
    assert_eq!(config.session.max_history, 100);
    assert_eq!(config.session.idle_timeout_secs, 3600);
}

#[test]
fn test_default_logging() {
    let config = Config::default();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "text");
}

// File Loading Tests
#[test]
fn test_from_file_overrides_sections() {
    let (_dir, path) = write_config(
        r#"
[http]
host = "0.0.0.0"
port = 9000
cors_allow_all = true

[http.gui]
enabled = true
static_dir = "./gui"

[session]
max_sessions = 5
idle_timeout_secs = 0

[loader]
max_rows = 500
delimiter = ";"

[translator]
model = "mixtral-8x7b-32768"
api_key = "gsk_file"
timeout_ms = 1500
"#,
    );

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.http.host, "0.0.0.0");
    assert_eq!(config.http.port, 9000);
    assert!(config.http.cors_allow_all);
    assert!(config.http.gui.enabled);
    assert_eq!(config.http.gui.static_dir, "./gui");
    assert_eq!(config.session.max_sessions, 5);
    assert!(config.session.idle_timeout().is_none());
    assert_eq!(config.loader.max_rows, 500);
    assert_eq!(config.loader.delimiter, ';');
    assert_eq!(config.loader.preview_rows, 20, "unset fields keep defaults");
    assert_eq!(config.translator.model, "mixtral-8x7b-32768");
    assert_eq!(config.translator.api_key.as_deref(), Some("gsk_file"));
    assert_eq!(config.translator.timeout_ms, 1500);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::from_file(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.http.port, 8000);
    assert_eq!(config.loader.max_rows, 100_000);
}

#[test]
fn test_invalid_value_is_an_error() {
    let (_dir, path) = write_config("[http]\nport = \"not a port\"\n");
    assert!(Config::from_file(&path).is_err());
}

// Env Override Tests
#[test]
fn test_env_overrides_file() {
    let (_dir, path) = write_config("[executor]\nmax_result_rows = 10\n");
    std::env::set_var("NLSQL_EXECUTOR__MAX_RESULT_ROWS", "77");
    let config = Config::from_file(&path);
    std::env::remove_var("NLSQL_EXECUTOR__MAX_RESULT_ROWS");

    assert_eq!(config.unwrap().executor.max_result_rows, 77);
}
