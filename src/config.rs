//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (NLSQL_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [http]
//! host = "0.0.0.0"
//! port = 8000
//!
//! [loader]
//! max_upload_bytes = 10485760
//! max_rows = 100000
//!
//! [translator]
//! model = "llama-3.1-8b-instant"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! NLSQL_TRANSLATOR__API_KEY=gsk_...
//! NLSQL_LOADER__MAX_ROWS=5000
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub translator: TranslatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// HTTP server bind address
    #[serde(default = "default_http_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Allowed CORS origins (empty = same-origin only, unless cors_allow_all is true)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Explicitly allow all CORS origins (dev mode opt-in)
    #[serde(default)]
    pub cors_allow_all: bool,

    /// GUI static file serving configuration
    #[serde(default)]
    pub gui: GuiConfig,
}

/// GUI static file serving configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuiConfig {
    /// Enable GUI serving
    #[serde(default)]
    pub enabled: bool,

    /// Directory containing GUI static files (e.g., "./static")
    #[serde(default = "default_gui_static_dir")]
    pub static_dir: String,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of concurrent sessions (0 = unlimited)
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle timeout in seconds before a session expires (0 = never)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Records kept per session; the oldest are dropped first (0 = unlimited)
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

/// Upload parsing limits and inference settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Maximum upload size in bytes. 0 = no limit.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Maximum number of data rows (header excluded). 0 = no limit.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Number of leading non-empty values per column used for type inference
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,

    /// Rows returned as a preview after upload
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,

    /// Field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

/// Query execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of result rows returned. 0 = no limit.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,
}

/// Chat-completion endpoint used for NL→SQL translation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Full URL of an OpenAI-compatible chat completions endpoint
    #[serde(default = "default_translator_base_url")]
    pub base_url: String,

    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_translator_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,

    /// Request timeout in milliseconds
    #[serde(default = "default_translator_timeout_ms")]
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    8000
}
fn default_gui_static_dir() -> String {
    "./static".to_string()
}
fn default_max_sessions() -> usize {
    1000
}
fn default_idle_timeout_secs() -> u64 {
    3600 // 1 hour
}
fn default_max_history() -> usize {
    100
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024 // 10 MB
}
fn default_max_rows() -> usize {
    100_000
}
fn default_sample_rows() -> usize {
    1000
}
fn default_preview_rows() -> usize {
    20
}
fn default_delimiter() -> char {
    ','
}
fn default_max_result_rows() -> usize {
    10_000
}
fn default_translator_base_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}
fn default_translator_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_translator_timeout_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (NLSQL_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("NLSQL_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("NLSQL_").split("__"))
            .extract()
    }
}

impl SessionConfig {
    /// Idle timeout as a `Duration`, `None` when sessions never expire.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

impl TranslatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: default_http_host(),
            port: default_http_port(),
            cors_origins: Vec::new(),
            cors_allow_all: false,
            gui: GuiConfig::default(),
        }
    }
}

impl Default for GuiConfig {
    fn default() -> Self {
        GuiConfig {
            enabled: false,
            static_dir: default_gui_static_dir(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_history: default_max_history(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            max_upload_bytes: default_max_upload_bytes(),
            max_rows: default_max_rows(),
            sample_rows: default_sample_rows(),
            preview_rows: default_preview_rows(),
            delimiter: default_delimiter(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            max_result_rows: default_max_result_rows(),
        }
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        TranslatorConfig {
            base_url: default_translator_base_url(),
            api_key: None,
            model: default_translator_model(),
            temperature: 0.0,
            timeout_ms: default_translator_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_http_config() {
        let config = Config::default();
        assert_eq!(config.http.host, "127.0.0.1");
        assert_eq!(config.http.port, 8000);
        assert!(config.http.cors_origins.is_empty());
        assert!(!config.http.gui.enabled);
    }

    #[test]
    fn test_default_loader_config() {
        let loader = LoaderConfig::default();
        assert_eq!(loader.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(loader.max_rows, 100_000);
        assert_eq!(loader.preview_rows, 20);
        assert_eq!(loader.delimiter, ',');
    }

    #[test]
    fn test_default_translator_config() {
        let tr = TranslatorConfig::default();
        assert!(tr.api_key.is_none());
        assert_eq!(tr.model, "llama-3.1-8b-instant");
        assert_eq!(tr.timeout(), Duration::from_secs(30));
        assert!(tr.base_url.starts_with("https://"));
    }

    #[test]
    fn test_idle_timeout_zero_disables_expiry() {
        let session = SessionConfig {
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert!(session.idle_timeout().is_none());
        assert_eq!(
            SessionConfig::default().idle_timeout(),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[http]"));
        assert!(toml_str.contains("[loader]"));
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.http.port, 8000);
        assert_eq!(back.loader.max_rows, 100_000);
        assert_eq!(back.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.session.max_sessions, 1000);
        assert_eq!(config.executor.max_result_rows, 10_000);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config: Config = toml::from_str("[loader]\nmax_rows = 5\n").unwrap();
        assert_eq!(config.loader.max_rows, 5);
        assert_eq!(config.loader.sample_rows, 1000);
    }
}
