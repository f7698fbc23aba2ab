//! NL→SQL Translator
//!
//! Turning a question into SQL is delegated to a hosted chat-completion model.
//! The orchestrator only depends on the [`Translator`] trait, so tests plug in
//! deterministic stubs and production uses [`ChatCompletionTranslator`].
//!
//! ## Response extraction
//!
//! The model is asked for `{"sql_query": ..., "explanation": ...}`. Replies are
//! read in this order:
//! 1. a fenced ```json block, parsed as that object
//! 2. the whole reply, parsed as that object
//! 3. a fenced ```sql block
//! 4. the bare reply, if it starts with `SELECT` or `WITH`
//!
//! Anything else (including an empty reply) is a `TranslationError`.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::TranslatorConfig;
use crate::error::{NlSqlError, NlSqlResult};
use crate::relation::ColumnType;

/// Candidate SQL plus the model's own description of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub sql: String,
    pub explanation: Option<String>,
}

impl Translation {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            explanation: None,
        }
    }
}

/// Converts a question about one table into a SQL candidate.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        question: &str,
        table_name: &str,
        schema: &[(String, ColumnType)],
    ) -> NlSqlResult<Translation>;
}

/// Translator backed by an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct ChatCompletionTranslator {
    client: Client,
    config: TranslatorConfig,
}

impl ChatCompletionTranslator {
    pub fn new(config: TranslatorConfig) -> NlSqlResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| NlSqlError::internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    async fn send_request(&self, body: &ChatCompletionRequest) -> NlSqlResult<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| NlSqlError::translation("no API key configured for the translation service"))?;

        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    NlSqlError::translation(format!(
                        "request timed out after {}ms",
                        self.config.timeout_ms
                    ))
                } else {
                    NlSqlError::translation(format!("request failed: {err}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NlSqlError::translation(format!(
                "service returned HTTP {status}: {}",
                truncate_chars(&body_text, 200)
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| NlSqlError::translation(format!("malformed response: {err}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Translator for ChatCompletionTranslator {
    async fn translate(
        &self,
        question: &str,
        table_name: &str,
        schema: &[(String, ColumnType)],
    ) -> NlSqlResult<Translation> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: build_system_prompt(table_name, schema),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("Natural language question: {question}"),
                },
            ],
        };

        let content = self.send_request(&request).await?;
        let translation = extract_translation(&content)?;
        tracing::debug!(table = table_name, sql = %translation.sql, "translated");
        Ok(translation)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSql {
    #[serde(default, alias = "sql")]
    sql_query: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Render the schema the way the model sees it.
pub fn format_schema(table_name: &str, schema: &[(String, ColumnType)]) -> String {
    let mut out = format!("Table '{table_name}' has the following columns:\n");
    for (name, column_type) in schema {
        out.push_str(&format!("- {name} ({column_type})\n"));
    }
    out
}

/// System prompt embedding table name and schema.
pub fn build_system_prompt(table_name: &str, schema: &[(String, ColumnType)]) -> String {
    format!(
        "You translate questions about the SQLite table '{table_name}' into exactly one \
         valid, read-only SQLite SELECT statement, and explain briefly what it does.\n\n\
         {schema}\n\
         Only ever produce a single SELECT statement. Never modify data and never query \
         schema pragmas; the schema above is complete.\n\
         Wrap any column name containing spaces or special characters in double quotes (\").\n\
         Dates are stored as ISO text (YYYY-MM-DD).\n\n\
         Respond with a JSON object with the keys `sql_query` and `explanation`, for example:\n\
         ```json\n{{\n    \"sql_query\": \"SELECT ...\",\n    \"explanation\": \"This query ...\"\n}}\n```",
        schema = format_schema(table_name, schema)
    )
}

fn fenced_block(content: &str, lang: &str) -> Option<String> {
    static JSON_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();
    static SQL_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();

    let re = match lang {
        "json" => JSON_BLOCK.get_or_init(|| Regex::new(r"(?s)```json\s*(.*?)```").ok()),
        _ => SQL_BLOCK.get_or_init(|| Regex::new(r"(?si)```sql\s*(.*?)```").ok()),
    };
    re.as_ref()?
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Pull SQL (and an optional explanation) out of a model reply.
pub fn extract_translation(content: &str) -> NlSqlResult<Translation> {
    let content = content.trim();
    if content.is_empty() {
        return Err(NlSqlError::translation("empty completion"));
    }

    let json_candidate = fenced_block(content, "json").unwrap_or_else(|| content.to_string());
    if let Ok(generated) = serde_json::from_str::<GeneratedSql>(&json_candidate) {
        let sql = generated
            .sql_query
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NlSqlError::translation("response did not contain a SQL query"))?;
        return Ok(Translation {
            sql,
            explanation: generated.explanation.filter(|e| !e.trim().is_empty()),
        });
    }

    if let Some(sql) = fenced_block(content, "sql").filter(|s| !s.is_empty()) {
        return Ok(Translation::new(sql));
    }

    let upper = content.to_ascii_uppercase();
    if upper.starts_with("SELECT") || upper.starts_with("WITH") {
        return Ok(Translation::new(content));
    }

    Err(NlSqlError::translation(format!(
        "could not find SQL in response: {}",
        truncate_chars(content, 200)
    )))
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
