//! Dataset Loader
//!
//! Turns uploaded CSV bytes into a [`Relation`].
//!
//! ## Format
//!
//! - First row is the header with column names
//! - Every record must have as many fields as the header
//! - Fields are trimmed; empty fields become `NULL`
//!
//! ## Type inference
//!
//! Each column is typed from its first `sample_rows` non-empty values:
//! - none at all: `unknown`
//! - all numbers (integer or finite float): `numeric`
//! - all dates (`2024-01-31`, `2024/01/31`, `01/31/2024`, `31.01.2024`): `date`
//! - anything else, including mixes: `text`
//!
//! A value past the sampled prefix that does not fit the column type is kept
//! as text rather than dropped.
//!
//! ## Header normalisation
//!
//! Blank names become `column{i}` (0-based position) and repeated names get
//! `_1`, `_2`, ... suffixes, compared case-insensitively because SQL
//! identifiers are.

use std::borrow::Cow;
use std::collections::HashSet;

use chrono::NaiveDate;

use crate::config::LoaderConfig;
use crate::error::{NlSqlError, NlSqlResult};
use crate::relation::{Column, ColumnType, Relation, Value};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parses uploads under the configured limits.
#[derive(Debug, Clone, Default)]
pub struct DatasetLoader {
    config: LoaderConfig,
}

impl DatasetLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Parse `bytes` as delimited text into a relation.
    pub fn load(&self, bytes: &[u8]) -> NlSqlResult<Relation> {
        let limit = self.config.max_upload_bytes;
        if limit > 0 && bytes.len() > limit {
            return Err(NlSqlError::SizeLimitExceeded {
                resource: "upload bytes".to_string(),
                limit,
                actual: bytes.len(),
            });
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|e| NlSqlError::parse(format!("unreadable encoding (expected UTF-8): {e}")))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        if text.trim().is_empty() {
            return Err(NlSqlError::parse("upload is empty"));
        }

        let delimiter = self.delimiter()?;
        let width = csv_reader(delimiter, text.as_bytes())
            .headers()
            .map_err(csv_error)?
            .len();
        // The csv reader skips empty lines, which in a one-column file are
        // empty values.
        let text: Cow<'_, str> = if width == 1 {
            Cow::Owned(quote_blank_lines(text))
        } else {
            Cow::Borrowed(text)
        };

        let mut reader = csv_reader(delimiter, text.as_bytes());
        let header = reader.headers().map_err(csv_error)?.clone();
        if header.is_empty() {
            return Err(NlSqlError::parse("missing header row"));
        }
        let names = normalize_headers(header.iter());

        let max_rows = self.config.max_rows;
        let mut raw_rows: Vec<csv::StringRecord> = Vec::new();
        let mut records = reader.records();
        while let Some(record) = records.next() {
            let record = record.map_err(csv_error)?;
            if max_rows > 0 && raw_rows.len() == max_rows {
                let actual = max_rows + 1 + records.by_ref().count();
                return Err(NlSqlError::SizeLimitExceeded {
                    resource: "rows".to_string(),
                    limit: max_rows,
                    actual,
                });
            }
            raw_rows.push(record);
        }

        let sample = self.config.sample_rows.max(1);
        let columns: Vec<Column> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let values = raw_rows
                    .iter()
                    .filter_map(|r| r.get(i))
                    .filter(|v| !v.is_empty())
                    .take(sample);
                Column::new(name, infer_column_type(values))
            })
            .collect();

        let rows = raw_rows
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .zip(record.iter())
                    .map(|(col, field)| convert_field(field, col.column_type))
                    .collect()
            })
            .collect();

        Relation::new(columns, rows)
    }

    fn delimiter(&self) -> NlSqlResult<u8> {
        let c = self.config.delimiter;
        if c.is_ascii() {
            Ok(c as u8)
        } else {
            Err(NlSqlError::internal(format!(
                "Delimiter must be an ASCII character, got '{c}'"
            )))
        }
    }
}

fn csv_reader(delimiter: u8, bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(bytes)
}

/// Rewrite every empty line after the header as an empty quoted field.
///
/// Lines inside a quoted field are left alone. Leading empty lines stay
/// empty so the header is still the first record.
pub fn quote_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut seen_header = false;
    let mut in_quotes = false;
    for line in text.lines() {
        if line.is_empty() && seen_header && !in_quotes {
            out.push_str("\"\"");
        } else {
            out.push_str(line);
        }
        out.push('\n');
        if !line.is_empty() {
            seen_header = true;
        }
        if line.matches('"').count() % 2 == 1 {
            in_quotes = !in_quotes;
        }
    }
    out
}

fn csv_error(e: csv::Error) -> NlSqlError {
    NlSqlError::parse(e.to_string())
}

/// Make header names non-empty and unique (case-insensitively).
pub fn normalize_headers<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(i, name)| {
            let base = if name.trim().is_empty() {
                format!("column{i}")
            } else {
                name.trim().to_string()
            };
            let mut candidate = base.clone();
            let mut n = 0;
            while used.contains(&candidate.to_lowercase()) {
                n += 1;
                candidate = format!("{base}_{n}");
            }
            used.insert(candidate.to_lowercase());
            candidate
        })
        .collect()
}

/// Decide a column's type from sampled non-empty values.
pub fn infer_column_type<'a>(samples: impl IntoIterator<Item = &'a str>) -> ColumnType {
    let mut seen = false;
    let mut numeric = true;
    let mut date = true;

    for value in samples {
        seen = true;
        numeric = numeric && parse_number(value).is_some();
        date = date && parse_date(value).is_some();
        if !numeric && !date {
            return ColumnType::Text;
        }
    }

    match (seen, numeric, date) {
        (false, _, _) => ColumnType::Unknown,
        (true, true, false) => ColumnType::Numeric,
        (true, false, true) => ColumnType::Date,
        // Ambiguous or mixed
        _ => ColumnType::Text,
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn convert_field(field: &str, column_type: ColumnType) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    let typed = match column_type {
        ColumnType::Numeric => parse_number(field),
        ColumnType::Date => parse_date(field).map(Value::Date),
        ColumnType::Text | ColumnType::Unknown => None,
    };
    typed.unwrap_or_else(|| Value::text(field))
}
