//! Query Executor
//!
//! Runs one generated SQL statement against a relation using an embedded
//! SQLite engine.
//!
//! Each call builds a fresh in-memory database, loads the relation as a named
//! table, switches the connection to `query_only`, and drops everything when
//! it returns. Generated SQL therefore never sees another session's data and
//! cannot leave anything behind.
//!
//! ## Accepted SQL
//!
//! - exactly one statement (trailing `;`, whitespace and comments are fine)
//! - read-only, as reported by the engine for the prepared statement
//! - must produce a result set

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;

use crate::config::ExecutorConfig;
use crate::error::{NlSqlError, NlSqlResult};
use crate::relation::{Column, ColumnType, Relation, Value};

/// Result of a successful execution.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub relation: Relation,
    /// More rows were available than `max_result_rows`
    pub truncated: bool,
}

/// Executes SQL against relations.
#[derive(Debug, Clone, Default)]
pub struct QueryExecutor {
    config: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Bind `relation` as `table_name` and run `sql` against it.
    pub fn execute(
        &self,
        relation: &Relation,
        table_name: &str,
        sql: &str,
    ) -> NlSqlResult<QueryOutput> {
        let statement = single_statement(sql)?;

        let mut conn = Connection::open_in_memory()
            .map_err(|e| NlSqlError::internal(format!("Failed to open engine: {e}")))?;
        bind_table(&mut conn, table_name, relation)
            .map_err(|e| NlSqlError::internal(format!("Failed to load table '{table_name}': {e}")))?;
        conn.pragma_update(None, "query_only", true)
            .map_err(|e| NlSqlError::internal(format!("Failed to lock table: {e}")))?;

        let mut stmt = conn.prepare(statement)?;
        if !stmt.readonly() {
            return Err(NlSqlError::query("only read-only queries are allowed"));
        }
        let width = stmt.column_count();
        if width == 0 {
            return Err(NlSqlError::query("statement does not return rows"));
        }
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let limit = self.config.max_result_rows;
        let mut rows: Vec<Vec<Value>> = Vec::new();
        let mut truncated = false;
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            if limit > 0 && rows.len() == limit {
                truncated = true;
                break;
            }
            let values = (0..width)
                .map(|i| row.get_ref(i).map(value_from_sql))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(values);
        }

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let column_type = rows
                    .iter()
                    .map(|r| &r[i])
                    .find(|v| !v.is_null())
                    .map_or(ColumnType::Unknown, Value::column_type);
                Column::new(name, column_type)
            })
            .collect();

        Ok(QueryOutput {
            relation: Relation::new(columns, rows)?,
            truncated,
        })
    }
}

/// Quote an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn bind_table(conn: &mut Connection, table: &str, relation: &Relation) -> rusqlite::Result<()> {
    let column_defs = relation
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} {}", quote_ident(&c.name), storage_type(relation, i)))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(
        &format!("CREATE TABLE {} ({column_defs})", quote_ident(table)),
        [],
    )?;

    let placeholders = vec!["?"; relation.column_count()].join(", ");
    let tx = conn.transaction()?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({placeholders})",
            quote_ident(table)
        ))?;
        for row in relation.rows() {
            insert.execute(rusqlite::params_from_iter(row.iter().map(value_to_sql)))?;
        }
    }
    tx.commit()
}

/// Declared column type: INTEGER for all-integer numeric columns, REAL for
/// other numeric columns, TEXT otherwise (dates are stored as ISO strings).
fn storage_type(relation: &Relation, index: usize) -> &'static str {
    match relation.columns()[index].column_type {
        ColumnType::Numeric => {
            let all_integers = relation
                .rows()
                .iter()
                .all(|r| matches!(r[index], Value::Integer(_) | Value::Null));
            if all_integers {
                "INTEGER"
            } else {
                "REAL"
            }
        }
        ColumnType::Text | ColumnType::Date | ColumnType::Unknown => "TEXT",
    }
}

fn value_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
    }
}

fn value_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Text(format!("<{} bytes>", bytes.len())),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum ScanState {
    Normal,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Return the single statement in `sql`, rejecting empty input and
/// statement lists. Semicolons inside literals, quoted identifiers and
/// comments are not separators.
pub fn single_statement(sql: &str) -> NlSqlResult<&str> {
    let mut statements: Vec<&str> = Vec::new();
    let mut state = ScanState::Normal;
    let mut start = 0;
    let mut significant = false;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match state {
            ScanState::Normal => match c {
                ';' => {
                    if significant {
                        statements.push(&sql[start..i]);
                    }
                    start = i + 1;
                    significant = false;
                }
                '-' if chars.peek().is_some_and(|&(_, n)| n == '-') => {
                    chars.next();
                    state = ScanState::LineComment;
                }
                '/' if chars.peek().is_some_and(|&(_, n)| n == '*') => {
                    chars.next();
                    state = ScanState::BlockComment;
                }
                '\'' | '"' | '`' => {
                    significant = true;
                    state = ScanState::Quoted(c);
                }
                '[' => {
                    significant = true;
                    state = ScanState::Quoted(']');
                }
                c if c.is_whitespace() => {}
                _ => significant = true,
            },
            // Doubled quotes re-enter the quoted state on the next char.
            ScanState::Quoted(close) => {
                if c == close {
                    state = ScanState::Normal;
                }
            }
            ScanState::LineComment => {
                if c == '\n' {
                    state = ScanState::Normal;
                }
            }
            ScanState::BlockComment => {
                if c == '*' && chars.peek().is_some_and(|&(_, n)| n == '/') {
                    chars.next();
                    state = ScanState::Normal;
                }
            }
        }
    }
    if significant {
        statements.push(&sql[start..]);
    }

    match statements.as_slice() {
        [] => Err(NlSqlError::query("SQL is empty")),
        [one] => Ok(one.trim()),
        many => Err(NlSqlError::query(format!(
            "multiple statements are not allowed (found {})",
            many.len()
        ))),
    }
}
