//! Ad-hoc SQL for the admin panel.
//!
//! Statements run on a connection switched to `PRAGMA query_only`, so the
//! query box can inspect the data but never change it, even when the input
//! contains its own `COMMIT`.

use serde::Serialize;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Executor, Row, SqlitePool, Statement, TypeInfo, ValueRef};

use crate::error::AppError;

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub async fn run_readonly_query(pool: &SqlitePool, sql: &str) -> Result<QueryResult, AppError> {
    if sql.to_ascii_lowercase().contains("query_only") {
        return Err(AppError::InvalidInput(
            "the query_only pragma cannot be changed from the query box".to_string(),
        ));
    }

    let mut conn = pool.acquire().await?;
    sqlx::query("PRAGMA query_only = ON").execute(&mut *conn).await?;

    let outcome = fetch(&mut conn, sql).await;

    // Input such as `BEGIN; SELECT 1` leaves a transaction open on the pooled
    // connection. The rollback fails harmlessly when none is open.
    let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
    sqlx::query("PRAGMA query_only = OFF").execute(&mut *conn).await?;

    outcome
}

async fn fetch(conn: &mut SqliteConnection, sql: &str) -> Result<QueryResult, AppError> {
    let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;

    let columns = match rows.first() {
        Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        // Nothing came back, so read the names off the prepared statement.
        None => match (&mut *conn).prepare(sql).await {
            Ok(statement) => statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            Err(_) => Vec::new(),
        },
    };

    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| cell_to_json(row, i)).collect())
        .collect();

    Ok(QueryResult { columns, rows })
}

fn cell_to_json(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    row.try_get::<i64, _>(index)
        .map(|v| json!(v))
        .or_else(|_| row.try_get::<f64, _>(index).map(|v| json!(v)))
        .or_else(|_| row.try_get::<String, _>(index).map(Value::String))
        .or_else(|_| row.try_get::<Vec<u8>, _>(index).map(|b| Value::String(blob_literal(&b))))
        .unwrap_or_else(|_| Value::String(format!("<{}>", type_name)))
}

/// BLOBs are shown as SQLite hex literals, e.g. `x'cafe'`.
fn blob_literal(bytes: &[u8]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("x'{}'", hex)
}

/// Renders a cell the way it appears in CSV exports and HTML tables.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
