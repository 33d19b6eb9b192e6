//! Raw SQL query endpoint over a local SQLite file.
//!
//! Runs independently of the chat pipeline. Callers authenticate with the
//! single configured user/password pair; the database is opened read-only.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use crate::config::SqlEndpointConfig;
use crate::models::SqlQueryRequest;

type SqlResponse = (StatusCode, Json<Value>);

pub fn router(config: SqlEndpointConfig) -> Router {
    Router::new()
        .route("/sqlite-query", post(sqlite_query))
        .with_state(Arc::new(config))
}

/// POST /sqlite-query - execute `query` and return every row as a JSON array.
pub async fn sqlite_query(
    State(config): State<Arc<SqlEndpointConfig>>,
    payload: Result<Json<SqlQueryRequest>, JsonRejection>,
) -> Result<Json<Vec<Vec<Value>>>, SqlResponse> {
    // Unreadable bodies fail like any other query error.
    let Json(req) = payload.map_err(|e| {
        tracing::warn!("Rejected SQL request body: {e}");
        internal_error(&e.body_text())
    })?;

    if !credentials_match(&config, req.user.as_deref(), req.password.as_deref()) {
        tracing::warn!("Rejected SQL query: invalid credentials");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid credentials" })),
        ));
    }

    let Some(query) = req.query.filter(|q| !q.trim().is_empty()) else {
        return Err(internal_error("Query is required"));
    };

    let db_path = config.db_path.clone();
    let rows = tokio::task::spawn_blocking(move || run_query(&db_path, &query))
        .await
        .map_err(|e| internal_error(&e.to_string()))?
        .map_err(|e| {
            tracing::warn!("SQL query failed: {e}");
            internal_error(&e.to_string())
        })?;

    tracing::info!("SQL query returned {} rows", rows.len());
    Ok(Json(rows))
}

fn internal_error(message: &str) -> SqlResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

/// Exact match against the configured pair; a missing field never matches.
pub fn credentials_match(
    config: &SqlEndpointConfig,
    user: Option<&str>,
    password: Option<&str>,
) -> bool {
    matches!((user, password), (Some(u), Some(p)) if u == config.user && p == config.password)
}

fn run_query(db_path: &Path, sql: &str) -> rusqlite::Result<Vec<Vec<Value>>> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut stmt = conn.prepare(sql)?;
    let col_count = stmt.column_count();

    let rows = stmt.query_map([], |row| {
        (0..col_count)
            .map(|i| row.get::<_, SqlValue>(i).map(to_json))
            .collect::<rusqlite::Result<Vec<Value>>>()
    })?;
    rows.collect()
}

fn to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}
