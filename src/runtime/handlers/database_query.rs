/// Database query node handler
///
/// Runs a parameterized SQL statement against the engine's SQLite data store.
/// Read statements return their rows as an array of JSON objects; write
/// statements return the affected-row count. SQL errors are configuration
/// errors (the statement won't get better on retry); pool and I/O errors are
/// transient.

use crate::runtime::error::NodeFailure;
use crate::runtime::handler::{require_str, HandlerContext, NodeHandler};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::{sqlite::SqlitePool, Column, Row};

pub struct DatabaseQueryHandler {
    pool: SqlitePool,
}

impl DatabaseQueryHandler {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn classify(e: sqlx::Error) -> NodeFailure {
    match e {
        // A malformed statement fails identically on every attempt
        sqlx::Error::Database(db) => NodeFailure::config(format!("query failed: {db}")),
        sqlx::Error::ColumnDecode { index, source } => {
            NodeFailure::config(format!("cannot decode column {index}: {source}"))
        }
        other => NodeFailure::transient(format!("database unavailable: {other}")),
    }
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &'q [Value],
) -> Result<sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>, NodeFailure> {
    for param in params {
        query = match param {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
            Value::Number(n) => query.bind(n.as_f64()),
            Value::String(s) => query.bind(s.as_str()),
            nested => {
                return Err(NodeFailure::config(format!(
                    "unsupported parameter type: {nested}"
                )))
            }
        };
    }
    Ok(query)
}

/// Decode one SQLite row into a JSON object, column by column.
/// SQLite is dynamically typed, so each value is probed as integer, real,
/// then text.
fn row_to_json(row: &sqlx::sqlite::SqliteRow) -> Value {
    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(i) {
            v.map(Value::String).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        object.insert(column.name().to_string(), value);
    }
    Value::Object(object)
}

#[async_trait]
impl NodeHandler for DatabaseQueryHandler {
    async fn execute(
        &self,
        config: &Value,
        _input: Value,
        ctx: &HandlerContext,
    ) -> Result<Value, NodeFailure> {
        let sql = require_str(config, "query")?;
        let params = match config.get("params") {
            None => Vec::new(),
            Some(Value::Array(params)) => params.clone(),
            Some(other) => {
                return Err(NodeFailure::config(format!(
                    "'params' must be an array, got {other}"
                )))
            }
        };

        tracing::debug!("🗄️ Node '{}': executing query ({} params)", ctx.node_id, params.len());

        let head = sql.trim_start().to_lowercase();
        let is_read = head.starts_with("select") || head.starts_with("with") || head.starts_with("pragma");

        if is_read {
            let query = bind_params(sqlx::query(sql), &params)?;
            let rows = query.fetch_all(&self.pool).await.map_err(classify)?;
            let rows: Vec<Value> = rows.iter().map(row_to_json).collect();
            Ok(json!({ "rows": rows, "row_count": rows.len() }))
        } else {
            let query = bind_params(sqlx::query(sql), &params)?;
            let result = query.execute(&self.pool).await.map_err(classify)?;
            Ok(json!({ "rows_affected": result.rows_affected() }))
        }
    }
}
