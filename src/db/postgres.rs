//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, ConnectOptions, DatabaseBackend, DatabaseClient, QueryResult, Row, Value};
use crate::error::{NarrateError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, PgValueFormat, PgValueRef};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// SQLSTATE raised when a statement is cancelled by `statement_timeout`.
const QUERY_CANCELED: &str = "57014";

/// SQLSTATE raised when a read-only transaction attempts a write.
const READ_ONLY_SQL_TRANSACTION: &str = "25006";

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
    options: ConnectOptions,
}

impl PostgresClient {
    /// Creates a new PostgresClient from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(pool: PgPool, options: ConnectOptions) -> Self {
        Self { pool, options }
    }

    /// Opens a connection pool for the given configuration.
    ///
    /// Connection failures are not retried; retry policy belongs to the caller.
    pub async fn connect(config: &ConnectionConfig, options: ConnectOptions) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&conn_str)
            .await
            .map_err(|e| map_connection_error(e, config))?;

        debug!("Connected to {}", config.display_string());
        Ok(Self { pool, options })
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        let start = Instant::now();

        // Dropping the transaction on any early return rolls it back and
        // hands the connection back to the pool.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| NarrateError::connection(format!("Failed to acquire connection: {e}")))?;

        if self.options.read_only {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(map_query_error)?;
        }

        let timeout_ms = self.options.statement_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
            .execute(&mut *tx)
            .await
            .map_err(map_query_error)?;

        let mut columns: Option<Vec<ColumnInfo>> = None;
        let mut rows: Vec<Row> = Vec::new();
        let mut was_truncated = false;

        {
            let mut stream = sqlx::query(sql).fetch(&mut *tx);
            while let Some(row) = stream.try_next().await.map_err(map_query_error)? {
                if rows.len() == max_rows {
                    was_truncated = true;
                    break;
                }
                if columns.is_none() {
                    columns = Some(column_info(&row));
                }
                rows.push(convert_row(&row));
            }
        }

        let columns = match columns {
            Some(columns) => columns,
            // Empty result: ask the server for the statement's shape instead
            None => match (&mut *tx).describe(sql).await {
                Ok(describe) => describe
                    .columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect(),
                Err(_) => Vec::new(),
            },
        };

        if let Err(e) = tx.rollback().await {
            warn!("Failed to roll back read-only transaction: {e}");
        }

        if was_truncated {
            warn!("Query returned more than {} rows, truncating", max_rows);
        }

        let row_count = rows.len();
        Ok(QueryResult {
            columns,
            rows,
            execution_time: start.elapsed(),
            row_count,
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn column_info(row: &PgRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => decode(row, index, Value::Bool),

        "INT2" | "SMALLINT" => decode(row, index, |v: i16| Value::Int(v as i64)),

        "INT4" | "INT" | "INTEGER" => decode(row, index, |v: i32| Value::Int(v as i64)),

        "INT8" | "BIGINT" => decode(row, index, Value::Int),

        "FLOAT4" | "REAL" => decode(row, index, |v: f32| Value::Float(v as f64)),

        "FLOAT8" | "DOUBLE PRECISION" => decode(row, index, Value::Float),

        "NUMERIC" | "DECIMAL" => decode_numeric(row, index),

        "DATE" => decode(row, index, Value::Date),

        "TIME" => decode(row, index, Value::Time),

        "TIMESTAMP" => decode(row, index, Value::DateTime),

        "TIMESTAMPTZ" => decode(row, index, Value::DateTimeTz),

        "JSON" | "JSONB" => decode(row, index, Value::Json),

        "BYTEA" => decode(row, index, Value::Bytes),

        "UUID" => decode(row, index, |v: Uuid| Value::String(v.to_string())),

        "INTERVAL" => decode(row, index, |v: PgInterval| Value::String(format_interval(&v))),

        "INET" | "CIDR" => decode(row, index, |v: IpNetwork| Value::String(v.to_string())),

        name if name.ends_with("[]") => decode_array(row, index, type_name),

        _ => decode_text(row, index, type_name),
    }
}

/// Numerics beyond `Decimal`'s range go through `BigDecimal`; NaN and the
/// infinities become their PostgreSQL spelling.
fn decode_numeric(row: &PgRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Decimal, _>(index) {
        return Value::Decimal(v);
    }
    if let Ok(v) = row.try_get::<BigDecimal, _>(index) {
        let text = v.to_string();
        return match text.parse::<f64>() {
            Ok(f) if f.is_finite() => Value::Float(f),
            _ => Value::String(text),
        };
    }
    match row.try_get_raw(index).ok().and_then(special_numeric) {
        Some(text) => Value::String(text.to_string()),
        None => {
            warn!("Failed to decode numeric column {index}");
            Value::String("<undecodable>".to_string())
        }
    }
}

/// Recognizes the non-finite NUMERIC values by their sign word.
fn special_numeric(raw: PgValueRef<'_>) -> Option<&'static str> {
    match raw.format() {
        PgValueFormat::Text => match raw.as_str().ok()? {
            "NaN" => Some("NaN"),
            "Infinity" => Some("Infinity"),
            "-Infinity" => Some("-Infinity"),
            _ => None,
        },
        PgValueFormat::Binary => {
            let bytes = raw.as_bytes().ok()?;
            match u16::from_be_bytes([*bytes.get(4)?, *bytes.get(5)?]) {
                0xC000 => Some("NaN"),
                0xD000 => Some("Infinity"),
                0xF000 => Some("-Infinity"),
                _ => None,
            }
        }
    }
}

fn decode_array(row: &PgRow, index: usize, type_name: &str) -> Value {
    fn items<T: Into<serde_json::Value>>(values: Vec<Option<T>>) -> Value {
        Value::Json(serde_json::Value::Array(
            values
                .into_iter()
                .map(|v| v.map_or(serde_json::Value::Null, Into::into))
                .collect(),
        ))
    }

    if let Ok(v) = row.try_get::<Vec<Option<String>>, _>(index) {
        return items(v);
    }
    if let Ok(v) = row.try_get::<Vec<Option<i64>>, _>(index) {
        return items(v);
    }
    if let Ok(v) = row.try_get::<Vec<Option<i32>>, _>(index) {
        return items(v);
    }
    if let Ok(v) = row.try_get::<Vec<Option<i16>>, _>(index) {
        return items(v);
    }
    if let Ok(v) = row.try_get::<Vec<Option<f64>>, _>(index) {
        return items(v);
    }
    if let Ok(v) = row.try_get::<Vec<Option<bool>>, _>(index) {
        return items(v);
    }
    if let Ok(v) = row.try_get::<Vec<Option<Decimal>>, _>(index) {
        return items(v.into_iter().map(|d| d.map(|d| d.to_string())).collect());
    }
    decode_text(row, index, type_name)
}

/// Text-like and text-encoded types (enums, domains over text, citext).
fn decode_text(row: &PgRow, index: usize, type_name: &str) -> Value {
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::String(v);
    }

    let unchecked = row
        .try_get_raw(index)
        .ok()
        .and_then(|raw| <String as sqlx::Decode<sqlx::Postgres>>::decode(raw).ok())
        .filter(|text| !text.chars().any(|c| c.is_control() && !c.is_whitespace()));

    unchecked.map(Value::String).unwrap_or_else(|| {
        warn!("No text form for column {index} of type {type_name}");
        Value::String(format!("<{}>", type_name.to_lowercase()))
    })
}

/// Renders an interval the way PostgreSQL prints it, e.g. `1 year 2 mons 3 days 04:05:06`.
fn format_interval(interval: &PgInterval) -> String {
    fn unit(n: i32, singular: &str) -> String {
        if n.abs() == 1 {
            format!("{n} {singular}")
        } else {
            format!("{n} {singular}s")
        }
    }

    let mut parts = Vec::new();
    let (years, months) = (interval.months / 12, interval.months % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "mon"));
    }
    if interval.days != 0 {
        parts.push(unit(interval.days, "day"));
    }

    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let micros = interval.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let fraction = micros % 1_000_000;
        if fraction != 0 {
            clock.push_str(format!(".{fraction:06}").trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

/// Decodes a non-null column, falling back to a type placeholder on failure.
fn decode<'r, T, F>(row: &'r PgRow, index: usize, wrap: F) -> Value
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    F: FnOnce(T) -> Value,
{
    match row.try_get::<T, _>(index) {
        Ok(v) => wrap(v),
        Err(e) => {
            warn!("Failed to decode column {index}: {e}");
            Value::String("<undecodable>".to_string())
        }
    }
}

/// Maps query-time sqlx errors onto the error taxonomy.
fn map_query_error(error: sqlx::Error) -> NarrateError {
    if let Some(db_error) = error.as_database_error() {
        match db_error.code().as_deref() {
            Some(QUERY_CANCELED) => {
                return NarrateError::timeout("Query exceeded the statement timeout")
            }
            Some(READ_ONLY_SQL_TRANSACTION) => return NarrateError::sql_injection(),
            _ => {}
        }
    }

    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            NarrateError::connection(error.to_string())
        }
        other => NarrateError::query(format_query_error(other)),
    }
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> NarrateError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        NarrateError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        NarrateError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        NarrateError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        NarrateError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        NarrateError::connection(error.to_string())
    }
}

/// Formats a query error with hints if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
