//! SQLite database client implementation.
//!
//! SQLite reports a storage class per value rather than a fixed column type,
//! so conversion looks at both the declared column type and the runtime value.

use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, ConnectOptions, DatabaseBackend, DatabaseClient, QueryResult, Row, Value};
use crate::error::{NarrateError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
    options: ConnectOptions,
}

impl SqliteClient {
    /// Creates a new SqliteClient from an existing connection pool.
    ///
    /// With `read_only` set, every connection that runs a query is switched
    /// to `query_only` mode, so seed the pool before the first query.
    pub fn from_pool(pool: SqlitePool, options: ConnectOptions) -> Self {
        Self { pool, options }
    }

    /// Opens a connection pool for the given configuration.
    pub async fn connect(config: &ConnectionConfig, options: ConnectOptions) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let mut connect_options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| NarrateError::config(format!("Invalid SQLite path: {e}")))?
            .busy_timeout(Duration::from_secs(5));

        if options.read_only {
            connect_options = connect_options.read_only(true);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                NarrateError::connection(format!(
                    "Cannot open {}: {e}",
                    config.display_string()
                ))
            })?;

        debug!("Opened {}", config.display_string());
        Ok(Self { pool, options })
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        let start = Instant::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| NarrateError::connection(format!("Failed to acquire connection: {e}")))?;

        if self.options.read_only {
            sqlx::query("PRAGMA query_only = ON")
                .execute(&mut *tx)
                .await
                .map_err(map_query_error)?;
        }

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

fn column_info(row: &SqliteRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

fn convert_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single value using its declared type as a hint and its
/// storage class as the source of truth.
fn convert_value(row: &SqliteRow, index: usize, declared: &str) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match (declared.to_uppercase().as_str(), storage.as_str()) {
        ("BOOLEAN", "INTEGER") => row
            .try_get::<i64, _>(index)
            .map(|v| Value::Bool(v != 0))
            .unwrap_or(Value::Null),
        (_, "INTEGER") => row
            .try_get::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        (_, "REAL") => row
            .try_get::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        (_, "BLOB") => row
            .try_get::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        (declared, _) => match row.try_get::<String, _>(index) {
            Ok(text) => parse_declared_text(declared, text),
            Err(e) => {
                warn!("Failed to decode column {index}: {e}");
                Value::String(format!("<{}>", storage.to_lowercase()))
            }
        },
    }
}

/// Interprets text stored in a column declared as a date/time type.
fn parse_declared_text(declared: &str, text: String) -> Value {
    let parsed = match declared {
        "DATE" => NaiveDate::parse_from_str(&text, "%Y-%m-%d").ok().map(Value::Date),
        "TIME" => NaiveTime::parse_from_str(&text, "%H:%M:%S%.f")
            .ok()
            .map(Value::Time),
        "DATETIME" | "TIMESTAMP" => NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
            .map(Value::DateTime),
        _ => None,
    };
    parsed.unwrap_or(Value::String(text))
}

fn map_query_error(error: sqlx::Error) -> NarrateError {
    if let Some(db_error) = error.as_database_error() {
        // SQLITE_READONLY and friends: a write slipped past the guard
        let message = db_error.message().to_lowercase();
        if message.contains("readonly") || message.contains("read-only") {
            return NarrateError::sql_injection();
        }
        return NarrateError::query(format!("ERROR: {}", db_error.message()));
    }

    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            NarrateError::connection(error.to_string())
        }
        other => NarrateError::query(other.to_string()),
    }
}
