//! Mock database client for testing.
//!
//! Provides an in-memory database implementation that returns a canned result
//! and records every statement it is asked to run.

use super::{ColumnInfo, DatabaseBackend, DatabaseClient, QueryResult, Row, Value};
use crate::error::{NarrateError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock database client that returns predefined results.
///
/// Clones share the recorded statements and the closed flag, so a test can
/// keep one handle while the pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct MockDatabaseClient {
    result: Option<QueryResult>,
    failure: Option<String>,
    delay: Option<Duration>,
    executed: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with the default canned result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the given columns and rows for every query.
    pub fn with_result(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            result: Some(QueryResult::with_data(columns, rows)),
            ..Self::default()
        }
    }

    /// Fails every query with a query error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Sleeps for `delay` before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the statements executed so far.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|sqls| sqls.clone())
            .unwrap_or_default()
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn default_result(sql: &str) -> QueryResult {
        QueryResult::with_data(
            vec![ColumnInfo::new("result", "text")],
            vec![vec![Value::String(format!("Mock result for: {}", sql))]],
        )
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn execute_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(NarrateError::query(message.clone()));
        }

        let result = match &self.result {
            Some(result) => result.clone(),
            None => Self::default_result(sql),
        };

        Ok(result
            .with_execution_time(Duration::from_millis(1))
            .truncated(max_rows))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
