//! Guarded, bounded query execution.
//!
//! Provides isolated query execution that can be tested independently
//! of the answer pipeline.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::db::{DatabaseClient, QueryResult};
use crate::error::{NarrateError, Result};
use crate::safety::{SanitizedSql, SqlGuard};

/// Default number of rows fetched for an answer.
pub const DEFAULT_TOP_K: usize = 100;

/// Runs generated SQL against a database handle after it passes the guard.
pub struct QueryExecutor<'a> {
    db: &'a dyn DatabaseClient,
    guard: SqlGuard,
    timeout: Duration,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor for `db`, guarding with the handle's dialect.
    pub fn new(db: &'a dyn DatabaseClient, timeout: Duration) -> Self {
        Self {
            db,
            guard: SqlGuard::new(db.backend()),
            timeout,
        }
    }

    /// Sanitizes `sql` and executes it, returning at most `top_k` rows.
    ///
    /// Rejected queries never reach the database. Errors are not retried.
    pub async fn execute(&self, sql: &str, top_k: usize) -> Result<QueryOutcome> {
        if top_k == 0 {
            return Err(NarrateError::config("top_k must be at least 1"));
        }

        let sanitized = self.guard.sanitize(sql)?;

        let start = Instant::now();
        let result = tokio::time::timeout(
            self.timeout,
            self.db.execute_query(sanitized.as_str(), top_k),
        )
        .await
        .map_err(|_| {
            NarrateError::timeout(format!(
                "Query did not finish within {}s",
                self.timeout.as_secs_f64()
            ))
        })??;
        let execution_time = start.elapsed();

        info!(
            rows = result.row_count,
            truncated = result.was_truncated,
            elapsed_ms = execution_time.as_millis() as u64,
            "Query executed"
        );
        debug!("Executed SQL: {}", sanitized.as_str());

        Ok(QueryOutcome {
            result,
            sql: sanitized,
            execution_time,
        })
    }
}

/// Successful query execution outcome.
#[derive(Debug)]
pub struct QueryOutcome {
    /// The query result, already bounded to `top_k` rows.
    pub result: QueryResult,
    /// The statement that was actually sent.
    pub sql: SanitizedSql,
    /// Wall-clock time including the round trip.
    pub execution_time: Duration,
}
