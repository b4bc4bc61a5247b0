//! Turns a stored connection record into a live execution handle.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::db::{self, ConnectOptions, DatabaseClient, MockDatabaseClient};
use crate::error::Result;
use crate::model::DatabaseConnection;

/// Resolves database connection records to execution handles.
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    /// Opens a handle for `connection`. With `read_only`, the database
    /// itself refuses writes on that handle.
    async fn resolve(
        &self,
        connection: &DatabaseConnection,
        read_only: bool,
    ) -> Result<Box<dyn DatabaseClient>>;
}

/// Opens sqlx-backed handles for PostgreSQL and SQLite.
#[derive(Debug, Clone, Copy)]
pub struct SqlxConnectionResolver {
    statement_timeout: Duration,
}

impl SqlxConnectionResolver {
    pub fn new(statement_timeout: Duration) -> Self {
        Self { statement_timeout }
    }
}

impl Default for SqlxConnectionResolver {
    fn default() -> Self {
        Self::new(ConnectOptions::default().statement_timeout)
    }
}

#[async_trait]
impl ConnectionResolver for SqlxConnectionResolver {
    async fn resolve(
        &self,
        connection: &DatabaseConnection,
        read_only: bool,
    ) -> Result<Box<dyn DatabaseClient>> {
        let mut config = connection.config.clone();
        config.apply_env_defaults();

        debug!(
            connection_id = %connection.id,
            database = %config.display_string(),
            read_only,
            "Resolving database connection"
        );

        db::connect(
            &config,
            ConnectOptions {
                read_only,
                statement_timeout: self.statement_timeout,
            },
        )
        .await
    }
}

/// Resolver that hands out clones of one mock database.
#[derive(Debug, Clone, Default)]
pub struct MockConnectionResolver {
    db: MockDatabaseClient,
    resolved: Arc<AtomicUsize>,
}

impl MockConnectionResolver {
    pub fn new(db: MockDatabaseClient) -> Self {
        Self {
            db,
            resolved: Arc::default(),
        }
    }

    /// The shared database, for inspecting executed statements.
    pub fn db(&self) -> &MockDatabaseClient {
        &self.db
    }

    /// How many handles were handed out.
    pub fn resolve_count(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionResolver for MockConnectionResolver {
    async fn resolve(
        &self,
        _connection: &DatabaseConnection,
        _read_only: bool,
    ) -> Result<Box<dyn DatabaseClient>> {
        self.resolved.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.db.clone()))
    }
}
