//! Lookup of stored prompts and database connections.
//!
//! Persistence lives outside this crate; the answer pipeline only needs to
//! read records by id.

mod memory;

pub use memory::InMemoryRepository;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{DatabaseConnection, Prompt};

/// Finds prompts by id.
#[async_trait]
pub trait PromptLookup: Send + Sync {
    /// Returns `None` when no prompt has this id.
    async fn find_prompt(&self, id: &str) -> Result<Option<Prompt>>;
}

/// Finds database connections by id.
#[async_trait]
pub trait ConnectionLookup: Send + Sync {
    /// Returns `None` when no connection has this id.
    async fn find_connection(&self, id: &str) -> Result<Option<DatabaseConnection>>;
}
