//! In-memory record store, used by the CLI and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{ConnectionLookup, PromptLookup};
use crate::error::{NarrateError, Result};
use crate::model::{DatabaseConnection, Prompt};

/// Prompts and connections held in memory. Clones share the same maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    prompts: Arc<RwLock<HashMap<String, Prompt>>>,
    connections: Arc<RwLock<HashMap<String, DatabaseConnection>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `prompt`, replacing any prompt with the same id.
    pub fn insert_prompt(&self, prompt: Prompt) -> Result<()> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| NarrateError::internal("Prompt store lock poisoned"))?;
        prompts.insert(prompt.id.clone(), prompt);
        Ok(())
    }

    /// Stores `connection`, replacing any connection with the same id.
    pub fn insert_connection(&self, connection: DatabaseConnection) -> Result<()> {
        let mut connections = self
            .connections
            .write()
            .map_err(|_| NarrateError::internal("Connection store lock poisoned"))?;
        connections.insert(connection.id.clone(), connection);
        Ok(())
    }
}

#[async_trait]
impl PromptLookup for InMemoryRepository {
    async fn find_prompt(&self, id: &str) -> Result<Option<Prompt>> {
        let prompts = self
            .prompts
            .read()
            .map_err(|_| NarrateError::internal("Prompt store lock poisoned"))?;
        Ok(prompts.get(id).cloned())
    }
}

#[async_trait]
impl ConnectionLookup for InMemoryRepository {
    async fn find_connection(&self, id: &str) -> Result<Option<DatabaseConnection>> {
        let connections = self
            .connections
            .read()
            .map_err(|_| NarrateError::internal("Connection store lock poisoned"))?;
        Ok(connections.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = InMemoryRepository::new();
        repo.insert_prompt(Prompt {
            id: "p1".to_string(),
            text: "How many orders?".to_string(),
            db_connection_id: "c1".to_string(),
        })
        .unwrap();
        repo.insert_connection(DatabaseConnection {
            id: "c1".to_string(),
            alias: None,
            config: ConnectionConfig::default(),
            llm_api_key: None,
        })
        .unwrap();

        let prompt = repo.find_prompt("p1").await.unwrap().unwrap();
        assert_eq!(prompt.db_connection_id, "c1");
        assert!(repo.find_connection("c1").await.unwrap().is_some());
    }

    #[test]
    fn test_missing_ids_return_none() {
        let repo = InMemoryRepository::new();
        assert!(tokio_test::block_on(repo.find_prompt("nope")).unwrap().is_none());
        assert!(tokio_test::block_on(repo.find_connection("nope"))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let repo = InMemoryRepository::new();
        let handle = repo.clone();
        repo.insert_prompt(Prompt {
            id: "p1".to_string(),
            text: "q".to_string(),
            db_connection_id: "c1".to_string(),
        })
        .unwrap();

        assert!(handle.find_prompt("p1").await.unwrap().is_some());
    }
}
