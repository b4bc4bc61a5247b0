//! Records exchanged with the answer pipeline.
//!
//! A [`SqlGeneration`] comes in, a [`NlGeneration`] goes out. [`Prompt`] and
//! [`DatabaseConnection`] are looked up by id along the way.

use crate::config::ConnectionConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A natural-language question registered against a database connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub text: String,
    pub db_connection_id: String,
}

/// A stored database connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConnection {
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub alias: Option<String>,
    /// Where and how to connect.
    pub config: ConnectionConfig,
    /// API key for the language model provider used with this connection.
    #[serde(default)]
    pub llm_api_key: Option<String>,
}

impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("config", &self.config)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Validation status of a generated SQL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlGenerationStatus {
    Valid,
    Invalid,
    /// Any status this crate does not act on, kept verbatim.
    Other(String),
}

impl SqlGenerationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Other(s) => s,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

impl From<&str> for SqlGenerationStatus {
    fn from(s: &str) -> Self {
        match s {
            "VALID" => Self::Valid,
            "INVALID" => Self::Invalid,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SqlGenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SqlGenerationStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SqlGenerationStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// A SQL query produced for a prompt, with its validation status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlGeneration {
    pub id: String,
    pub prompt_id: String,
    pub sql: String,
    pub status: SqlGenerationStatus,
}

/// Which model produced an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmIdentity {
    pub llm_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl LlmIdentity {
    pub fn new(llm_name: impl Into<String>) -> Self {
        Self {
            llm_name: llm_name.into(),
            api_base: None,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }
}

/// A natural-language answer for a SQL generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlGeneration {
    pub sql_generation_id: String,
    /// Absent when no model was consulted.
    pub llm_config: Option<LlmIdentity>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
