//! Error types for db-narrate.
//!
//! Defines the main error enum used throughout the answer pipeline.

use thiserror::Error;

/// User-safe message returned for every rejected query.
///
/// The offending fragment is never echoed back.
pub const SQL_INJECTION_MESSAGE: &str = "Sensitive SQL keyword detected in the query.";

/// Main error type for db-narrate operations.
#[derive(Error, Debug)]
pub enum NarrateError {
    /// The query contained a disallowed statement or keyword.
    #[error("SQL injection detected: {0}")]
    SqlInjection(String),

    /// A referenced prompt, connection, or SQL generation does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query or model call exceeded its time budget.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Query execution errors (syntax errors, permission denied, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// LLM API errors (rate limits, auth, malformed responses, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (invalid config file, bad template, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, malformed result sets, bugs).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NarrateError {
    /// Creates the SQL injection error with the fixed user-safe message.
    pub fn sql_injection() -> Self {
        Self::SqlInjection(SQL_INJECTION_MESSAGE.to_string())
    }

    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a timeout error with the given message.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::SqlInjection(_) => "SQL Injection Detected",
            Self::NotFound(_) => "Not Found",
            Self::Connection(_) => "Connection Error",
            Self::Timeout(_) => "Timeout",
            Self::Query(_) => "Query Error",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using NarrateError.
pub type Result<T> = std::result::Result<T, NarrateError>;
