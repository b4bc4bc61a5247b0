//! Query safety checks.
//!
//! [`SqlGuard`] is the gate every generated query passes before it reaches a
//! database: it strips comments, refuses stacked statements and denied
//! keywords, then classifies the parsed statement and lets only read-only
//! queries through.

mod guard;
mod parser;

pub use guard::{SanitizedSql, SqlGuard};
pub use parser::SqlClassifier;

use crate::db::DatabaseBackend;
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use std::fmt;

/// Safety level classification for SQL queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SafetyLevel {
    /// Read-only queries (SELECT, plain EXPLAIN, SHOW).
    Safe,
    /// Queries that write or lock data (INSERT, UPDATE, SELECT INTO, FOR UPDATE).
    Mutating,
    /// Data loss or schema changes (DELETE, DROP, TRUNCATE, ALTER).
    Destructive,
}

impl SafetyLevel {
    /// Returns true if a query at this level may be executed.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Safe)
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Mutating => write!(f, "Mutating"),
            Self::Destructive => write!(f, "Destructive"),
        }
    }
}

/// The type of SQL statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    SelectInto,
    Locking,
    Insert,
    Update,
    Delete,
    Drop,
    Truncate,
    Alter,
    Create,
    Grant,
    Revoke,
    Explain,
    Show,
    Merge,
    /// Multiple statements detected; contains the most dangerous type.
    Multiple(Box<StatementType>),
    /// Statement type could not be determined.
    Unknown,
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::SelectInto => write!(f, "SELECT INTO"),
            Self::Locking => write!(f, "SELECT ... FOR UPDATE"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Drop => write!(f, "DROP"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Alter => write!(f, "ALTER"),
            Self::Create => write!(f, "CREATE"),
            Self::Grant => write!(f, "GRANT"),
            Self::Revoke => write!(f, "REVOKE"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Show => write!(f, "SHOW"),
            Self::Merge => write!(f, "MERGE"),
            Self::Multiple(inner) => write!(f, "Multiple ({})", inner),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of classifying a SQL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    /// The determined safety level.
    pub level: SafetyLevel,
    /// The type of statement(s) detected.
    pub statement_type: StatementType,
    /// Why the query was not considered safe, for logs only.
    pub reason: Option<String>,
}

impl ClassificationResult {
    /// Creates a new classification result.
    pub fn new(level: SafetyLevel, statement_type: StatementType) -> Self {
        Self {
            level,
            statement_type,
            reason: None,
        }
    }

    /// Creates a classification result with a reason.
    pub fn with_reason(
        level: SafetyLevel,
        statement_type: StatementType,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            level,
            statement_type,
            reason: Some(reason.into()),
        }
    }

    /// Returns true if the query may be executed.
    pub fn is_read_only(&self) -> bool {
        self.level.is_read_only()
    }
}

/// Returns the sqlparser dialect matching a backend.
pub(crate) fn dialect_for(backend: DatabaseBackend) -> Box<dyn Dialect> {
    match backend {
        DatabaseBackend::Postgres => Box::new(PostgreSqlDialect {}),
        DatabaseBackend::Sqlite => Box::new(SQLiteDialect {}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_level_display() {
        assert_eq!(SafetyLevel::Safe.to_string(), "Safe");
        assert_eq!(SafetyLevel::Mutating.to_string(), "Mutating");
        assert_eq!(SafetyLevel::Destructive.to_string(), "Destructive");
    }

    #[test]
    fn test_only_safe_is_read_only() {
        assert!(SafetyLevel::Safe.is_read_only());
        assert!(!SafetyLevel::Mutating.is_read_only());
        assert!(!SafetyLevel::Destructive.is_read_only());
    }

    #[test]
    fn test_levels_are_ordered_by_danger() {
        assert!(SafetyLevel::Safe < SafetyLevel::Mutating);
        assert!(SafetyLevel::Mutating < SafetyLevel::Destructive);
    }

    #[test]
    fn test_statement_type_display() {
        assert_eq!(StatementType::Select.to_string(), "SELECT");
        assert_eq!(StatementType::SelectInto.to_string(), "SELECT INTO");
        assert_eq!(
            StatementType::Multiple(Box::new(StatementType::Delete)).to_string(),
            "Multiple (DELETE)"
        );
    }

    #[test]
    fn test_classification_result_with_reason() {
        let result = ClassificationResult::with_reason(
            SafetyLevel::Destructive,
            StatementType::Delete,
            "deletes rows",
        );
        assert_eq!(result.reason.as_deref(), Some("deletes rows"));
        assert!(!result.is_read_only());
    }
}
