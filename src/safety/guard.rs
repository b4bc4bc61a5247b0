//! Pre-execution gate for generated SQL.
//!
//! The guard works on tokens first, so keywords inside string literals or
//! quoted identifiers never trip it, then requires a full parse that
//! classifies as read-only.

use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer, Whitespace};
use tracing::{debug, warn};

use crate::db::DatabaseBackend;
use crate::error::{NarrateError, Result};

use super::{dialect_for, SqlClassifier, StatementType};

/// Unquoted words that are never allowed in a generated query.
const DENIED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "MERGE", "UPSERT", "TRUNCATE", "ALTER", "CREATE",
    "GRANT", "REVOKE", "EXECUTE", "EXEC", "CALL", "COPY", "ATTACH", "DETACH", "PRAGMA", "VACUUM",
    "REINDEX", "LOCK",
];

/// A query that passed the guard, with comments removed and trailing
/// semicolons dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedSql {
    sql: String,
    statement_type: StatementType,
}

impl SanitizedSql {
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    pub fn statement_type(&self) -> &StatementType {
        &self.statement_type
    }
}

/// Validates and cleans SQL before it is sent to a database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlGuard {
    backend: DatabaseBackend,
}

impl SqlGuard {
    pub fn new(backend: DatabaseBackend) -> Self {
        Self { backend }
    }

    /// Checks `sql` and returns the text that may be executed.
    ///
    /// Every rejection is [`NarrateError::SqlInjection`] with the same fixed
    /// message; details go to the log only. SQL the dialect parser cannot
    /// parse is rejected too. SQL with nothing but comments or
    /// whitespace is a query error.
    pub fn sanitize(&self, sql: &str) -> Result<SanitizedSql> {
        let dialect = dialect_for(self.backend);
        let tokens = Tokenizer::new(dialect.as_ref(), sql)
            .tokenize_with_location()
            .map_err(|e| {
                warn!("Rejected query: tokenizer error: {e}");
                NarrateError::sql_injection()
            })?;

        let Some(last) = tokens
            .iter()
            .rposition(|t| is_significant(&t.token) && t.token != Token::SemiColon)
        else {
            return Err(NarrateError::query("Empty SQL statement"));
        };

        for token in &tokens[..=last] {
            match &token.token {
                Token::SemiColon => {
                    warn!("Rejected query: multiple statements");
                    return Err(NarrateError::sql_injection());
                }
                Token::Word(word) if word.quote_style.is_none() => {
                    let upper = word.value.to_uppercase();
                    if DENIED_KEYWORDS.contains(&upper.as_str()) {
                        warn!("Rejected query: denied keyword {upper}");
                        return Err(NarrateError::sql_injection());
                    }
                }
                _ => {}
            }
        }

        let cleaned = strip_comments(sql, &tokens[..=last], tokens.get(last + 1));

        let classification = SqlClassifier::new(self.backend).classify(&cleaned);
        if !classification.is_read_only() {
            warn!(
                "Rejected query: {} ({})",
                classification.reason.as_deref().unwrap_or("not read-only"),
                classification.level
            );
            return Err(NarrateError::sql_injection());
        }
        let statement_type = classification.statement_type;

        debug!("Query passed guard: {:?}", statement_type);
        Ok(SanitizedSql {
            sql: cleaned,
            statement_type,
        })
    }
}

fn is_significant(token: &Token) -> bool {
    !matches!(token, Token::Whitespace(_) | Token::EOF)
}

fn is_comment(token: &Token) -> bool {
    matches!(
        token,
        Token::Whitespace(Whitespace::SingleLineComment { .. })
            | Token::Whitespace(Whitespace::MultiLineComment(_))
    )
}

/// Rebuilds the query from the original text, replacing each comment with a
/// space. `next` is the token following the kept range, if any.
///
/// Slicing the source keeps literals byte-for-byte; re-rendering tokens would
/// have to redo quote escaping.
fn strip_comments(sql: &str, kept: &[TokenWithSpan], next: Option<&TokenWithSpan>) -> String {
    let index = LineIndex::new(sql);
    let end_of_kept = next.map_or(sql.len(), |t| index.offset(&t.span.start));

    let mut cleaned = String::with_capacity(sql.len());
    for (i, token) in kept.iter().enumerate() {
        let start = index.offset(&token.span.start);
        let end = kept
            .get(i + 1)
            .map_or(end_of_kept, |t| index.offset(&t.span.start))
            .max(start);

        if is_comment(&token.token) {
            cleaned.push(' ');
        } else {
            cleaned.push_str(&sql[start..end]);
        }
    }

    cleaned.trim().to_string()
}

/// Maps tokenizer locations (1-based line, 1-based column in chars) to byte
/// offsets.
struct LineIndex<'a> {
    sql: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(sql: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            sql.char_indices()
                .filter(|(_, c)| *c == '\n')
                .map(|(i, _)| i + 1),
        );
        Self { sql, line_starts }
    }

    fn offset(&self, location: &Location) -> usize {
        let line = (location.line as usize).saturating_sub(1);
        let Some(&line_start) = self.line_starts.get(line) else {
            return self.sql.len();
        };
        let column = (location.column as usize).saturating_sub(1);
        self.sql[line_start..]
            .char_indices()
            .nth(column)
            .map_or(self.sql.len(), |(i, _)| line_start + i)
    }
}
