//! SQL parsing and classification logic.
//!
//! Uses sqlparser-rs with the dialect of the target backend to parse SQL and
//! classify statements by their safety level.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::parser::Parser;

use crate::db::DatabaseBackend;
use crate::error::{NarrateError, Result};

use super::{dialect_for, ClassificationResult, SafetyLevel, StatementType};

type Verdict = (SafetyLevel, StatementType);

/// SQL classifier that parses and classifies SQL queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlClassifier {
    backend: DatabaseBackend,
}

impl SqlClassifier {
    /// Creates a classifier for the given backend's SQL dialect.
    pub fn new(backend: DatabaseBackend) -> Self {
        Self { backend }
    }

    /// Classifies a SQL string and returns the classification result.
    ///
    /// If the SQL cannot be parsed, it is treated as destructive.
    pub fn classify(&self, sql: &str) -> ClassificationResult {
        match self.try_classify(sql) {
            Ok(result) => result,
            Err(_) => ClassificationResult::with_reason(
                SafetyLevel::Destructive,
                StatementType::Unknown,
                "Could not parse SQL",
            ),
        }
    }

    /// Classifies a SQL string, returning a query error if it does not parse.
    fn try_classify(&self, sql: &str) -> Result<ClassificationResult> {
        let dialect = dialect_for(self.backend);
        let statements = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| NarrateError::query(format!("SQL parse error: {}", e)))?;

        if statements.is_empty() {
            return Ok(ClassificationResult::with_reason(
                SafetyLevel::Destructive,
                StatementType::Unknown,
                "Empty SQL statement",
            ));
        }

        if statements.len() == 1 {
            let (level, stmt_type) = classify_statement(&statements[0]);
            return Ok(finish(level, stmt_type));
        }

        // Multiple statements: use the most dangerous classification
        let (level, stmt_type) = statements
            .iter()
            .map(classify_statement)
            .fold((SafetyLevel::Safe, StatementType::Unknown), worst);

        let mut result = finish(level, StatementType::Multiple(Box::new(stmt_type)));
        if result.reason.is_none() {
            result.reason = Some("Multiple statements".to_string());
        }
        Ok(result)
    }
}

fn finish(level: SafetyLevel, stmt_type: StatementType) -> ClassificationResult {
    if level.is_read_only() {
        ClassificationResult::new(level, stmt_type)
    } else {
        let reason = format!("{} statement is not read-only", stmt_type);
        ClassificationResult::with_reason(level, stmt_type, reason)
    }
}

/// Keeps the more dangerous verdict; ties keep the earlier one.
fn worst(current: Verdict, next: Verdict) -> Verdict {
    if next.0 > current.0 {
        next
    } else {
        current
    }
}

/// Classifies a single parsed statement.
fn classify_statement(statement: &Statement) -> Verdict {
    match statement {
        // Query: may contain data-modifying CTEs, so recurse
        Statement::Query(query) => classify_query(query),
        Statement::Explain {
            analyze, statement, ..
        } => {
            if *analyze {
                // EXPLAIN ANALYZE executes the statement
                let (inner_level, _) = classify_statement(statement);
                (inner_level, StatementType::Explain)
            } else {
                (SafetyLevel::Safe, StatementType::Explain)
            }
        }
        Statement::ShowVariable { .. } => (SafetyLevel::Safe, StatementType::Show),
        Statement::ShowTables { .. } => (SafetyLevel::Safe, StatementType::Show),
        Statement::ShowColumns { .. } => (SafetyLevel::Safe, StatementType::Show),
        Statement::ShowCreate { .. } => (SafetyLevel::Safe, StatementType::Show),
        Statement::ShowFunctions { .. } => (SafetyLevel::Safe, StatementType::Show),
        Statement::ShowStatus { .. } => (SafetyLevel::Safe, StatementType::Show),
        Statement::ShowCollation { .. } => (SafetyLevel::Safe, StatementType::Show),

        Statement::Insert(_) => (SafetyLevel::Mutating, StatementType::Insert),
        Statement::Update { .. } => (SafetyLevel::Mutating, StatementType::Update),
        Statement::Merge { .. } => (SafetyLevel::Mutating, StatementType::Merge),

        Statement::Delete(_) => (SafetyLevel::Destructive, StatementType::Delete),
        Statement::Drop { .. } => (SafetyLevel::Destructive, StatementType::Drop),
        Statement::Truncate { .. } => (SafetyLevel::Destructive, StatementType::Truncate),
        Statement::AlterTable { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::AlterIndex { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::AlterView { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::AlterRole { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::CreateTable { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateIndex { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateView { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateSchema { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateDatabase { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateFunction { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateProcedure { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateRole { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateSequence { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateType { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::Grant { .. } => (SafetyLevel::Destructive, StatementType::Grant),
        Statement::Revoke { .. } => (SafetyLevel::Destructive, StatementType::Revoke),

        // SET, COPY, CALL, transaction control and everything else
        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}

/// Classifies a Query by recursively inspecting for data-modifying operations.
fn classify_query(query: &Query) -> Verdict {
    let mut verdict = (SafetyLevel::Safe, StatementType::Select);

    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            verdict = worst(verdict, classify_query(&cte.query));
        }
    }

    verdict = worst(verdict, classify_set_expr(&query.body));

    // FOR UPDATE / FOR SHARE take row locks
    if !query.locks.is_empty() {
        verdict = worst(verdict, (SafetyLevel::Mutating, StatementType::Locking));
    }

    verdict
}

/// Classifies a SetExpr, detecting mutations and recursing into nested queries.
fn classify_set_expr(set_expr: &SetExpr) -> Verdict {
    match set_expr {
        SetExpr::Delete(stmt) => classify_statement(stmt),
        SetExpr::Update(stmt) => classify_statement(stmt),
        SetExpr::Insert(stmt) => classify_statement(stmt),
        SetExpr::Merge(stmt) => classify_statement(stmt),

        SetExpr::Query(query) => classify_query(query),

        SetExpr::Select(select) => classify_select(select),

        // UNION, INTERSECT, EXCEPT
        SetExpr::SetOperation { left, right, .. } => {
            worst(classify_set_expr(left), classify_set_expr(right))
        }

        SetExpr::Values(_) | SetExpr::Table(_) => (SafetyLevel::Safe, StatementType::Select),
    }
}

/// Classifies a Select by checking its target and FROM clause.
fn classify_select(select: &Select) -> Verdict {
    // SELECT ... INTO creates a table
    if select.into.is_some() {
        return (SafetyLevel::Mutating, StatementType::SelectInto);
    }

    select
        .from
        .iter()
        .map(classify_table_with_joins)
        .fold((SafetyLevel::Safe, StatementType::Select), worst)
}

/// Classifies a TableWithJoins, checking the main relation and all joins.
fn classify_table_with_joins(twj: &TableWithJoins) -> Verdict {
    twj.joins
        .iter()
        .map(|join| classify_table_factor(&join.relation))
        .fold(classify_table_factor(&twj.relation), worst)
}

/// Classifies a TableFactor, recursing into derived tables (subqueries).
fn classify_table_factor(factor: &TableFactor) -> Verdict {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => (SafetyLevel::Safe, StatementType::Select),
    }
}
