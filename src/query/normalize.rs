//! Turns raw result sets into rows of JSON-safe scalars.
//!
//! After normalization every value is one of `Null`, `Bool`, `Int`, finite
//! `Float` or `String`, and normalizing again changes nothing.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::db::{QueryResult, Value};
use crate::error::{NarrateError, Result};

/// One result row as ordered `(column, value)` pairs.
///
/// Duplicate column names are kept; each pair stays in result-set order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultRow {
    entries: Vec<(String, Value)>,
}

impl ResultRow {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    /// Returns the first value under `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the row as a single-line JSON object in column order.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            // unreachable with string keys and scalar values
            self.entries
                .iter()
                .map(|(name, value)| format!("{name}: {value}"))
                .collect::<Vec<_>>()
                .join(", ")
        })
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, &value.to_json())?;
        }
        map.end()
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_line())
    }
}

/// Normalizes a single value.
///
/// Dates and times become their canonical text, decimals become floats,
/// bytes and JSON become text. Never fails.
pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::Decimal(d) => match d.to_f64() {
            Some(f) if f.is_finite() => Value::Float(f),
            _ => Value::String(d.to_string()),
        },
        Value::Float(f) if !f.is_finite() => Value::String(f.to_string()),
        Value::Json(json) => Value::String(json.to_string()),
        scalar if scalar.is_scalar() => scalar,
        other => Value::String(other.to_display_string()),
    }
}

/// Pairs each row of `result` with its column names and normalizes the values.
///
/// Row order is preserved. A row whose length differs from the column count
/// is an internal error rather than a silently shortened row.
pub fn normalize_rows(result: &QueryResult) -> Result<Vec<ResultRow>> {
    let names = result.column_names();

    result
        .rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            if row.len() != names.len() {
                return Err(NarrateError::internal(format!(
                    "Row {index} has {} values but the result has {} columns",
                    row.len(),
                    names.len()
                )));
            }
            let entries = names
                .iter()
                .zip(row.iter())
                .map(|(name, value)| (name.to_string(), normalize_value(value.clone())))
                .collect();
            Ok(ResultRow::new(entries))
        })
        .collect()
}
