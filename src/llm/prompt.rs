//! Answer prompt templates.
//!
//! A template is plain text with three slots: `{question}`, `{sql_query}` and
//! `{sql_query_result}`. Templates are selected by configuration; the built-in
//! ones are versioned by name so a wording change never silently replaces an
//! existing one.

use crate::error::{NarrateError, Result};
use crate::query::ResultRow;

/// Name of the template used when none is configured.
pub const DEFAULT_TEMPLATE_NAME: &str = "detailed-v2";

const QUESTION_SLOT: &str = "{question}";
const SQL_SLOT: &str = "{sql_query}";
const RESULT_SLOT: &str = "{sql_query_result}";

const DETAILED_V2: &str = r#"
Given a question, an SQL query, and the corresponding SQL query result, you should provide a detailed answer based on the SQL query result.
If the SQL query result does not answer the question, respond with 'I don't know.'

## Step-by-step guide
1. Identify the Question: Extract the question from the provided input.
2. Analyze the SQL Query: Review the SQL query to understand what data is being retrieved from the database.
3. Interpret the SQL Query Result: Examine the SQL query result to determine if it contains the necessary information to answer the question.
4. Formulate the Answer: Based on the SQL query result, construct a detailed answer to the question. If the SQL query result does not provide the necessary information, respond with 'I don't know.'
5. Output the Answer: Present the detailed answer clearly and concisely.

## Answer
Question: {question}
SQL query: {sql_query}
SQL query result: {sql_query_result}
Answer:
"#;

const CONCISE_V1: &str = r#"Given a Question, a Sql query and the sql query result try to answer the question
If the sql query result doesn't answer the question just say 'I don't know'
Answer the question given the sql query and the sql query result.
Question: {question}
SQL query: {sql_query}
SQL query result: {sql_query_result}
"#;

const BUILTINS: &[(&str, &str)] = &[("detailed-v2", DETAILED_V2), ("concise-v1", CONCISE_V1)];

/// A validated answer prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            name: DEFAULT_TEMPLATE_NAME.to_string(),
            text: DETAILED_V2.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Looks up a built-in template by name.
    pub fn builtin(name: &str) -> Result<Self> {
        BUILTINS
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(builtin, text)| Self {
                name: builtin.to_string(),
                text: text.to_string(),
            })
            .ok_or_else(|| {
                NarrateError::config(format!(
                    "Unknown prompt template '{}'. Available: {}",
                    name,
                    Self::builtin_names().join(", ")
                ))
            })
    }

    /// Names of the built-in templates.
    pub fn builtin_names() -> Vec<&'static str> {
        BUILTINS.iter().map(|(name, _)| *name).collect()
    }

    /// Creates a template from custom text, checking that every slot is present.
    pub fn custom(name: impl Into<String>, text: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let text = text.into();

        let missing: Vec<&str> = [QUESTION_SLOT, SQL_SLOT, RESULT_SLOT]
            .into_iter()
            .filter(|slot| !text.contains(slot))
            .collect();
        if !missing.is_empty() {
            return Err(NarrateError::config(format!(
                "Prompt template '{}' is missing {}",
                name,
                missing.join(", ")
            )));
        }

        Ok(Self { name, text })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Fills the slots in a single pass.
    ///
    /// Slot markers that appear inside the question, the SQL or the rows are
    /// left as they are.
    pub fn compose(&self, question: &str, sql: &str, rows: &[ResultRow]) -> String {
        let result = render_rows(rows);
        let slots = [
            (QUESTION_SLOT, question),
            (SQL_SLOT, sql),
            (RESULT_SLOT, result.as_str()),
        ];

        let mut out = String::with_capacity(self.text.len() + question.len() + sql.len() + result.len());
        let mut rest = self.text.as_str();

        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            match slots.iter().find(|(marker, _)| tail.starts_with(marker)) {
                Some((marker, value)) => {
                    out.push_str(value);
                    rest = &tail[marker.len()..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);

        out
    }
}

/// Renders rows one JSON object per line, in order.
pub fn render_rows(rows: &[ResultRow]) -> String {
    rows.iter()
        .map(ResultRow::to_json_line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;
    use pretty_assertions::assert_eq;

    fn count_row(n: i64) -> ResultRow {
        ResultRow::new(vec![("count".to_string(), Value::Int(n))])
    }

    #[test]
    fn test_builtins_are_valid() {
        for name in PromptTemplate::builtin_names() {
            let template = PromptTemplate::builtin(name).unwrap();
            assert!(PromptTemplate::custom(name, template.text()).is_ok());
        }
        assert_eq!(PromptTemplate::default().name(), DEFAULT_TEMPLATE_NAME);
    }

    #[test]
    fn test_unknown_builtin_lists_available() {
        let err = PromptTemplate::builtin("v0").unwrap_err();
        assert!(err.to_string().contains("detailed-v2"));
        assert!(err.to_string().contains("concise-v1"));
    }

    #[test]
    fn test_custom_template_missing_slot() {
        let err = PromptTemplate::custom("mine", "Q: {question}\nR: {sql_query_result}").unwrap_err();
        assert!(err.to_string().contains("{sql_query}"));
        assert!(!err.to_string().contains("{question}"));
    }

    #[test]
    fn test_compose_fills_all_slots() {
        let template = PromptTemplate::custom(
            "test",
            "Q: {question}\nSQL: {sql_query}\nRows:\n{sql_query_result}\nA:",
        )
        .unwrap();

        let prompt = template.compose(
            "How many orders last month?",
            "SELECT COUNT(*) AS count FROM orders",
            &[count_row(42)],
        );

        assert_eq!(
            prompt,
            "Q: How many orders last month?\nSQL: SELECT COUNT(*) AS count FROM orders\nRows:\n{\"count\":42}\nA:"
        );
    }

    #[test]
    fn test_rows_one_per_line() {
        let rendered = render_rows(&[count_row(1), count_row(2), count_row(3)]);
        assert_eq!(rendered, "{\"count\":1}\n{\"count\":2}\n{\"count\":3}");
        assert_eq!(render_rows(&[]), "");
    }

    #[test]
    fn test_slot_markers_in_values_are_not_expanded() {
        let template = PromptTemplate::builtin("concise-v1").unwrap();

        let prompt = template.compose("What is {sql_query}?", "SELECT '{question}'", &[]);

        assert!(prompt.contains("Question: What is {sql_query}?"));
        assert!(prompt.contains("SQL query: SELECT '{question}'"));
    }

    #[test]
    fn test_other_braces_are_kept() {
        let template =
            PromptTemplate::custom("braces", "{x} {question} {sql_query} {sql_query_result} {")
                .unwrap();
        assert_eq!(template.compose("q", "s", &[]), "{x} q s  {");
    }

    #[test]
    fn test_compose_is_deterministic() {
        let template = PromptTemplate::default();
        let rows = vec![count_row(42)];

        let first = template.compose("How many?", "SELECT 42", &rows);
        let second = template.compose("How many?", "SELECT 42", &rows);

        assert_eq!(first, second);
        assert!(first.contains("SQL query result: {\"count\":42}"));
    }
}
