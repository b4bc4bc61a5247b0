//! Integration tests for db-narrate.

pub mod answer_test;
pub mod postgres_test;
