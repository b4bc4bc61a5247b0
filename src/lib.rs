//! db-narrate - turns a generated SQL query and its result into a
//! natural-language answer.
//!
//! The entry point is [`answer::AnswerService::synthesize_answer`].

pub mod answer;
pub mod cli;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod model;
pub mod query;
pub mod repository;
pub mod safety;
