//! Integration tests for db-narrate.
//!
//! The SQLite tests run everywhere. The PostgreSQL tests require a running
//! database; set DATABASE_URL to run them.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;
