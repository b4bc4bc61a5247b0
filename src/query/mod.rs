//! Query execution and result shaping for db-narrate.
//!
//! This module isolates guarded SQL execution and result normalization
//! from the answer pipeline.

pub mod executor;
pub mod normalize;

pub use executor::{QueryExecutor, QueryOutcome, DEFAULT_TOP_K};
pub use normalize::{normalize_rows, normalize_value, ResultRow};
