//! Connection resolution for db-narrate.
//!
//! Maps stored connection records to scoped database handles.

pub mod resolver;

pub use resolver::{ConnectionResolver, MockConnectionResolver, SqlxConnectionResolver};
