//! Task file parsing and validation
//!
//! This module handles discovery and parsing of task files, conversion of
//! their variable declarations, and loading them into a [`crate::runner::Context`].

pub mod parse;
pub mod schema;
pub mod types;
pub mod vars;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use types::*;
