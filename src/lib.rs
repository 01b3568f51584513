//! Taskrun - a sequential task runner
//!
//! Tasks are declared in a YAML task file (or registered from Rust) and run
//! against a scoped variable environment with `$(NAME|filter)` substitution.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;

// Re-export commonly used types
pub use error::{ConfigError, Error, Result};
pub use runner::Context;

/// Current version of taskrun
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
