//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, task file discovery and the
//! help output for variables and tasks.

pub mod app;

// Re-export main types
pub use app::*;
