//! Task execution engine
//!
//! This module handles variables and their substitution, the task, filter
//! and function registries, command running and conditional steps.

pub mod command;
pub mod context;
pub mod environment;
pub mod filter;
pub mod function;
pub mod interpolate;
pub mod step;
pub mod task;
pub mod value;
pub mod when;

// Re-export main types
pub use command::*;
pub use context::*;
pub use environment::*;
pub use filter::*;
pub use function::*;
pub use interpolate::{escape, MAX_DEPTH};
pub use step::{body, steps_from_config, Action, Step};
pub use task::*;
pub use value::*;
pub use when::*;
