//! Error types for taskrun

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for taskrun operations
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code used by `abort` when no code is given
pub const ABORT_CODE: i32 = 255;

/// Main error type for taskrun
#[derive(Error, Debug)]
pub enum Error {
    /// Task file errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Variable '{0}' is not defined")]
    VariableNotFound(String),

    #[error("Variable '{0}' is locked")]
    LockedVariable(String),

    #[error("No such filter: {0}")]
    FilterNotFound(String),

    #[error("Filter already defined: {0}")]
    FilterAlreadyDefined(String),

    #[error("No such task: {0}")]
    TaskNotFound(String),

    #[error("Task already defined: {0}")]
    TaskAlreadyDefined(String),

    /// A task called while one of its records is already running
    #[error("Task calls itself: {0}")]
    RecursiveTask(String),

    #[error("No such function: {0}")]
    FunctionNotFound(String),

    #[error("Function already defined: {0}")]
    FunctionAlreadyDefined(String),

    #[error("Unterminated substitution in '{0}'")]
    SubstitutionSyntax(String),

    #[error("Substitution of '{0}' nests too deeply (cyclic definition?)")]
    RecursiveSubstitution(String),

    #[error("Command '{command}' failed with exit code {code:?}")]
    CommandFailed { command: String, code: Option<i32> },

    /// Explicit `abort` from a task body
    #[error("{message}")]
    Abort { message: String, code: i32 },

    /// Explicit `exit` from a task body
    #[error("exit with code {0}")]
    Exit(i32),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Exit(code) => *code,
            Error::Abort { code, .. } => *code,
            Error::Config(_) => 2,
            Error::CommandFailed { .. } => 3,
            Error::VariableNotFound(_) | Error::LockedVariable(_) => 4,
            Error::FilterNotFound(_) | Error::FilterAlreadyDefined(_) => 5,
            Error::TaskNotFound(_) | Error::TaskAlreadyDefined(_) | Error::RecursiveTask(_) => 6,
            Error::FunctionNotFound(_) | Error::FunctionAlreadyDefined(_) => 8,
            Error::SubstitutionSyntax(_) | Error::RecursiveSubstitution(_) => 7,
            Error::Io(_) | Error::Yaml(_) => 1,
        }
    }

    /// True for errors that end the run on purpose rather than by failure
    pub fn is_exit(&self) -> bool {
        matches!(self, Error::Exit(_))
    }
}

/// Task file discovery, parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to find task file (searched: {0})")]
    NotFound(String),

    #[error("Invalid task file: {0}")]
    Invalid(String),

    #[error("Invalid value for variable '{name}': {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("Failed to include file '{path}': {error}")]
    IncludeFile { path: PathBuf, error: String },

    #[error("Setting special variable '{0}' from the command line is not allowed")]
    SpecialVariable(String),

    #[error("Task '{task}' depends on undefined task '{depends}'")]
    UnknownDependency { task: String, depends: String },

    #[error("Circular task dependency: {0}")]
    CircularDependency(String),
}

/// Specialized result type for task file operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_family() {
        assert_eq!(Error::Exit(0).exit_code(), 0);
        assert_eq!(
            Error::Abort {
                message: "x".into(),
                code: ABORT_CODE
            }
            .exit_code(),
            255
        );
        assert_eq!(Error::VariableNotFound("A".into()).exit_code(), 4);
        assert_eq!(Error::TaskNotFound("t".into()).exit_code(), 6);
        assert_ne!(
            Error::FilterNotFound("f".into()).exit_code(),
            Error::SubstitutionSyntax("$(".into()).exit_code()
        );
    }

    #[test]
    fn test_config_error_converts() {
        let err: Error = ConfigError::Invalid("bad".into()).into();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
