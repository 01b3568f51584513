//! Command execution
//!
//! The [`Shell`] trait is the boundary to the operating system: it receives a
//! fully substituted command plus capture settings and reports what the
//! process produced. [`SystemShell`] is the real implementation.

use crate::error::Result;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use std::process::{Command as StdCommand, Stdio};
use tracing::debug;

/// Which output streams to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capture {
    #[default]
    None,
    Stdout,
    Stderr,
    /// Stdout and stderr merged into the stdout capture
    Both,
}

/// Options for running a command
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Suppress echoing the command; `None` falls back to `_QUIET_`
    pub quiet: Option<bool>,

    /// Fail the run when the return code is not accepted
    pub abort: bool,

    pub capture: Capture,

    /// Accepted return codes
    pub retvals: Vec<i32>,

    /// Apply the `_SHELLFILTER_` chain while substituting the command
    pub filter: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            quiet: None,
            abort: true,
            capture: Capture::None,
            retvals: vec![0],
            filter: true,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = Some(quiet);
        self
    }

    pub fn abort(mut self, abort: bool) -> Self {
        self.abort = abort;
        self
    }

    pub fn capture(mut self, capture: Capture) -> Self {
        self.capture = capture;
        self
    }

    pub fn retvals(mut self, retvals: Vec<i32>) -> Self {
        self.retvals = retvals;
        self
    }

    pub fn filter(mut self, filter: bool) -> Self {
        self.filter = filter;
        self
    }
}

/// Outcome of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
    accepted: bool,
}

impl RunResult {
    pub fn new(output: ShellOutput, retvals: &[i32]) -> Self {
        let accepted = output.code.is_some_and(|code| retvals.contains(&code));
        RunResult {
            stdout: output.stdout,
            stderr: output.stderr,
            code: output.code,
            accepted,
        }
    }

    /// True when the return code was one of the accepted values
    pub fn succeeded(&self) -> bool {
        self.accepted
    }
}

impl From<&RunResult> for bool {
    fn from(result: &RunResult) -> bool {
        result.succeeded()
    }
}

/// Strip the trailing line break(s) of captured output
pub fn chomp(text: &str) -> &str {
    text.trim_end_matches(['\n', '\r'])
}

/// A command ready to be handed to a shell
#[derive(Debug)]
pub struct ShellRequest<'a> {
    pub command: &'a str,
    /// Shell executable; `sh` when unset
    pub shell: Option<&'a str>,
    /// Variables layered over the inherited OS environment
    pub env: &'a IndexMap<String, String>,
    pub capture: Capture,
    pub working_dir: &'a Path,
}

/// Raw process output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub code: Option<i32>,
}

/// Runs commands on behalf of a context
pub trait Shell {
    fn spawn(&self, request: &ShellRequest<'_>) -> Result<ShellOutput>;
}

/// Runs commands through `<shell> -c`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl Shell for SystemShell {
    fn spawn(&self, request: &ShellRequest<'_>) -> Result<ShellOutput> {
        let shell = request.shell.unwrap_or("sh");

        let script = if request.capture == Capture::Both {
            format!("exec 2>&1\n{}", request.command)
        } else {
            request.command.to_string()
        };

        let mut command = StdCommand::new(shell);
        command.arg("-c").arg(&script);
        command.current_dir(request.working_dir);
        command.envs(request.env);

        command.stdin(Stdio::inherit());
        command.stdout(match request.capture {
            Capture::Stdout | Capture::Both => Stdio::piped(),
            _ => Stdio::inherit(),
        });
        command.stderr(match request.capture {
            Capture::Stderr => Stdio::piped(),
            _ => Stdio::inherit(),
        });

        debug!(shell, command = %request.command, capture = ?request.capture, "spawning");
        let output = command.output()?;

        let stdout = matches!(request.capture, Capture::Stdout | Capture::Both)
            .then(|| String::from_utf8_lossy(&output.stdout).into_owned());
        let stderr = (request.capture == Capture::Stderr)
            .then(|| String::from_utf8_lossy(&output.stderr).into_owned());

        Ok(ShellOutput {
            stdout,
            stderr,
            code: output.status.code(),
        })
    }
}
