//! Execution context for task running
//!
//! The context owns everything a run needs: the variable environment, the
//! task, filter and function registries, the command-line main variables and the shell
//! used for commands. It is passed explicitly to task bodies, so several
//! independent runs can coexist (tests rely on this).

use crate::error::{Error, Result, ABORT_CODE};
use crate::runner::interpolate::{self, MAX_DEPTH};
use crate::runner::{
    Capture, Environment, FilterRegistry, FuncArgs, FunctionRegistry, RunOptions, RunResult,
    Shell, ShellRequest, SystemShell, TaskFunction, TaskRegistry, Value, VarMap,
};
use clap::ValueEnum;
use indexmap::IndexMap;
use std::cell::Cell;
use std::env;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Topics for verbose output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Verbose {
    /// Task file discovery and loading
    Load,
    /// Task trail when a run fails
    Error,
    /// Echo every command, even quiet ones
    Run,
    /// Show current values in variable and task help
    Var,
}

/// Execution context that tracks state during task execution
pub struct Context {
    /// Variables
    pub env: Environment,

    /// Registered tasks
    pub tasks: TaskRegistry,

    /// Registered filters
    pub filters: FilterRegistry,

    /// Registered functions
    pub functions: FunctionRegistry,

    /// Working directory for commands
    pub working_dir: PathBuf,

    /// Enabled verbose topics
    pub verbose: Vec<Verbose>,

    /// Command-line `NAME=VALUE` variables, re-applied over task defaults
    main_vars: VarMap,

    shell: Box<dyn Shell>,

    /// Task records currently executing
    task_stack: Vec<String>,

    /// Delayed values currently being produced
    resolving: Cell<usize>,
}

impl Context {
    /// Create a new context with the built-in filters and the system shell
    pub fn new() -> Self {
        Context {
            env: Environment::new(),
            tasks: TaskRegistry::new(),
            filters: FilterRegistry::with_builtins(),
            functions: FunctionRegistry::new(),
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            verbose: Vec::new(),
            main_vars: VarMap::new(),
            shell: Box::new(SystemShell),
            task_stack: Vec::new(),
            resolving: Cell::new(0),
        }
    }

    /// Create a context with a specific working directory
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    /// Replace the shell used for commands
    pub fn with_shell(mut self, shell: impl Shell + 'static) -> Self {
        self.shell = Box::new(shell);
        self
    }

    pub fn with_verbose(mut self, verbose: Vec<Verbose>) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn is_verbose(&self, topic: Verbose) -> bool {
        self.verbose.contains(&topic)
    }

    /// Set the command-line main variables
    ///
    /// They are assigned immediately and re-applied on top of every task
    /// record's variables, so they win over task-local defaults.
    pub fn set_main_vars(&mut self, vars: VarMap) -> Result<()> {
        self.env.update(&vars)?;
        self.main_vars = vars;
        Ok(())
    }

    pub fn main_vars(&self) -> &VarMap {
        &self.main_vars
    }

    /// Fail if a main variable could not be re-applied to a task scope
    ///
    /// A task file may lock a name that was also given on the command line;
    /// reporting it once after loading beats failing at every task entry.
    pub fn check_main_vars(&self) -> Result<()> {
        self.env.check(&self.main_vars)
    }

    /// Import the OS environment for every name not already set
    ///
    /// Values are stored as literals and never substituted.
    pub fn import_os_env(&mut self) -> Result<()> {
        for (name, value) in env::vars() {
            if !self.env.contains(&name) {
                self.env.set(&name, Value::Literal(value))?;
            }
        }
        Ok(())
    }

    /// Get the current task name (innermost executing record)
    pub fn current_task(&self) -> Option<&str> {
        self.task_stack.last().map(String::as_str)
    }

    /// Evaluate a variable to its fully substituted value
    pub fn evaluate(&self, name: &str) -> Result<Value> {
        interpolate::evaluate(self, name)
    }

    /// Substitute a value with no ambient filters
    pub fn subst(&self, value: &Value) -> Result<Value> {
        interpolate::subst(self, value, None)
    }

    /// Substitute a string with no ambient filters
    pub fn subst_str(&self, text: &str) -> Result<String> {
        interpolate::subst_str(self, text, None)
    }

    pub fn escape(&self, text: &str) -> String {
        interpolate::escape(text)
    }

    /// Push a variable scope that is popped when the guard is dropped
    pub fn scope(&mut self) -> ContextScope<'_> {
        self.env.push_scope();
        ContextScope { ctx: self }
    }

    /// Execute every function record of a task
    ///
    /// Each record runs in its own scope with, in increasing precedence, the
    /// record's declared variables, `vars`, and the main variables. Its
    /// dependencies run first and cannot leak changes back. Records marked
    /// `once` run only the first time.
    pub fn execute(&mut self, name: &str, vars: &VarMap) -> Result<()> {
        let records = self.tasks.entries(name)?.to_vec();
        for record in records {
            if record.should_skip() {
                debug!(task = %name, "already ran, skipping");
                continue;
            }
            self.execute_record(&record, vars)?;
            record.mark_ran();
        }
        Ok(())
    }

    /// Call a task from inside a running task body
    ///
    /// Same as [`Context::execute`]: the callee gets its own scope and the
    /// caller's variables are unchanged afterwards.
    pub fn calltask(&mut self, name: &str, vars: &VarMap) -> Result<()> {
        self.execute(name, vars)
    }

    /// Call a registered function with substituted arguments
    pub fn callfunc(&mut self, name: &str, args: &FuncArgs) -> Result<Value> {
        let function = self.functions.get(name)?;
        debug!(function = %name, task = ?self.current_task(), "calling function");
        function(self, args)
    }

    fn execute_record(&mut self, record: &TaskFunction, vars: &VarMap) -> Result<()> {
        if self.task_stack.contains(&record.name) {
            let mut trail = self.task_stack.clone();
            trail.push(record.name.clone());
            return Err(Error::RecursiveTask(trail.join(" -> ")));
        }

        debug!(task = %record.name, depth = self.task_stack.len(), "running task");
        let main_vars = self.main_vars.clone();

        let mut scope = self.scope();
        scope.task_stack.push(record.name.clone());
        let result = run_in_scope(&mut scope, record, vars, &main_vars);
        scope.task_stack.pop();

        if let Err(e) = &result {
            if !e.is_exit() && scope.is_verbose(Verbose::Error) {
                eprintln!("  in task '{}'", record.name);
            }
        }
        result
    }

    /// Run a command
    ///
    /// The command is substituted (with the `_SHELLFILTER_` chain unless
    /// disabled), echoed unless quiet, and run with `_SHELL_` and the
    /// `_SHELLENV_` overlay. An unaccepted return code fails with
    /// [`Error::CommandFailed`] when `options.abort` is set.
    pub fn run(&self, command: &str, options: &RunOptions) -> Result<RunResult> {
        let shell = if self.env.contains("_SHELL_") {
            Some(self.evaluate("_SHELL_")?.to_string())
        } else {
            None
        };

        let mut shell_env = IndexMap::new();
        if self.env.contains("_SHELLENV_") {
            match self.evaluate("_SHELLENV_")? {
                Value::Map(map) => {
                    for (key, value) in map {
                        shell_env.insert(key, value.to_string());
                    }
                }
                other => warn!(value = %other, "_SHELLENV_ is not a mapping, ignored"),
            }
        }

        let filter = if options.filter && self.env.contains("_SHELLFILTER_") {
            Some(self.evaluate("_SHELLFILTER_")?.to_string())
        } else {
            None
        };
        let command = interpolate::subst_str(self, command, filter.as_deref())?;

        let quiet = match options.quiet {
            Some(quiet) => quiet,
            None => self.env.contains("_QUIET_") && self.evaluate("_QUIET_")?.is_truthy(),
        };
        if !quiet || self.is_verbose(Verbose::Run) {
            println!("{}", command);
        }

        let output = self.shell.spawn(&ShellRequest {
            command: &command,
            shell: shell.as_deref(),
            env: &shell_env,
            capture: options.capture,
            working_dir: &self.working_dir,
        })?;

        let result = RunResult::new(output, &options.retvals);
        if !result.succeeded() && options.abort {
            return Err(Error::CommandFailed {
                command,
                code: result.code,
            });
        }
        Ok(result)
    }

    /// Run a command and return its captured output
    ///
    /// Returns stderr when capturing stderr only, stdout otherwise. A capture
    /// mode of `None` is treated as stdout.
    pub fn capture(&self, command: &str, options: &RunOptions) -> Result<String> {
        let mut options = options.clone();
        if options.capture == Capture::None {
            options.capture = Capture::Stdout;
        }

        let result = self.run(command, &options)?;
        let text = match options.capture {
            Capture::Stderr => result.stderr,
            _ => result.stdout,
        };
        Ok(text.unwrap_or_default())
    }

    /// Write a substituted message to stdout
    pub fn output(&self, message: &str) -> Result<()> {
        let text = self.subst_str(message)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    pub fn outputln(&self, message: &str) -> Result<()> {
        self.output(message)?;
        self.output("\n")
    }

    /// Write a substituted message to stderr
    pub fn error(&self, message: &str) -> Result<()> {
        let text = self.subst_str(message)?;
        let mut stderr = io::stderr().lock();
        stderr.write_all(text.as_bytes())?;
        stderr.flush()?;
        Ok(())
    }

    pub fn errorln(&self, message: &str) -> Result<()> {
        self.error(message)?;
        self.error("\n")
    }

    /// Build the error that aborts the run
    ///
    /// The message is substituted; the caller returns the error so that every
    /// open scope unwinds before the process exits.
    pub fn abort(&self, message: &str, code: Option<i32>) -> Error {
        match self.subst_str(message) {
            Ok(message) => {
                debug!(task = ?self.current_task(), "abort requested");
                Error::Abort {
                    message,
                    code: code.unwrap_or(ABORT_CODE),
                }
            }
            Err(e) => e,
        }
    }

    /// Build the error that ends the run without a message
    pub fn exit(&self, code: i32) -> Error {
        debug!(task = ?self.current_task(), code, "exit requested");
        Error::Exit(code)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

fn run_in_scope(
    ctx: &mut Context,
    record: &TaskFunction,
    vars: &VarMap,
    main_vars: &VarMap,
) -> Result<()> {
    ctx.env.update(&record.vars)?;
    ctx.env.update(vars)?;
    ctx.env.update(main_vars)?;

    for depends in &record.depends {
        ctx.calltask(depends, &VarMap::new())?;
    }

    (record.body)(ctx)
}

/// Marks one delayed value as being produced, released on drop
pub(crate) struct Resolving<'a> {
    depth: &'a Cell<usize>,
}

impl Context {
    /// Enter the producer of a delayed value
    ///
    /// Producers substitute through the context again, so nesting is counted
    /// here rather than by the substitution depth.
    pub(crate) fn enter_delayed(&self, name: &str) -> Result<Resolving<'_>> {
        let depth = self.resolving.get() + 1;
        if depth > MAX_DEPTH {
            return Err(Error::RecursiveSubstitution(name.to_string()));
        }
        self.resolving.set(depth);
        Ok(Resolving {
            depth: &self.resolving,
        })
    }
}

impl Drop for Resolving<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// A context with a pushed variable scope, popped on drop
pub struct ContextScope<'a> {
    ctx: &'a mut Context,
}

impl Deref for ContextScope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for ContextScope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        self.ctx.env.pop_scope();
    }
}
