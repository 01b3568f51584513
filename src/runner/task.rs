//! Task function records and the task registry
//!
//! A task name maps to an ordered list of function records. Each record has
//! its own body, once-flag, default variables and dependency list; extending a
//! task appends a record and never reorders the earlier ones.

use crate::error::{Error, Result};
use crate::runner::{Context, VarMap};
use indexmap::IndexMap;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// A task body
pub type TaskBody = Rc<dyn Fn(&mut Context) -> Result<()>>;

/// Registration options for a task function
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Run at most once per process run
    pub once: bool,

    /// Append to an existing task instead of failing
    pub extend: bool,

    /// Tasks run before the body, in order
    pub depends: Vec<String>,

    /// Default variables, applied with the lowest precedence
    pub vars: VarMap,

    pub description: Option<String>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        TaskOptions {
            once: true,
            extend: false,
            depends: Vec::new(),
            vars: VarMap::new(),
            description: None,
        }
    }
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    pub fn with_extend(mut self, extend: bool) -> Self {
        self.extend = extend;
        self
    }

    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_vars(mut self, vars: VarMap) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One registered body under a task name
pub struct TaskFunction {
    /// Owning task name
    pub name: String,
    pub body: TaskBody,
    pub once: bool,
    pub vars: VarMap,
    pub depends: Vec<String>,
    pub description: Option<String>,
    ran: Cell<bool>,
}

impl TaskFunction {
    /// Whether the body has completed at least once
    pub fn has_run(&self) -> bool {
        self.ran.get()
    }

    /// A `once` record that already ran is skipped
    pub fn should_skip(&self) -> bool {
        self.once && self.ran.get()
    }

    pub(crate) fn mark_ran(&self) {
        self.ran.set(true);
    }

    /// Declared variables that carry a description
    pub fn var_descriptions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .filter_map(|(name, value)| value.description().map(|d| (name.as_str(), d)))
    }
}

impl fmt::Debug for TaskFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFunction")
            .field("name", &self.name)
            .field("once", &self.once)
            .field("ran", &self.ran.get())
            .field("depends", &self.depends)
            .field("description", &self.description)
            .finish()
    }
}

/// Task name to function records
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: IndexMap<String, Vec<Rc<TaskFunction>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body under `name`
    ///
    /// An occupied name requires `options.extend`; otherwise this fails with
    /// [`Error::TaskAlreadyDefined`].
    pub fn register<F>(&mut self, name: &str, body: F, options: TaskOptions) -> Result<()>
    where
        F: Fn(&mut Context) -> Result<()> + 'static,
    {
        self.register_body(name, Rc::new(body), options)
    }

    /// Register an already shared body
    pub fn register_body(&mut self, name: &str, body: TaskBody, options: TaskOptions) -> Result<()> {
        let entries = self.tasks.entry(name.to_string()).or_default();
        if !entries.is_empty() && !options.extend {
            return Err(Error::TaskAlreadyDefined(name.to_string()));
        }

        debug!(task = %name, record = entries.len(), "registered task function");
        entries.push(Rc::new(TaskFunction {
            name: name.to_string(),
            body,
            once: options.once,
            vars: options.vars,
            depends: options.depends,
            description: options.description,
            ran: Cell::new(false),
        }));
        Ok(())
    }

    /// The records registered under `name`, in registration order
    pub fn entries(&self, name: &str) -> Result<&[Rc<TaskFunction>]> {
        self.tasks
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::TaskNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Task names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
