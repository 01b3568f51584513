//! Task file types
//!
//! This module defines the data structures that represent a task file.
//! Variable values stay as raw YAML here; they are turned into assignments
//! by [`crate::config::vars`] because tags such as `!default` carry meaning.
//!
//! The "string or mapping" enums deserialize through [`serde_yaml::Value`]
//! rather than `#[serde(untagged)]`, which cannot buffer tagged nodes.

use crate::runner::Capture;
use indexmap::IndexMap;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_yaml::Value as Yaml;

/// Raw YAML variable declarations, in file order
pub type YamlVars = IndexMap<String, serde_yaml::Value>;

/// Top-level task file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskFile {
    /// Glob patterns of further task files, relative to this file
    #[serde(default, deserialize_with = "string_or_list")]
    pub include: Vec<String>,

    /// dotenv files whose entries become default variables
    #[serde(rename = "env-files", default, deserialize_with = "string_or_list")]
    pub env_files: Vec<String>,

    /// Variables, applied in order
    #[serde(default)]
    pub vars: YamlVars,

    /// Regex replacement filters
    #[serde(default)]
    pub filters: IndexMap<String, FilterDecl>,

    /// Tasks defined in this file
    #[serde(default)]
    pub tasks: IndexMap<String, TaskDecls>,
}

/// A regex replacement filter
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterDecl {
    pub pattern: String,

    /// Replacement text; `$1`, `${name}` refer to capture groups
    #[serde(default)]
    pub replace: String,
}

/// One task record, or several records under the same name
#[derive(Debug, Clone)]
pub enum TaskDecls {
    Many(Vec<TaskDecl>),
    One(TaskDecl),
}

impl TaskDecls {
    pub fn into_vec(self) -> Vec<TaskDecl> {
        match self {
            TaskDecls::Many(decls) => decls,
            TaskDecls::One(decl) => vec![decl],
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaskDecl> {
        match self {
            TaskDecls::Many(decls) => decls.iter(),
            TaskDecls::One(decl) => std::slice::from_ref(decl).iter(),
        }
    }
}

/// A task function declaration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDecl {
    /// Description for task help
    #[serde(default, alias = "description")]
    pub desc: Option<String>,

    /// Run at most once per invocation
    #[serde(default = "default_true")]
    pub once: bool,

    /// Append to an already defined task
    #[serde(default)]
    pub extend: bool,

    /// Tasks to run first
    #[serde(default, deserialize_with = "string_or_list")]
    pub depends: Vec<String>,

    /// Task default variables
    #[serde(default)]
    pub vars: YamlVars,

    /// Body steps
    #[serde(default, deserialize_with = "deserialize_steps")]
    pub run: Vec<StepDecl>,
}

/// A body step - a plain command or a step with options
#[derive(Debug, Clone)]
pub enum StepDecl {
    /// Simple string command
    Simple(String),

    /// Step with conditions and one action
    Complex(Box<StepItem>),
}

/// A step with conditions and exactly one action
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepItem {
    /// Conditions that must all hold for the step to run
    #[serde(default)]
    pub when: Vec<When>,

    /// Run a command
    #[serde(default)]
    pub run: Option<RunDecl>,

    /// Capture a command's stdout into `into`
    #[serde(default)]
    pub capture: Option<String>,

    /// Variable receiving a run/capture/call result
    #[serde(default)]
    pub into: Option<String>,

    /// Call another task
    #[serde(default)]
    pub task: Option<SubTask>,

    /// Call a registered function; `vars` become its arguments
    #[serde(default)]
    pub call: Option<SubTask>,

    /// Assign variables in the task scope
    #[serde(default)]
    pub set: Option<YamlVars>,

    /// Print a message to stdout
    #[serde(default)]
    pub echo: Option<String>,

    /// Print a message to stderr
    #[serde(default)]
    pub error: Option<String>,

    /// Abort the run with a message
    #[serde(default)]
    pub abort: Option<String>,

    /// Exit code for `abort`
    #[serde(default)]
    pub code: Option<i32>,

    /// End the run with an exit code
    #[serde(default)]
    pub exit: Option<i32>,
}

impl StepItem {
    /// Names of the actions present on this step
    pub fn actions(&self) -> Vec<&'static str> {
        let mut actions = Vec::new();
        if self.run.is_some() {
            actions.push("run");
        }
        if self.capture.is_some() {
            actions.push("capture");
        }
        if self.task.is_some() {
            actions.push("task");
        }
        if self.call.is_some() {
            actions.push("call");
        }
        if self.set.is_some() {
            actions.push("set");
        }
        if self.echo.is_some() {
            actions.push("echo");
        }
        if self.error.is_some() {
            actions.push("error");
        }
        if self.abort.is_some() {
            actions.push("abort");
        }
        if self.exit.is_some() {
            actions.push("exit");
        }
        actions
    }
}

/// A command to run
#[derive(Debug, Clone)]
pub enum RunDecl {
    /// Simple string command
    Simple(String),

    /// Command with run options
    Complex(RunDetail),
}

/// Detailed run specification
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunDetail {
    /// The command to execute
    pub cmd: String,

    /// Suppress echo; defaults to `_QUIET_`
    #[serde(default)]
    pub quiet: Option<bool>,

    /// Fail the run on an unaccepted return code
    #[serde(default = "default_true")]
    pub abort: bool,

    /// Streams to capture
    #[serde(default)]
    pub capture: Capture,

    /// Accepted return codes
    #[serde(default = "default_retvals")]
    pub retvals: Vec<i32>,

    /// Apply `_SHELLFILTER_`
    #[serde(default = "default_true")]
    pub filter: bool,
}

/// A reference to a task or function to call
#[derive(Debug, Clone)]
pub enum SubTask {
    /// Simple task name
    Simple(String),

    /// Task name with call-site variables
    Complex(SubTaskDetail),
}

impl SubTask {
    pub fn name(&self) -> &str {
        match self {
            SubTask::Simple(name) => name,
            SubTask::Complex(detail) => &detail.name,
        }
    }
}

/// Detailed task or function call
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubTaskDetail {
    /// Name of the task or function
    pub name: String,

    /// Variables passed to the task, or function arguments
    #[serde(default)]
    pub vars: YamlVars,
}

/// A conditional expression
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct When {
    /// Check if values are equal
    #[serde(default)]
    pub equal: Option<WhenComparison>,

    /// Check if values are not equal
    #[serde(rename = "not-equal", default)]
    pub not_equal: Option<WhenComparison>,

    /// Check if a command succeeds
    #[serde(default)]
    pub command: Option<String>,

    /// Check if a variable is set
    #[serde(default)]
    pub set: Option<String>,

    /// Check if a variable is not set
    #[serde(rename = "not-set", default)]
    pub not_set: Option<String>,

    /// Check if a path exists
    #[serde(default)]
    pub exists: Option<String>,
}

impl When {
    /// Number of checks present (exactly one is expected)
    pub fn checks(&self) -> usize {
        [
            self.equal.is_some(),
            self.not_equal.is_some(),
            self.command.is_some(),
            self.set.is_some(),
            self.not_set.is_some(),
            self.exists.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// A comparison for when conditions
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhenComparison {
    /// Left-hand side of comparison
    pub left: String,

    /// Right-hand side of comparison
    pub right: String,
}

/// Re-deserialize a buffered YAML node as `T`
fn from_yaml<'de, T, D>(value: Yaml) -> Result<T, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    T::deserialize(value).map_err(D::Error::custom)
}

impl<'de> Deserialize<'de> for TaskDecls {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Yaml::deserialize(deserializer)? {
            Yaml::Sequence(seq) => seq
                .into_iter()
                .map(from_yaml::<TaskDecl, D>)
                .collect::<Result<_, _>>()
                .map(TaskDecls::Many),
            // A bare `name:` declares an empty task
            Yaml::Null => from_yaml::<_, D>(Yaml::Mapping(Default::default())).map(TaskDecls::One),
            other => from_yaml::<_, D>(other).map(TaskDecls::One),
        }
    }
}

impl<'de> Deserialize<'de> for StepDecl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Yaml::deserialize(deserializer)? {
            Yaml::String(command) => Ok(StepDecl::Simple(command)),
            value @ Yaml::Mapping(_) => {
                from_yaml::<StepItem, D>(value).map(|item| StepDecl::Complex(Box::new(item)))
            }
            _ => Err(D::Error::custom("a step must be a command string or a mapping")),
        }
    }
}

impl<'de> Deserialize<'de> for RunDecl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Yaml::deserialize(deserializer)? {
            Yaml::String(command) => Ok(RunDecl::Simple(command)),
            other => from_yaml::<_, D>(other).map(RunDecl::Complex),
        }
    }
}

impl<'de> Deserialize<'de> for SubTask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Yaml::deserialize(deserializer)? {
            Yaml::String(name) => Ok(SubTask::Simple(name)),
            other => from_yaml::<_, D>(other).map(SubTask::Complex),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retvals() -> Vec<i32> {
    vec![0]
}

/// Accept either a single string or a list of strings
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Yaml::deserialize(deserializer)? {
        Yaml::String(s) => Ok(vec![s]),
        Yaml::Sequence(seq) => seq.into_iter().map(from_yaml::<String, D>).collect(),
        Yaml::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("expected a string or a list of strings")),
    }
}

/// Custom deserializer for steps that handles both single values and arrays
fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<StepDecl>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Yaml::deserialize(deserializer)?;

    match value {
        // Single string command
        Yaml::String(s) => Ok(vec![StepDecl::Simple(s)]),
        // Single step mapping
        Yaml::Mapping(_) => Ok(vec![from_yaml::<StepDecl, D>(value)?]),
        // Array of steps
        Yaml::Sequence(seq) => seq.into_iter().map(from_yaml::<StepDecl, D>).collect(),
        // Null or not present
        Yaml::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("run must be a string, a step, or a list of steps")),
    }
}
