//! Body steps of tasks declared in a task file

use crate::config::{vars, RunDecl, StepDecl, StepItem, SubTask};
use crate::error::{ConfigError, ConfigResult, Result};
use crate::runner::{
    chomp, evaluate_conditions, Capture, Condition, Context, FuncArgs, RunOptions, TaskBody,
    Value, VarMap,
};
use std::rc::Rc;
use tracing::debug;

/// What a step does
#[derive(Debug, Clone)]
pub enum Action {
    /// Run a command; `into` receives the captured text, or the return code
    /// when nothing is captured
    Run {
        command: String,
        options: RunOptions,
        into: Option<String>,
    },
    /// Capture stdout into a variable
    Capture { command: String, into: String },
    Task { name: String, vars: VarMap },
    /// Call a registered function; arguments are substituted at call time
    Call {
        name: String,
        args: FuncArgs,
        into: Option<String>,
    },
    Set(VarMap),
    Echo(String),
    Error(String),
    Abort { message: String, code: Option<i32> },
    Exit(i32),
}

/// A guarded action
#[derive(Debug, Clone)]
pub struct Step {
    pub when: Vec<Condition>,
    pub action: Action,
}

impl Step {
    /// Build a step from its task file declaration
    pub fn from_config(decl: StepDecl) -> ConfigResult<Self> {
        match decl {
            StepDecl::Simple(command) => Ok(Step {
                when: Vec::new(),
                action: Action::Run {
                    command,
                    options: RunOptions::new(),
                    into: None,
                },
            }),
            StepDecl::Complex(item) => Self::from_item(*item),
        }
    }

    fn from_item(item: StepItem) -> ConfigResult<Self> {
        let actions = item.actions();
        match actions.as_slice() {
            [_] => {}
            [] => return Err(ConfigError::Invalid("step has no action".to_string())),
            many => {
                return Err(ConfigError::Invalid(format!(
                    "step has more than one action: {}",
                    many.join(", ")
                )))
            }
        }
        if item.into.is_some() && item.run.is_none() && item.capture.is_none() && item.call.is_none()
        {
            return Err(ConfigError::Invalid(
                "'into' needs a 'run', 'capture' or 'call' step".to_string(),
            ));
        }
        if item.code.is_some() && item.abort.is_none() {
            return Err(ConfigError::Invalid(
                "'code' is only valid on an 'abort' step".to_string(),
            ));
        }

        let when = item.when.into_iter().map(Condition::from_config).collect();

        let action = if let Some(run) = item.run {
            let (command, options) = match run {
                RunDecl::Simple(command) => (command, RunOptions::new()),
                RunDecl::Complex(detail) => {
                    let mut options = RunOptions::new()
                        .abort(detail.abort)
                        .capture(detail.capture)
                        .retvals(detail.retvals)
                        .filter(detail.filter);
                    options.quiet = detail.quiet;
                    (detail.cmd, options)
                }
            };
            Action::Run {
                command,
                options,
                into: item.into,
            }
        } else if let Some(command) = item.capture {
            let into = item.into.ok_or_else(|| {
                ConfigError::Invalid("'capture' step needs 'into'".to_string())
            })?;
            Action::Capture { command, into }
        } else if let Some(task) = item.task {
            match task {
                SubTask::Simple(name) => Action::Task {
                    name,
                    vars: VarMap::new(),
                },
                SubTask::Complex(detail) => Action::Task {
                    vars: vars::to_varmap(&detail.vars)?,
                    name: detail.name,
                },
            }
        } else if let Some(call) = item.call {
            let (name, args) = match call {
                SubTask::Simple(name) => (name, FuncArgs::new()),
                SubTask::Complex(detail) => {
                    let args = detail
                        .vars
                        .iter()
                        .map(|(arg, yaml)| Ok((arg.clone(), vars::to_value(arg, yaml)?)))
                        .collect::<ConfigResult<FuncArgs>>()?;
                    (detail.name, args)
                }
            };
            Action::Call {
                name,
                args,
                into: item.into,
            }
        } else if let Some(set) = item.set {
            Action::Set(vars::to_varmap(&set)?)
        } else if let Some(message) = item.echo {
            Action::Echo(message)
        } else if let Some(message) = item.error {
            Action::Error(message)
        } else if let Some(message) = item.abort {
            Action::Abort {
                message,
                code: item.code,
            }
        } else if let Some(code) = item.exit {
            Action::Exit(code)
        } else {
            return Err(ConfigError::Invalid("step has no action".to_string()));
        };

        Ok(Step { when, action })
    }

    /// Run the step if all of its conditions hold
    pub fn execute(&self, ctx: &mut Context) -> Result<()> {
        if !evaluate_conditions(&self.when, ctx)? {
            debug!(task = ?ctx.current_task(), "step skipped by condition");
            return Ok(());
        }

        match &self.action {
            Action::Run {
                command,
                options,
                into,
            } => {
                let result = ctx.run(command, options)?;
                if let Some(name) = into {
                    let value = match options.capture {
                        Capture::None => Value::Int(result.code.map(i64::from).unwrap_or(-1)),
                        Capture::Stderr => {
                            Value::Literal(chomp(result.stderr.as_deref().unwrap_or("")).to_string())
                        }
                        Capture::Stdout | Capture::Both => {
                            Value::Literal(chomp(result.stdout.as_deref().unwrap_or("")).to_string())
                        }
                    };
                    ctx.env.set(name, value)?;
                }
                Ok(())
            }
            Action::Capture { command, into } => {
                let output = ctx.capture(command, &RunOptions::new().quiet(true))?;
                ctx.env.set(into, Value::Literal(chomp(&output).to_string()))
            }
            Action::Task { name, vars } => ctx.calltask(name, vars),
            Action::Call { name, args, into } => {
                let args = args
                    .iter()
                    .map(|(arg, value)| Ok((arg.clone(), ctx.subst(value)?)))
                    .collect::<Result<FuncArgs>>()?;
                let value = ctx.callfunc(name, &args)?;
                match into {
                    Some(into) => ctx.env.set(into, value),
                    None => Ok(()),
                }
            }
            Action::Set(vars) => ctx.env.update(vars),
            Action::Echo(message) => ctx.outputln(message),
            Action::Error(message) => ctx.errorln(message),
            Action::Abort { message, code } => Err(ctx.abort(message, *code)),
            Action::Exit(code) => Err(ctx.exit(*code)),
        }
    }

    /// Name of the task this step calls, if any
    pub fn called_task(&self) -> Option<&str> {
        match &self.action {
            Action::Task { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Compile declared steps into a task body
pub fn body(steps: Vec<Step>) -> TaskBody {
    Rc::new(move |ctx: &mut Context| {
        for step in &steps {
            step.execute(ctx)?;
        }
        Ok(())
    })
}

/// Build every step of a declaration
pub fn steps_from_config(decls: Vec<StepDecl>) -> ConfigResult<Vec<Step>> {
    decls.into_iter().map(Step::from_config).collect()
}
