//! Main CLI application

use crate::config::{find_task_file, load_task_file, TASK_FILE_NAMES};
use crate::error::{ConfigError, ConfigResult, Result};
use crate::runner::{Context, Value, VarMap, Verbose, Wrapped};
use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use directories::ProjectDirs;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Task file directory used by `--system`
const SYSTEM_DIR: &str = "/etc/taskrun";

/// Parsed command line flags
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Task file name replacing the defaults
    pub file: Option<String>,
    /// Directory to start searching from
    pub dir: PathBuf,
    pub walk: bool,
    pub list: bool,
    pub verbose: Vec<Verbose>,
    pub var_help: bool,
    pub task_help: bool,
    pub params: Vec<String>,
}

/// Positional parameters split into main variables and task requests
#[derive(Debug, Default)]
pub struct Params {
    /// `NAME=VALUE`
    pub vars: VarMap,
    /// `TASK` or `TASK:NAME=VALUE[:NAME=VALUE...]`, in command line order
    pub tasks: Vec<(String, VarMap)>,
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("taskrun")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run tasks declared in a YAML task file")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("NAME")
                .help(format!(
                    "Alternative task file name [default: {}]",
                    TASK_FILE_NAMES.join(", ")
                )),
        )
        .arg(
            Arg::new("dir")
                .short('d')
                .long("dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory to start searching from"),
        )
        .arg(
            Arg::new("system")
                .short('s')
                .long("system")
                .action(ArgAction::SetTrue)
                .help("Use the system task file directory"),
        )
        .arg(
            Arg::new("user")
                .short('u')
                .long("user")
                .action(ArgAction::SetTrue)
                .help("Use the user task file directory"),
        )
        .group(
            ArgGroup::new("location")
                .args(["dir", "system", "user"])
                .multiple(false),
        )
        .arg(
            Arg::new("walk")
                .short('w')
                .long("walk")
                .action(ArgAction::SetTrue)
                .help("Walk up the directory tree to find the task file"),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List tasks"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .value_name("TOPIC")
                .value_parser(value_parser!(Verbose))
                .action(ArgAction::Append)
                .help("Show verbose information"),
        )
        .arg(
            Arg::new("var_help")
                .short('V')
                .action(ArgAction::SetTrue)
                .help("Show variable help"),
        )
        .arg(
            Arg::new("task_help")
                .short('H')
                .action(ArgAction::SetTrue)
                .help("Show task help"),
        )
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .long("version")
                .action(ArgAction::Version)
                .help("Print version"),
        )
        .arg(
            Arg::new("params")
                .value_name("PARAM")
                .num_args(0..)
                .help("TASK, NAME=VALUE, or TASK:NAME=VALUE[:NAME=VALUE...]"),
        )
}

/// Extract options from parsed matches
pub fn options_from_matches(matches: &ArgMatches) -> ConfigResult<Options> {
    let dir = if matches.get_flag("user") {
        ProjectDirs::from("", "", "taskrun")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::NotFound("user configuration directory".to_string()))?
    } else if matches.get_flag("system") {
        PathBuf::from(SYSTEM_DIR)
    } else if let Some(dir) = matches.get_one::<PathBuf>("dir") {
        dir.clone()
    } else {
        env::current_dir()
            .map_err(|e| ConfigError::Invalid(format!("Failed to get current directory: {}", e)))?
    };

    Ok(Options {
        file: matches.get_one::<String>("file").cloned(),
        dir,
        walk: matches.get_flag("walk"),
        list: matches.get_flag("list"),
        verbose: matches
            .get_many::<Verbose>("verbose")
            .map(|topics| topics.copied().collect())
            .unwrap_or_default(),
        var_help: matches.get_flag("var_help"),
        task_help: matches.get_flag("task_help"),
        params: matches
            .get_many::<String>("params")
            .map(|params| params.cloned().collect())
            .unwrap_or_default(),
    })
}

/// Names starting or ending with `_` are reserved for the runner
fn is_special(name: &str) -> bool {
    name.starts_with('_') || name.ends_with('_')
}

fn param_var(vars: &mut VarMap, assignment: &str) -> ConfigResult<()> {
    let Some((name, value)) = assignment.split_once('=') else {
        return Ok(());
    };
    if is_special(name) {
        return Err(ConfigError::SpecialVariable(name.to_string()));
    }
    vars.insert(name.to_string(), Wrapped::from(value));
    Ok(())
}

/// Split positional parameters into main variables and task requests
pub fn parse_params(params: &[String]) -> ConfigResult<Params> {
    let mut parsed = Params::default();

    for param in params {
        if let Some((task, rest)) = param.split_once(':') {
            let mut vars = VarMap::new();
            for assignment in rest.split(':') {
                param_var(&mut vars, assignment)?;
            }
            parsed.tasks.push((task.to_string(), vars));
        } else if param.contains('=') {
            param_var(&mut parsed.vars, param)?;
        } else {
            parsed.tasks.push((param.clone(), VarMap::new()));
        }
    }

    Ok(parsed)
}

/// Assign the task file location variables
fn set_location_vars(ctx: &mut Context, task_file: &Path) -> Result<()> {
    let top = task_file.parent().unwrap_or_else(|| Path::new(""));
    let abstop = if top.as_os_str().is_empty() {
        env::current_dir()?
    } else {
        top.canonicalize()?
    };
    let cwd = env::current_dir()?;

    let path_value = |path: &Path| Value::Literal(path.display().to_string());
    ctx.env.set("_TOP_", path_value(top))?;
    ctx.env.set("_ABSTOP_", path_value(&abstop))?;
    ctx.env.set("ABSTOP", path_value(&abstop))?;
    ctx.env.set("_CWD_", path_value(&cwd))?;
    Ok(())
}

fn show_var_help(ctx: &Context) {
    let mut described: Vec<(&str, &str)> = ctx.env.descriptions().collect();
    described.sort();

    for (name, desc) in described {
        println!("Var: {}", name);
        println!(" Desc: {}", desc);
        if ctx.is_verbose(Verbose::Var) {
            print_current_value(ctx, name, " ");
        }
    }
}

fn show_task_help(ctx: &Context, requested: &[(String, VarMap)]) -> Result<()> {
    let mut names: Vec<String> = if requested.is_empty() {
        ctx.tasks.names().map(str::to_string).collect()
    } else {
        requested.iter().map(|(name, _)| name.clone()).collect()
    };
    names.sort();
    names.dedup();

    for name in names {
        let records = ctx.tasks.entries(&name)?;
        println!("Task: {}", name);
        for (index, record) in records.iter().enumerate() {
            println!(" Entry: {}", index);
            if let Some(desc) = &record.description {
                println!("  Desc: {}", desc);
            }
            for (var, desc) in record.var_descriptions() {
                println!("  Var: {}", var);
                println!("   Desc: {}", desc);
                if ctx.is_verbose(Verbose::Var) {
                    print_current_value(ctx, var, "   ");
                }
            }
        }
    }
    Ok(())
}

fn print_current_value(ctx: &Context, name: &str, indent: &str) {
    if !ctx.env.contains(name) {
        println!("{}Currently unset", indent);
        return;
    }
    match ctx.evaluate(name) {
        Ok(value) => println!("{}Current value: {}", indent, value),
        Err(e) => println!("{}Current value unavailable: {}", indent, e),
    }
}

/// Run the CLI application with the process arguments
pub fn run() -> Result<()> {
    run_from(env::args_os())
}

/// Run the CLI application with provided arguments
pub fn run_from<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command().get_matches_from(args);
    let options = options_from_matches(&matches)?;
    let mut ctx = Context::new().with_verbose(options.verbose.clone());

    if ctx.is_verbose(Verbose::Load) {
        eprintln!("Search directory: {}", options.dir.display());
        eprintln!(
            "Search filename: {}",
            options
                .file
                .clone()
                .unwrap_or_else(|| TASK_FILE_NAMES.join(", "))
        );
        eprintln!("Walk path: {}", options.walk);
    }
    let task_file = find_task_file(&options.dir, options.file.as_deref(), options.walk)?;
    if ctx.is_verbose(Verbose::Load) {
        eprintln!("Task file found: {}", task_file.display());
    }

    let params = parse_params(&options.params)?;
    ctx.set_main_vars(params.vars)?;
    ctx.import_os_env()?;
    set_location_vars(&mut ctx, &task_file)?;
    load_task_file(&mut ctx, &task_file)?;

    if options.list {
        for name in ctx.tasks.names().filter(|name| !name.starts_with('_')) {
            println!("{}", name);
        }
        return Ok(());
    }

    if options.var_help || options.task_help {
        if options.var_help {
            show_var_help(&ctx);
        }
        if options.task_help {
            show_task_help(&ctx, &params.tasks)?;
        }
        return Ok(());
    }

    for (task, vars) in &params.tasks {
        debug!(task = %task, "running requested task");
        ctx.calltask(task, vars)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> ArgMatches {
        build_command().get_matches_from(args.iter().copied())
    }

    #[test]
    fn test_options_defaults() {
        let options = options_from_matches(&matches(&["taskrun"])).unwrap();
        assert_eq!(options.file, None);
        assert!(!options.walk);
        assert!(options.verbose.is_empty());
        assert!(options.params.is_empty());
        assert_eq!(options.dir, env::current_dir().unwrap());
    }

    #[test]
    fn test_options_flags() {
        let options = options_from_matches(&matches(&[
            "taskrun", "-f", "other.yml", "-d", "/tmp", "-w", "-v", "load", "-v", "var", "-V",
            "build", "X=1",
        ]))
        .unwrap();
        assert_eq!(options.file.as_deref(), Some("other.yml"));
        assert_eq!(options.dir, PathBuf::from("/tmp"));
        assert!(options.walk);
        assert!(options.var_help);
        assert_eq!(options.verbose, vec![Verbose::Load, Verbose::Var]);
        assert_eq!(options.params, vec!["build", "X=1"]);
    }

    #[test]
    fn test_location_flags_are_exclusive() {
        let result = build_command().try_get_matches_from(["taskrun", "-s", "-u"]);
        assert!(result.is_err());
        let result = build_command().try_get_matches_from(["taskrun", "-d", "x", "-s"]);
        assert!(result.is_err());

        let options = options_from_matches(&matches(&["taskrun", "-s"])).unwrap();
        assert_eq!(options.dir, PathBuf::from(SYSTEM_DIR));
    }

    #[test]
    fn test_parse_params() {
        let params: Vec<String> = ["A=1", "build", "deploy:ENV=prod:DRY=", "B=x=y"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let parsed = parse_params(&params).unwrap();

        let names: Vec<_> = parsed.vars.keys().cloned().collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(matches!(&parsed.vars["B"], Wrapped::Value(Value::Str(s)) if s == "x=y"));

        assert_eq!(parsed.tasks.len(), 2);
        assert_eq!(parsed.tasks[0].0, "build");
        assert!(parsed.tasks[0].1.is_empty());
        assert_eq!(parsed.tasks[1].0, "deploy");
        assert!(matches!(&parsed.tasks[1].1["ENV"], Wrapped::Value(Value::Str(s)) if s == "prod"));
        assert!(matches!(&parsed.tasks[1].1["DRY"], Wrapped::Value(Value::Str(s)) if s.is_empty()));
    }

    #[test]
    fn test_special_names_rejected() {
        for param in ["_TOP_=x", "task:_X=1", "Y_=2"] {
            let result = parse_params(&[param.to_string()]);
            assert!(
                matches!(result, Err(ConfigError::SpecialVariable(_))),
                "accepted {}",
                param
            );
        }
    }
}
