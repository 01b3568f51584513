//! Task file discovery, parsing and loading

use crate::config::schema::{detect_circular_dependencies, validate_references, validate_task_file};
use crate::config::types::{FilterDecl, TaskFile};
use crate::config::vars::to_varmap;
use crate::error::{ConfigError, ConfigResult, Result};
use crate::runner::{body, steps_from_config, Context, TaskOptions, Verbose, Wrapped};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default task file names to search for
pub const TASK_FILE_NAMES: &[&str] = &["TaskFile.yml", "TaskFile.yaml", "TaskFile"];

/// Find the task file in `start_dir`, or in its ancestors when `walk` is set
///
/// `name` replaces the default file names.
pub fn find_task_file(start_dir: &Path, name: Option<&str>, walk: bool) -> ConfigResult<PathBuf> {
    let names: Vec<&str> = match name {
        Some(name) => vec![name],
        None => TASK_FILE_NAMES.to_vec(),
    };

    let mut current_dir = start_dir.to_path_buf();
    let mut searched_paths = Vec::new();

    loop {
        for file_name in &names {
            let path = current_dir.join(file_name);
            searched_paths.push(path.display().to_string());

            if path.is_file() {
                return Ok(path);
            }
        }

        if !walk {
            return Err(ConfigError::NotFound(searched_paths.join(", ")));
        }

        // Try parent directory
        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a task file from a path
pub fn parse_task_file(path: &Path) -> Result<TaskFile> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read {}: {}", path.display(), e)))?;

    parse_task_file_str(&contents)
}

/// Parse a task file from a string
pub fn parse_task_file_str(yaml: &str) -> Result<TaskFile> {
    let file: TaskFile = serde_yaml::from_str(yaml)?;
    validate_task_file(&file)?;
    Ok(file)
}

/// Load a task file and everything it includes into the context
///
/// Each file applies, in order: env-files, vars, filters, tasks, includes.
/// Task references are validated once the whole set is loaded, and so are
/// main variables the files have since locked.
pub fn load_task_file(ctx: &mut Context, path: &Path) -> Result<()> {
    let mut loader = Loader {
        ctx,
        loaded: Vec::new(),
        references: Vec::new(),
    };
    loader.load(path)?;

    validate_references(&loader.ctx.tasks, &loader.references)?;
    detect_circular_dependencies(&loader.ctx.tasks, &loader.references)?;
    loader.ctx.check_main_vars()
}

struct Loader<'a> {
    ctx: &'a mut Context,
    /// Files already loaded, canonicalized
    loaded: Vec<PathBuf>,
    /// (task, referenced task) pairs from `depends` and `task` steps
    references: Vec<(String, String)>,
}

impl Loader<'_> {
    fn load(&mut self, path: &Path) -> Result<()> {
        let canonical = path.canonicalize()?;
        if self.loaded.contains(&canonical) {
            warn!(path = %path.display(), "task file already loaded, skipping");
            return Ok(());
        }
        self.loaded.push(canonical);

        if self.ctx.is_verbose(Verbose::Load) {
            eprintln!("loading {}", path.display());
        }
        debug!(path = %path.display(), "loading task file");

        let file = if self.loaded.len() == 1 {
            parse_task_file(path)?
        } else {
            parse_task_file(path).map_err(|e| ConfigError::IncludeFile {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?
        };
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        self.load_env_files(base_dir, &file.env_files)?;
        self.ctx.env.update(&to_varmap(&file.vars)?)?;
        for (name, filter) in &file.filters {
            self.register_filter(name, filter)?;
        }

        for (name, decls) in file.tasks {
            for decl in decls.into_vec() {
                for depends in &decl.depends {
                    self.references.push((name.clone(), depends.clone()));
                }

                let steps = steps_from_config(decl.run)?;
                for called in steps.iter().filter_map(|step| step.called_task()) {
                    self.references.push((name.clone(), called.to_string()));
                }

                let mut options = TaskOptions::new()
                    .with_once(decl.once)
                    .with_extend(decl.extend)
                    .with_depends(decl.depends)
                    .with_vars(to_varmap(&decl.vars)?);
                if let Some(desc) = decl.desc {
                    options = options.with_description(desc);
                }
                self.ctx.tasks.register_body(&name, body(steps), options)?;
            }
        }

        for pattern in &file.include {
            for include in expand_include(base_dir, pattern)? {
                self.load(&include)?;
            }
        }

        Ok(())
    }

    /// Assign dotenv entries as defaults; missing files are skipped
    fn load_env_files(&mut self, base_dir: &Path, env_files: &[String]) -> Result<()> {
        for env_file in env_files {
            let path = base_dir.join(env_file);
            if !path.is_file() {
                debug!(path = %path.display(), "env file not found, skipping");
                continue;
            }

            let entries = dotenvy::from_path_iter(&path).map_err(|e| env_file_error(&path, e))?;
            for entry in entries {
                let (name, value) = entry.map_err(|e| env_file_error(&path, e))?;
                self.ctx.env.set(&name, Wrapped::default_value(value))?;
            }
        }
        Ok(())
    }

    fn register_filter(&mut self, name: &str, filter: &FilterDecl) -> Result<()> {
        let pattern = Regex::new(&filter.pattern).map_err(|e| {
            ConfigError::Invalid(format!("filter '{}' has an invalid pattern: {}", name, e))
        })?;
        let replace = filter.replace.clone();
        self.ctx.filters.register(name, move |text| {
            pattern.replace_all(text, replace.as_str()).into_owned()
        })
    }
}

/// Resolve an include pattern relative to the including file, sorted
fn expand_include(base_dir: &Path, pattern: &str) -> ConfigResult<Vec<PathBuf>> {
    let full = base_dir.join(pattern);
    let full_pattern = full.to_string_lossy();
    let include_error = |error: String| ConfigError::IncludeFile {
        path: full.clone(),
        error,
    };

    let mut paths = glob::glob(&full_pattern)
        .map_err(|e| include_error(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| include_error(e.to_string()))?;

    // A plain file name must exist; a pattern may match nothing
    let is_pattern = pattern.contains(['*', '?', '[']);
    if paths.is_empty() && !is_pattern {
        return Err(include_error("file not found".to_string()));
    }

    paths.sort();
    Ok(paths)
}

fn env_file_error(path: &Path, error: dotenvy::Error) -> ConfigError {
    ConfigError::IncludeFile {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}
