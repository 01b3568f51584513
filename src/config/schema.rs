//! Task file validation
//!
//! Shape checks run on each parsed file; reference and cycle checks run on
//! the task registry once every file is loaded.

use crate::config::types::{StepDecl, TaskFile};
use crate::error::{ConfigError, ConfigResult};
use crate::runner::TaskRegistry;
use std::collections::HashSet;

/// Validate the shape of a parsed task file
pub fn validate_task_file(file: &TaskFile) -> ConfigResult<()> {
    for (name, decls) in &file.tasks {
        validate_task_name(name)?;

        for decl in decls.iter() {
            for step in &decl.run {
                validate_step(name, step)?;
            }
        }
    }
    Ok(())
}

/// Task names are used on the command line as `TASK:NAME=VALUE`
fn validate_task_name(name: &str) -> ConfigResult<()> {
    if name.is_empty() || name.contains([':', '=']) || name.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!(
            "Invalid task name '{}': names may not be empty or contain ':', '=' or whitespace",
            name
        )));
    }
    Ok(())
}

fn validate_step(task: &str, step: &StepDecl) -> ConfigResult<()> {
    let StepDecl::Complex(item) = step else {
        return Ok(());
    };

    let actions = item.actions();
    if actions.len() != 1 {
        return Err(ConfigError::Invalid(format!(
            "A step of task '{}' must have exactly one action, found {}",
            task,
            if actions.is_empty() {
                "none".to_string()
            } else {
                actions.join(", ")
            }
        )));
    }

    for when in &item.when {
        if when.checks() != 1 {
            return Err(ConfigError::Invalid(format!(
                "A condition of task '{}' must have exactly one check",
                task
            )));
        }
    }
    Ok(())
}

/// Check that every referenced task is registered
pub fn validate_references(tasks: &TaskRegistry, references: &[(String, String)]) -> ConfigResult<()> {
    for (task, referenced) in references {
        if !tasks.contains(referenced) {
            return Err(ConfigError::UnknownDependency {
                task: task.clone(),
                depends: referenced.clone(),
            });
        }
    }
    Ok(())
}

/// Detect cycles through `depends` lists and task calls
///
/// `calls` holds (caller, callee) pairs from `task` steps. A cycle would
/// recurse without bound: a `once` record is only marked as run after its
/// body completes.
pub fn detect_circular_dependencies(
    tasks: &TaskRegistry,
    calls: &[(String, String)],
) -> ConfigResult<()> {
    let mut visited = HashSet::new();
    for task_name in tasks.names() {
        let mut stack = Vec::new();
        check_task_cycle(tasks, calls, task_name, &mut visited, &mut stack)?;
    }
    Ok(())
}

/// Recursively check for cycles in task dependencies
fn check_task_cycle(
    tasks: &TaskRegistry,
    calls: &[(String, String)],
    task_name: &str,
    visited: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> ConfigResult<()> {
    // Check if we've found a cycle
    if stack.iter().any(|name| name == task_name) {
        stack.push(task_name.to_string());
        return Err(ConfigError::CircularDependency(stack.join(" -> ")));
    }

    // Skip if already fully processed
    if visited.contains(task_name) {
        return Ok(());
    }

    // Unknown names are reported by validate_references
    let Ok(records) = tasks.entries(task_name) else {
        return Ok(());
    };

    stack.push(task_name.to_string());
    let called = calls
        .iter()
        .filter(|(caller, _)| caller == task_name)
        .map(|(_, callee)| callee);
    for next in records.iter().flat_map(|record| &record.depends).chain(called) {
        check_task_cycle(tasks, calls, next, visited, stack)?;
    }

    // Remove from stack and mark as visited
    stack.pop();
    visited.insert(task_name.to_string());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::runner::{Context, TaskOptions};

    fn noop(_: &mut Context) -> Result<()> {
        Ok(())
    }

    fn parse(yaml: &str) -> TaskFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_validate_valid_file() {
        let file = parse(
            r#"
tasks:
  test:
    desc: Test task
    run:
      - echo test
      - when:
          - set: X
        echo: x is set
"#,
        );
        assert!(validate_task_file(&file).is_ok());
    }

    #[test]
    fn test_step_with_two_actions() {
        let file = parse("tasks:\n  t:\n    run:\n      - echo: a\n        exit: 1\n");
        let err = validate_task_file(&file).unwrap_err();
        assert!(err.to_string().contains("echo, exit"));
    }

    #[test]
    fn test_condition_with_two_checks() {
        let file = parse(
            "tasks:\n  t:\n    run:\n      - when:\n          - set: A\n            not-set: B\n        echo: x\n",
        );
        assert!(matches!(
            validate_task_file(&file),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_task_names() {
        for name in ["a:b", "a=b", "a b"] {
            let file = parse(&format!("tasks:\n  '{}':\n    run: echo\n", name));
            assert!(validate_task_file(&file).is_err(), "accepted {}", name);
        }
    }

    #[test]
    fn test_unknown_reference() {
        let mut tasks = TaskRegistry::new();
        tasks.register("a", noop, TaskOptions::new()).unwrap();

        let ok = vec![("a".to_string(), "a".to_string())];
        assert!(validate_references(&tasks, &ok).is_ok());

        let missing = vec![("a".to_string(), "b".to_string())];
        assert!(matches!(
            validate_references(&tasks, &missing),
            Err(ConfigError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_detect_circular_dependency() {
        let mut tasks = TaskRegistry::new();
        tasks
            .register("a", noop, TaskOptions::new().with_depends(["b"]))
            .unwrap();
        tasks
            .register("b", noop, TaskOptions::new().with_depends(["c"]))
            .unwrap();
        tasks.register("c", noop, TaskOptions::new()).unwrap();
        assert!(detect_circular_dependencies(&tasks, &[]).is_ok());

        // an extending record closes the loop
        tasks
            .register(
                "c",
                noop,
                TaskOptions::new().with_extend(true).with_depends(["a"]),
            )
            .unwrap();
        let err = detect_circular_dependencies(&tasks, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::CircularDependency(ref path) if path == "a -> b -> c -> a"));
    }

    #[test]
    fn test_shared_dependency_is_not_a_cycle() {
        let mut tasks = TaskRegistry::new();
        tasks.register("base", noop, TaskOptions::new()).unwrap();
        tasks
            .register("x", noop, TaskOptions::new().with_depends(["base"]))
            .unwrap();
        tasks
            .register("y", noop, TaskOptions::new().with_depends(["base", "x"]))
            .unwrap();
        assert!(detect_circular_dependencies(&tasks, &[]).is_ok());
    }

    #[test]
    fn test_cycle_through_task_calls() {
        let mut tasks = TaskRegistry::new();
        tasks.register("a", noop, TaskOptions::new()).unwrap();
        tasks
            .register("b", noop, TaskOptions::new().with_depends(["a"]))
            .unwrap();

        let calls = vec![("a".to_string(), "b".to_string())];
        let err = detect_circular_dependencies(&tasks, &calls).unwrap_err();
        assert!(matches!(err, ConfigError::CircularDependency(ref path) if path == "a -> b -> a"));

        let one_way = vec![("b".to_string(), "a".to_string())];
        assert!(detect_circular_dependencies(&tasks, &one_way).is_ok());
    }
}
