//! When condition evaluation
//!
//! Steps of a declared task body can be guarded by conditions; this is how
//! command results and variable state feed back into control flow.

use crate::config;
use crate::error::Result;
use crate::runner::{Capture, Context, RunOptions};
use std::path::PathBuf;

/// A single condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equal { left: String, right: String },
    NotEqual { left: String, right: String },
    /// Holds when the command's return code is accepted (0)
    Command(String),
    /// Holds when the variable is set
    Set(String),
    NotSet(String),
    /// Holds when the path exists, relative to `_TOP_`
    Exists(String),
    Always,
}

impl Condition {
    pub fn from_config(config: config::When) -> Self {
        if let Some(eq) = config.equal {
            Condition::Equal {
                left: eq.left,
                right: eq.right,
            }
        } else if let Some(ne) = config.not_equal {
            Condition::NotEqual {
                left: ne.left,
                right: ne.right,
            }
        } else if let Some(cmd) = config.command {
            Condition::Command(cmd)
        } else if let Some(name) = config.set {
            Condition::Set(name)
        } else if let Some(name) = config.not_set {
            Condition::NotSet(name)
        } else if let Some(path) = config.exists {
            Condition::Exists(path)
        } else {
            Condition::Always
        }
    }
}

/// Evaluate a list of conditions (all must be true - AND logic)
pub fn evaluate_conditions(conditions: &[Condition], ctx: &Context) -> Result<bool> {
    for condition in conditions {
        if !evaluate_condition(condition, ctx)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluate a single condition
pub fn evaluate_condition(condition: &Condition, ctx: &Context) -> Result<bool> {
    match condition {
        Condition::Always => Ok(true),

        Condition::Equal { left, right } => Ok(ctx.subst_str(left)? == ctx.subst_str(right)?),

        Condition::NotEqual { left, right } => {
            Ok(ctx.subst_str(left)? != ctx.subst_str(right)?)
        }

        Condition::Command(cmd) => {
            let options = RunOptions::new()
                .quiet(true)
                .abort(false)
                .capture(Capture::Both);
            Ok(ctx.run(cmd, &options)?.succeeded())
        }

        Condition::Set(name) => Ok(ctx.env.contains(&ctx.subst_str(name)?)),

        Condition::NotSet(name) => Ok(!ctx.env.contains(&ctx.subst_str(name)?)),

        Condition::Exists(path) => {
            let path = PathBuf::from(ctx.subst_str(path)?);
            let base = if ctx.env.contains("_TOP_") {
                PathBuf::from(ctx.evaluate("_TOP_")?.to_string())
            } else {
                ctx.working_dir.clone()
            };
            Ok(base.join(path).exists())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn ctx_with(vars: &[(&str, &str)]) -> Context {
        let mut ctx = Context::new();
        for (name, value) in vars {
            ctx.env.set(name, *value).unwrap();
        }
        ctx
    }

    #[test]
    fn test_equal_substitutes_both_sides() {
        let ctx = ctx_with(&[("ENV", "prod"), ("WANT", "prod")]);
        let cond = Condition::Equal {
            left: "$(ENV)".into(),
            right: "$(WANT)".into(),
        };
        assert!(evaluate_condition(&cond, &ctx).unwrap());

        let cond = Condition::NotEqual {
            left: "$(ENV)".into(),
            right: "dev".into(),
        };
        assert!(evaluate_condition(&cond, &ctx).unwrap());
    }

    #[test]
    fn test_command_condition() {
        let ctx = Context::new();
        assert!(evaluate_condition(&Condition::Command("true".into()), &ctx).unwrap());
        assert!(!evaluate_condition(&Condition::Command("false".into()), &ctx).unwrap());
    }

    #[test]
    fn test_set_conditions() {
        let ctx = ctx_with(&[("A", "1")]);
        assert!(evaluate_condition(&Condition::Set("A".into()), &ctx).unwrap());
        assert!(evaluate_condition(&Condition::NotSet("B".into()), &ctx).unwrap());
        assert!(!evaluate_condition(&Condition::Set("B".into()), &ctx).unwrap());
    }

    #[test]
    fn test_exists_relative_to_top() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("here.txt"), "x").unwrap();
        let top = temp_dir.path().display().to_string();
        let ctx = ctx_with(&[("_TOP_", top.as_str())]);

        assert!(evaluate_condition(&Condition::Exists("here.txt".into()), &ctx).unwrap());
        assert!(!evaluate_condition(&Condition::Exists("gone.txt".into()), &ctx).unwrap());
    }

    #[test]
    fn test_all_must_hold() {
        let ctx = ctx_with(&[("A", "1")]);
        let conditions = vec![Condition::Always, Condition::Set("A".into())];
        assert!(evaluate_conditions(&conditions, &ctx).unwrap());

        let conditions = vec![Condition::Set("A".into()), Condition::Set("B".into())];
        assert!(!evaluate_conditions(&conditions, &ctx).unwrap());
    }
}
