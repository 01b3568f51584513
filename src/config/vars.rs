//! Variable declarations in a task file
//!
//! Plain YAML scalars, lists and mappings become values. Tags select the
//! assignment form:
//!
//! | YAML                                   | assignment            |
//! |----------------------------------------|-----------------------|
//! | `~`                                    | delete                |
//! | `!default VALUE`                       | default               |
//! | `!delete`                              | delete                |
//! | `!lock VALUE`                          | locked                |
//! | `!describe { desc: TEXT, value: .. }`  | description           |
//! | `!delayed { capture: CMD, once: B }`   | delayed capture       |
//! | `!literal TEXT`                        | never substituted     |

use crate::config::YamlVars;
use crate::error::{ConfigError, ConfigResult};
use crate::runner::{chomp, RunOptions, Value, VarMap, Wrapped};
use indexmap::IndexMap;
use serde_yaml::Value as Yaml;

/// Convert every declaration, keeping file order
pub fn to_varmap(vars: &YamlVars) -> ConfigResult<VarMap> {
    vars.iter()
        .map(|(name, yaml)| Ok((name.clone(), to_wrapped(name, yaml)?)))
        .collect()
}

/// Convert one declaration into an assignment
pub fn to_wrapped(name: &str, yaml: &Yaml) -> ConfigResult<Wrapped> {
    let Yaml::Tagged(tagged) = yaml else {
        return match yaml {
            Yaml::Null => Ok(Wrapped::Delete),
            _ => Ok(Wrapped::Value(to_value(name, yaml)?)),
        };
    };

    let tag = tagged.tag.to_string();
    let inner = &tagged.value;
    match tag.trim_start_matches('!') {
        "default" => Ok(Wrapped::Default(to_value(name, inner)?)),
        "delete" => Ok(Wrapped::Delete),
        "lock" => Ok(Wrapped::Locked(to_value(name, inner)?)),
        "literal" => Ok(Wrapped::Value(to_value(name, yaml)?)),
        "describe" => {
            let desc = field(inner, "desc")
                .and_then(Yaml::as_str)
                .ok_or_else(|| invalid(name, "!describe needs a 'desc' string"))?;
            let value = match field(inner, "value") {
                Some(value) => to_wrapped(name, value)?,
                None => Wrapped::NoChange,
            };
            Ok(Wrapped::describe(desc, value))
        }
        "delayed" => delayed(name, inner),
        other => Err(invalid(name, &format!("unknown tag !{}", other))),
    }
}

/// Convert a YAML value into a runtime value
///
/// Nested nulls become empty strings; only `!literal` is accepted as a tag.
pub fn to_value(name: &str, yaml: &Yaml) -> ConfigResult<Value> {
    match yaml {
        Yaml::Null => Ok(Value::Str(String::new())),
        Yaml::Bool(b) => Ok(Value::Bool(*b)),
        Yaml::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => Ok(Value::Float(n.as_f64().unwrap_or_default())),
        },
        Yaml::String(s) => Ok(Value::Str(s.clone())),
        Yaml::Sequence(items) => items
            .iter()
            .map(|item| to_value(name, item))
            .collect::<ConfigResult<Vec<_>>>()
            .map(Value::List),
        Yaml::Mapping(mapping) => {
            let mut map = IndexMap::new();
            for (key, value) in mapping {
                map.insert(to_value(name, key)?.to_string(), to_value(name, value)?);
            }
            Ok(Value::Map(map))
        }
        Yaml::Tagged(tagged) => {
            if tagged.tag.to_string().trim_start_matches('!') != "literal" {
                return Err(invalid(
                    name,
                    &format!("tag {} is only allowed at the top of a declaration", tagged.tag),
                ));
            }
            match to_value(name, &tagged.value)? {
                Value::Str(s) => Ok(Value::Literal(s)),
                other => Ok(Value::Literal(other.to_string())),
            }
        }
    }
}

/// `!delayed CMD` or `!delayed { capture: CMD, once: BOOL }`
fn delayed(name: &str, yaml: &Yaml) -> ConfigResult<Wrapped> {
    let (command, once) = match yaml {
        Yaml::String(command) => (command.clone(), true),
        Yaml::Mapping(_) => {
            let command = field(yaml, "capture")
                .and_then(Yaml::as_str)
                .ok_or_else(|| invalid(name, "!delayed needs a 'capture' command"))?;
            let once = match field(yaml, "once") {
                Some(once) => once
                    .as_bool()
                    .ok_or_else(|| invalid(name, "!delayed 'once' must be a boolean"))?,
                None => true,
            };
            (command.to_string(), once)
        }
        _ => return Err(invalid(name, "!delayed needs a command")),
    };

    Ok(Wrapped::delayed(
        move |ctx| {
            let output = ctx.capture(&command, &RunOptions::new().quiet(true))?;
            Ok(Value::Literal(chomp(&output).to_string()))
        },
        once,
    ))
}

fn field<'a>(yaml: &'a Yaml, key: &str) -> Option<&'a Yaml> {
    yaml.as_mapping().and_then(|mapping| mapping.get(key))
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidVariable {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
