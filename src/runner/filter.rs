//! Named substitution filters

use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::debug;

/// A filter transform
pub type FilterFn = Rc<dyn Fn(&str) -> String>;

/// Registry of filters available to `$(NAME|filter)` substitutions
#[derive(Default)]
pub struct FilterRegistry {
    filters: IndexMap<String, FilterFn>,
}

impl FilterRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in filters
    ///
    /// - `shell`: quote for a POSIX shell
    /// - `upper`, `lower`, `trim`
    /// - `escape`: double every `$` so the text survives another substitution
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, fn(&str) -> String); 5] = [
            ("shell", shell_quote),
            ("upper", str::to_uppercase),
            ("lower", str::to_lowercase),
            ("trim", |s| s.trim().to_string()),
            ("escape", crate::runner::escape),
        ];
        for (name, transform) in builtins {
            registry.filters.insert(name.to_string(), Rc::new(transform));
        }
        registry
    }

    /// Register a filter; a name may only be registered once
    pub fn register<F>(&mut self, name: &str, transform: F) -> Result<()>
    where
        F: Fn(&str) -> String + 'static,
    {
        if self.filters.contains_key(name) {
            return Err(Error::FilterAlreadyDefined(name.to_string()));
        }
        debug!(filter = %name, "registered filter");
        self.filters.insert(name.to_string(), Rc::new(transform));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    /// Apply one filter by name
    pub fn apply(&self, name: &str, value: &str) -> Result<String> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| Error::FilterNotFound(name.to_string()))?;
        Ok(filter(value))
    }

    /// Apply filters left to right; empty names are skipped
    pub fn apply_chain<'a, I>(&self, value: &str, names: I) -> Result<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut result = value.to_string();
        for name in names {
            if name.is_empty() {
                continue;
            }
            result = self.apply(name, &result)?;
        }
        Ok(result)
    }
}

/// Quote a string for a POSIX shell, leaving plain words untouched
pub fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r#"'"'"'"#))
    }
}
