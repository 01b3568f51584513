//! Named helper functions callable from task bodies

use crate::error::{Error, Result};
use crate::runner::{Context, Value};
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::debug;

/// Named arguments passed to a function, already substituted
pub type FuncArgs = IndexMap<String, Value>;

/// A registered function
pub type FunctionFn = Rc<dyn Fn(&mut Context, &FuncArgs) -> Result<Value>>;

/// Registry of functions reachable through [`Context::callfunc`]
#[derive(Default)]
pub struct FunctionRegistry {
    functions: IndexMap<String, FunctionFn>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function; a name may only be registered once
    pub fn register<F>(&mut self, name: &str, function: F) -> Result<()>
    where
        F: Fn(&mut Context, &FuncArgs) -> Result<Value> + 'static,
    {
        if self.functions.contains_key(name) {
            return Err(Error::FunctionAlreadyDefined(name.to_string()));
        }
        debug!(function = %name, "registered function");
        self.functions.insert(name.to_string(), Rc::new(function));
        Ok(())
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Result<FunctionFn> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| Error::FunctionNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}
