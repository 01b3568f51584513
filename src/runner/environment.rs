//! Scoped variable store
//!
//! The environment maps variable names to values plus assignment metadata.
//! Scopes are save/restore frames: the first time a variable is touched while
//! a frame is active its prior state (or absence) is recorded, and popping the
//! frame puts every touched variable back.

use crate::error::{Error, Result};
use crate::runner::{Slot, Value, VarMap, Variable, Wrapped};
use indexmap::IndexMap;
use std::ops::{Deref, DerefMut};
use tracing::{trace, warn};

/// What happens when a locked variable is assigned again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockPolicy {
    /// Every further assignment fails
    #[default]
    Strict,
    /// Re-locking to an identical value is accepted as a no-op
    AllowIdentical,
}

/// One save/restore frame
#[derive(Debug, Default)]
struct Frame {
    saved: IndexMap<String, Option<Variable>>,
}

/// The variable store
#[derive(Debug, Default)]
pub struct Environment {
    vars: IndexMap<String, Variable>,
    frames: Vec<Frame>,
    descriptions: IndexMap<String, String>,
    lock_policy: LockPolicy,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn lock_policy(&self) -> LockPolicy {
        self.lock_policy
    }

    /// Assign a variable, applying the wrapper semantics
    ///
    /// Fails with [`Error::LockedVariable`] without touching any state when
    /// the variable is locked.
    pub fn set(&mut self, name: &str, value: impl Into<Wrapped>) -> Result<()> {
        let value = value.into();
        self.authorize(name, &value)?;
        self.apply(name, value);
        Ok(())
    }

    /// Apply `set` for every entry, in map order
    pub fn update(&mut self, vars: &VarMap) -> Result<()> {
        for (name, value) in vars {
            self.set(name, value.clone())?;
        }
        Ok(())
    }

    /// Check that every entry could be assigned, without assigning any
    pub fn check(&self, vars: &VarMap) -> Result<()> {
        for (name, value) in vars {
            self.authorize(name, value)?;
        }
        Ok(())
    }

    /// The raw stored variable
    pub fn get(&self, name: &str) -> Result<&Variable> {
        self.vars
            .get(name)
            .ok_or_else(|| Error::VariableNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Names of all currently set variables
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Description recorded for a variable, if any
    pub fn description(&self, name: &str) -> Option<&str> {
        self.descriptions.get(name).map(String::as_str)
    }

    /// All recorded descriptions, in recording order
    pub fn descriptions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.descriptions
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of active frames above the baseline
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_scope(&mut self) {
        self.frames.push(Frame::default());
        trace!(depth = self.frames.len(), "push scope");
    }

    /// Restore every variable touched since the matching `push_scope`
    pub fn pop_scope(&mut self) {
        let Some(frame) = self.frames.pop() else {
            warn!("pop_scope called on the baseline scope");
            return;
        };

        for (name, prior) in frame.saved {
            match prior {
                Some(var) => {
                    self.vars.insert(name, var);
                }
                None => {
                    self.vars.shift_remove(&name);
                }
            }
        }
        trace!(depth = self.frames.len(), "pop scope");
    }

    /// Push a scope that is popped when the guard is dropped
    pub fn scope(&mut self) -> Scope<'_> {
        self.push_scope();
        Scope { env: self }
    }

    fn authorize(&self, name: &str, value: &Wrapped) -> Result<()> {
        let Some(var) = self.vars.get(name) else {
            return Ok(());
        };
        if !var.locked {
            return Ok(());
        }

        match value {
            Wrapped::NoChange => Ok(()),
            Wrapped::Description(_, inner) => self.authorize(name, inner),
            Wrapped::Locked(v)
                if self.lock_policy == LockPolicy::AllowIdentical && var.value() == Some(v) =>
            {
                Ok(())
            }
            _ => Err(Error::LockedVariable(name.to_string())),
        }
    }

    fn apply(&mut self, name: &str, value: Wrapped) {
        match value {
            Wrapped::NoChange => {}
            Wrapped::Description(text, inner) => {
                self.descriptions.insert(name.to_string(), text);
                self.apply(name, *inner);
            }
            Wrapped::Delete => {
                self.remember(name);
                self.vars.shift_remove(name);
            }
            Wrapped::Default(v) => {
                // Within one scope the first default wins; a default made in an
                // enclosing scope can still be replaced
                let depth = self.frames.len();
                let settable = self
                    .vars
                    .get(name)
                    .map_or(true, |var| var.default_at.is_some_and(|at| at < depth));
                if settable {
                    self.store(
                        name,
                        Variable {
                            slot: Slot::Value(v),
                            locked: false,
                            default_at: Some(depth),
                        },
                    );
                }
            }
            Wrapped::Locked(v) => {
                if self.vars.get(name).is_some_and(|var| var.locked) {
                    // Identical re-lock under AllowIdentical
                    return;
                }
                self.store(
                    name,
                    Variable {
                        slot: Slot::Value(v),
                        locked: true,
                        default_at: None,
                    },
                );
            }
            Wrapped::Value(v) => self.store(name, Variable::new(Slot::Value(v))),
            Wrapped::Delayed(d) => self.store(name, Variable::new(Slot::Delayed(d))),
        }
    }

    fn store(&mut self, name: &str, var: Variable) {
        self.remember(name);
        self.vars.insert(name.to_string(), var);
    }

    fn remember(&mut self, name: &str) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if !frame.saved.contains_key(name) {
            frame
                .saved
                .insert(name.to_string(), self.vars.get(name).cloned());
        }
    }

    /// Set a plain value (shorthand for tests and setup code)
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.set(name, Wrapped::Value(value.into()))
    }
}

/// A pushed scope, popped on drop
pub struct Scope<'a> {
    env: &'a mut Environment,
}

impl Deref for Scope<'_> {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        self.env
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut Environment {
        self.env
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.env.pop_scope();
    }
}
