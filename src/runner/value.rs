//! Variable values and assignment wrappers
//!
//! A [`Value`] is what a variable holds. A [`Wrapped`] value is what gets
//! assigned: besides plain values it carries the special assignment forms
//! (default, delete, lock, description, delayed evaluation).

use crate::error::Result;
use crate::runner::Context;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Ordered name to wrapped-value mapping used for task and call-site variables
pub type VarMap = IndexMap<String, Wrapped>;

/// A variable value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Text that substitution passes through untouched
    Literal(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Truthiness used for flags such as `_QUIET_`
    ///
    /// Strings are false when empty or one of `0`, `false`, `no`, `off`
    /// (case-insensitive).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) | Value::Literal(s) => {
                let s = s.trim();
                !(s.is_empty()
                    || s == "0"
                    || s.eq_ignore_ascii_case("false")
                    || s.eq_ignore_ascii_case("no")
                    || s.eq_ignore_ascii_case("off"))
            }
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    /// Borrow the text of a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Literal(s) => Some(s),
            _ => None,
        }
    }
}

/// Text form used when a value is inserted into a string or handed to a filter.
///
/// Lists render as space separated items, maps as space separated `key=value`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) | Value::Literal(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Map(map) => {
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}={}", key, value)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

/// Producer of a delayed value
pub type Producer = Rc<dyn Fn(&Context) -> Result<Value>>;

/// A deferred computation stored in place of a value
pub struct Delayed {
    producer: Producer,
    once: bool,
    cached: RefCell<Option<Value>>,
}

impl Delayed {
    pub fn new<F>(producer: F, once: bool) -> Self
    where
        F: Fn(&Context) -> Result<Value> + 'static,
    {
        Delayed {
            producer: Rc::new(producer),
            once,
            cached: RefCell::new(None),
        }
    }

    /// Whether the first result is memoized
    pub fn is_once(&self) -> bool {
        self.once
    }

    /// Cached result, if the producer already ran in `once` mode
    pub fn cached(&self) -> Option<Value> {
        self.cached.borrow().clone()
    }

    /// Produce the value, invoking the producer only once when memoized
    pub fn resolve(&self, ctx: &Context) -> Result<Value> {
        if let Some(value) = self.cached() {
            return Ok(value);
        }

        let value = (self.producer)(ctx)?;
        if self.once {
            *self.cached.borrow_mut() = Some(value.clone());
        }
        Ok(value)
    }
}

impl fmt::Debug for Delayed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delayed")
            .field("once", &self.once)
            .field("cached", &self.cached.borrow())
            .finish()
    }
}

/// An assignment: a plain value or one of the special assignment forms
#[derive(Debug, Clone)]
pub enum Wrapped {
    /// Plain assignment
    Value(Value),

    /// Set only when absent or when the current value is itself a default
    Default(Value),

    /// Remove the variable
    Delete,

    /// Leave the value alone (useful under `Description`)
    NoChange,

    /// Set and lock against further assignment
    Locked(Value),

    /// Record a description, then apply the inner assignment
    Description(String, Box<Wrapped>),

    /// Store a deferred computation
    Delayed(Rc<Delayed>),
}

impl Wrapped {
    pub fn default_value(value: impl Into<Value>) -> Self {
        Wrapped::Default(value.into())
    }

    pub fn locked(value: impl Into<Value>) -> Self {
        Wrapped::Locked(value.into())
    }

    pub fn describe(text: impl Into<String>, inner: Wrapped) -> Self {
        Wrapped::Description(text.into(), Box::new(inner))
    }

    pub fn delayed<F>(producer: F, once: bool) -> Self
    where
        F: Fn(&Context) -> Result<Value> + 'static,
    {
        Wrapped::Delayed(Rc::new(Delayed::new(producer, once)))
    }

    /// Description text of a `Description` assignment
    pub fn description(&self) -> Option<&str> {
        match self {
            Wrapped::Description(text, _) => Some(text),
            _ => None,
        }
    }
}

impl From<Value> for Wrapped {
    fn from(value: Value) -> Self {
        Wrapped::Value(value)
    }
}

impl From<&str> for Wrapped {
    fn from(s: &str) -> Self {
        Wrapped::Value(s.into())
    }
}

impl From<String> for Wrapped {
    fn from(s: String) -> Self {
        Wrapped::Value(s.into())
    }
}

impl From<bool> for Wrapped {
    fn from(b: bool) -> Self {
        Wrapped::Value(b.into())
    }
}

impl From<i64> for Wrapped {
    fn from(i: i64) -> Self {
        Wrapped::Value(i.into())
    }
}

/// What a variable slot currently holds
#[derive(Debug, Clone)]
pub enum Slot {
    Value(Value),
    Delayed(Rc<Delayed>),
}

/// A stored variable with its assignment metadata
#[derive(Debug, Clone)]
pub struct Variable {
    pub slot: Slot,
    pub locked: bool,
    /// Scope depth of the `Default` assignment that set this value, if it
    /// has not been explicitly overridden since
    pub default_at: Option<usize>,
}

impl Variable {
    pub fn new(slot: Slot) -> Self {
        Variable {
            slot,
            locked: false,
            default_at: None,
        }
    }

    /// Whether the value still comes from a `Default` assignment
    pub fn is_default(&self) -> bool {
        self.default_at.is_some()
    }

    /// The plain value, if this slot is not delayed
    pub fn value(&self) -> Option<&Value> {
        match &self.slot {
            Slot::Value(v) => Some(v),
            Slot::Delayed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_display_scalars_and_containers() {
        assert_eq!(Value::from("hi").to_string(), "hi");
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Bool(true).to_string(), "true");

        let list = Value::List(vec!["a".into(), Value::Int(1)]);
        assert_eq!(list.to_string(), "a 1");

        let mut map = IndexMap::new();
        map.insert("A".to_string(), Value::from("1"));
        map.insert("B".to_string(), Value::from("2"));
        assert_eq!(Value::Map(map).to_string(), "A=1 B=2");
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::from("yes").is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from("0").is_truthy());
        assert!(!Value::from("False").is_truthy());
        assert!(Value::Int(2).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }

    #[test]
    fn test_delayed_once_caches() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let delayed = Delayed::new(
            move |_| {
                counter.set(counter.get() + 1);
                Ok(Value::Int(counter.get()))
            },
            true,
        );

        let ctx = Context::new();
        assert_eq!(delayed.resolve(&ctx).unwrap(), Value::Int(1));
        assert_eq!(delayed.resolve(&ctx).unwrap(), Value::Int(1));
        assert_eq!(calls.get(), 1);
        assert_eq!(delayed.cached(), Some(Value::Int(1)));
    }

    #[test]
    fn test_delayed_every_time() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let delayed = Delayed::new(
            move |_| {
                counter.set(counter.get() + 1);
                Ok(Value::Int(counter.get()))
            },
            false,
        );

        let ctx = Context::new();
        assert_eq!(delayed.resolve(&ctx).unwrap(), Value::Int(1));
        assert_eq!(delayed.resolve(&ctx).unwrap(), Value::Int(2));
        assert!(delayed.cached().is_none());
    }

    #[test]
    fn test_description_accessor() {
        let wrapped = Wrapped::describe("compiler", Wrapped::default_value("gcc"));
        assert_eq!(wrapped.description(), Some("compiler"));
        assert!(Wrapped::from("x").description().is_none());
    }
}
