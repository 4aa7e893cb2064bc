//! Dynamic runtime values exchanged between stand-in objects and the resolver

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::object::Instance;

/// Keyword arguments of a call.
///
/// `BTreeMap` for deterministic ordering in assertions and failure messages.
pub type KeywordArgs = BTreeMap<String, Value>;

/// Dynamic runtime value.
///
/// Equality is structural, except for [`Instance`](crate::object::Instance)
/// and [`Block`], which compare by identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating-point number
    Float(f64),
    /// String
    Str(String),
    /// Ordered sequence of values
    List(Vec<Value>),
    /// String-keyed map of values
    Map(KeywordArgs),
    /// Instance of a stand-in class
    Instance(Instance),
}

impl Value {
    /// Check if this value is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the instance if this value holds one
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Self::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    /// Type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Instance(_) => "instance",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Self::Instance(instance) => {
                write!(f, "#<{}:{}>", instance.class().name(), instance.object_id())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Self::Instance(instance)
    }
}

/// Trailing callback passed along with a call.
///
/// Compared by identity: two `Block`s are equal only if they are clones of
/// the same underlying callable.
#[derive(Clone)]
pub struct Block {
    f: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
}

impl Block {
    /// Wrap a callable as a block
    pub fn new(f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// Invoke the block
    pub fn call(&self, args: &[Value]) -> Value {
        (self.f)(args)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({:p})", Arc::as_ptr(&self.f))
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}
