//! Runtime value type.
//!
//! The language is loosely typed: arithmetic works on numbers, `+` also
//! concatenates when either side is a string, and any value can be tested
//! for truthiness.  Hosts can pass opaque objects through as [`HostValue`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An opaque, shareable object supplied by the host application.
///
/// Two host values are equal only if they wrap the same allocation.
#[derive(Clone)]
pub struct HostValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl HostValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        HostValue {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostValue({})", self.type_name)
    }
}

/// A runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Host(HostValue),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            // `f64`'s Display already omits a trailing ".0".
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Host(h) => write!(f, "<{}>", h.type_name()),
        }
    }
}

/// Loose equality: numbers compare by numeric value, host objects by
/// identity, everything else structurally.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Value {
    /// `Null` is false, numbers are true when non-zero, strings when
    /// non-empty, host objects always.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Host(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// The numeric value, if this is a number.  Strings are not parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integers widen to `Float`; everything else is returned unchanged.
    pub fn normalize_number(self) -> Value {
        match self {
            Value::Int(n) => Value::Float(n as f64),
            other => other,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "double",
            Value::Str(_) => "string",
            Value::Host(h) => h.type_name(),
        }
    }

    pub fn host<T: Any + Send + Sync>(value: T) -> Value {
        Value::Host(HostValue::new(value))
    }

    /// Parse a bare word the way unquoted settings values are read:
    /// number, then boolean, then plain string.
    pub fn from_bare(text: &str) -> Value {
        let t = text.trim();
        if let Ok(n) = t.parse::<i64>() {
            Value::Int(n)
        } else if let Some(x) = parse_float(t) {
            Value::Float(x)
        } else if t.eq_ignore_ascii_case("true") {
            Value::Bool(true)
        } else if t.eq_ignore_ascii_case("false") {
            Value::Bool(false)
        } else {
            Value::Str(text.to_string())
        }
    }
}

/// Decimal float parse that rejects the `inf`/`nan` spellings `f64` accepts.
pub(crate) fn parse_float(text: &str) -> Option<f64> {
    if text
        .chars()
        .any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E'))
    {
        return None;
    }
    text.parse().ok()
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
