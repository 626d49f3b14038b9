//! Best-effort conversion between loosely typed values.
//!
//! Values already of the target type pass through.  Anything else is
//! stringified and re-parsed, so `5.0` becomes the integer `5` but `5.5`
//! does not.

use std::fmt;

use super::error::CoercionError;
use super::value::{parse_float, Value};

/// A conversion target, as written in type arguments and DSL signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// 32-bit integer.
    Int,
    Long,
    Float,
    Double,
    Boolean,
    String,
    Any,
    /// A host-defined type name.  Values pass through unchanged.
    Named(String),
}

impl TypeTag {
    pub fn parse(text: &str) -> TypeTag {
        let t = text.trim();
        match t.to_ascii_lowercase().as_str() {
            "int" | "integer" | "number" => TypeTag::Int,
            "long" => TypeTag::Long,
            "float" => TypeTag::Float,
            "double" => TypeTag::Double,
            "string" | "str" => TypeTag::String,
            "boolean" | "bool" => TypeTag::Boolean,
            "object" | "any" | "" => TypeTag::Any,
            _ => TypeTag::Named(t.to_string()),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Int => f.write_str("int"),
            TypeTag::Long => f.write_str("long"),
            TypeTag::Float => f.write_str("float"),
            TypeTag::Double => f.write_str("double"),
            TypeTag::Boolean => f.write_str("boolean"),
            TypeTag::String => f.write_str("string"),
            TypeTag::Any => f.write_str("object"),
            TypeTag::Named(n) => f.write_str(n),
        }
    }
}

/// Convert `value` to `target`.
pub fn coerce(value: Value, target: &TypeTag) -> Result<Value, CoercionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let already = match (target, &value) {
        (TypeTag::Any | TypeTag::Named(_), _)
        | (TypeTag::Long, Value::Int(_))
        | (TypeTag::Float | TypeTag::Double, Value::Float(_))
        | (TypeTag::Boolean, Value::Bool(_))
        | (TypeTag::String, Value::Str(_)) => true,
        (TypeTag::Int, Value::Int(n)) => i32::try_from(*n).is_ok(),
        _ => false,
    };
    if already {
        return Ok(value);
    }

    let text = value.to_string();
    let fail = || CoercionError {
        value: text.clone(),
        target: target.to_string(),
    };
    let t = text.trim();
    match target {
        TypeTag::Int => t
            .parse::<i32>()
            .map(|n| Value::Int(i64::from(n)))
            .map_err(|_| fail()),
        TypeTag::Long => t.parse::<i64>().map(Value::Int).map_err(|_| fail()),
        TypeTag::Float | TypeTag::Double => parse_float(t).map(Value::Float).ok_or_else(fail),
        TypeTag::Boolean => match t.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(fail()),
        },
        TypeTag::String => Ok(Value::Str(text.clone())),
        TypeTag::Any | TypeTag::Named(_) => Ok(value),
    }
}

/// Rust types a result can be extracted as.
pub trait FromValue: Sized {
    const TYPE: TypeTag;

    fn from_value(value: Value) -> Result<Self, CoercionError>;
}

fn mismatch(value: &Value, target: &TypeTag) -> CoercionError {
    CoercionError {
        value: value.to_string(),
        target: target.to_string(),
    }
}

impl FromValue for Value {
    const TYPE: TypeTag = TypeTag::Any;

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        Ok(value)
    }
}

impl FromValue for i32 {
    const TYPE: TypeTag = TypeTag::Int;

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match coerce(value, &Self::TYPE)? {
            Value::Int(n) => i32::try_from(n).map_err(|_| mismatch(&Value::Int(n), &Self::TYPE)),
            other => Err(mismatch(&other, &Self::TYPE)),
        }
    }
}

impl FromValue for i64 {
    const TYPE: TypeTag = TypeTag::Long;

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match coerce(value, &Self::TYPE)? {
            Value::Int(n) => Ok(n),
            other => Err(mismatch(&other, &Self::TYPE)),
        }
    }
}

impl FromValue for f64 {
    const TYPE: TypeTag = TypeTag::Double;

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match coerce(value, &Self::TYPE)? {
            Value::Float(x) => Ok(x),
            other => Err(mismatch(&other, &Self::TYPE)),
        }
    }
}

impl FromValue for bool {
    const TYPE: TypeTag = TypeTag::Boolean;

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match coerce(value, &Self::TYPE)? {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(&other, &Self::TYPE)),
        }
    }
}

impl FromValue for String {
    const TYPE: TypeTag = TypeTag::String;

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match coerce(value, &Self::TYPE)? {
            Value::Str(s) => Ok(s),
            other => Err(mismatch(&other, &Self::TYPE)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
