//! Built-in functions registered by [`Engine::new`](super::engine::Engine::new).
//!
//! Each receives the already-evaluated arguments and the resolved call type
//! and returns `Result<Value, EvalError>`.

use super::coerce::{coerce, TypeTag};
use super::error::{EvalError, FunctionError};
use super::function::{FunctionRegistry, RegisteredFunction};
use super::interp::Interpreter;
use super::value::Value;

type Builtin = fn(&mut Interpreter, Vec<Value>, Option<&str>) -> Result<Value, EvalError>;

/// `(name, default call type, implementation)`
const BUILTINS: &[(&str, Option<&str>, Builtin)] = &[
    ("add", Some("double"), add),
    ("Out", Some("Object"), out),
    // ── String functions ─────────────────────────────────────────────────────
    ("strlen", None, strlen),
    ("substr", None, substr),
    ("strcat", None, strcat),
    ("toupper", None, toupper),
    ("tolower", None, tolower),
    // ── Math functions ───────────────────────────────────────────────────────
    ("abs", None, abs),
    ("min", None, min),
    ("max", None, max),
    ("round", None, round),
];

/// Register every built-in.  Names already taken are left alone.
pub fn register_defaults(registry: &mut FunctionRegistry) {
    for &(name, default_type, f) in BUILTINS {
        let mut func = RegisteredFunction::new(f);
        if let Some(ty) = default_type {
            func = func.with_default_type(ty);
        }
        registry.register(name, func);
    }
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _, _)| *name)
}

// ── Implementations ───────────────────────────────────────────────────────────

/// `add(a, b)`: `int` call type truncates both operands to 32 bits
/// (saturating) and adds with wraparound, `double` (the default) adds as
/// floats.
fn add(_: &mut Interpreter, args: Vec<Value>, ty: Option<&str>) -> Result<Value, EvalError> {
    arity("add", &args, 2)?;
    let a = get_num(&args, 0, "add")?;
    let b = get_num(&args, 1, "add")?;
    match ty {
        Some(t) if t.eq_ignore_ascii_case("int") => {
            Ok(Value::Int(i64::from((a as i32).wrapping_add(b as i32))))
        }
        Some(t) if t.eq_ignore_ascii_case("double") => Ok(Value::Float(a + b)),
        None => Ok(Value::Float(a + b)),
        Some(t) => Err(EvalError::host(format!("unsupported add() return type: {t}"))),
    }
}

/// `Out<T>(v)`: convert `v` to `T`, or return it unchanged if it does not
/// convert.
fn out(_: &mut Interpreter, args: Vec<Value>, ty: Option<&str>) -> Result<Value, EvalError> {
    let Some(v) = args.into_iter().next() else {
        return Ok(Value::Null);
    };
    let target = TypeTag::parse(ty.unwrap_or("Object"));
    Ok(coerce(v.clone(), &target).unwrap_or(v))
}

fn strlen(_: &mut Interpreter, args: Vec<Value>, _: Option<&str>) -> Result<Value, EvalError> {
    arity("strlen", &args, 1)?;
    Ok(Value::Int(args[0].to_string().chars().count() as i64))
}

/// `substr(s, start[, len])`, counted in characters.  Out-of-range bounds
/// are clamped.
fn substr(_: &mut Interpreter, args: Vec<Value>, _: Option<&str>) -> Result<Value, EvalError> {
    arity_range("substr", &args, 2, 3)?;
    let chars: Vec<char> = args[0].to_string().chars().collect();
    let start = (get_num(&args, 1, "substr")?.max(0.0) as usize).min(chars.len());
    let end = match args.get(2) {
        Some(_) => {
            let len = get_num(&args, 2, "substr")?.max(0.0) as usize;
            start.saturating_add(len).min(chars.len())
        }
        None => chars.len(),
    };
    Ok(Value::Str(chars[start..end].iter().collect()))
}

fn strcat(_: &mut Interpreter, args: Vec<Value>, _: Option<&str>) -> Result<Value, EvalError> {
    let mut out = String::new();
    for a in &args {
        out.push_str(&a.to_string());
    }
    Ok(Value::Str(out))
}

fn toupper(_: &mut Interpreter, args: Vec<Value>, _: Option<&str>) -> Result<Value, EvalError> {
    arity("toupper", &args, 1)?;
    Ok(Value::Str(args[0].to_string().to_uppercase()))
}

fn tolower(_: &mut Interpreter, args: Vec<Value>, _: Option<&str>) -> Result<Value, EvalError> {
    arity("tolower", &args, 1)?;
    Ok(Value::Str(args[0].to_string().to_lowercase()))
}

fn abs(_: &mut Interpreter, args: Vec<Value>, _: Option<&str>) -> Result<Value, EvalError> {
    arity("abs", &args, 1)?;
    Ok(Value::Float(get_num(&args, 0, "abs")?.abs()))
}

fn min(_: &mut Interpreter, args: Vec<Value>, _: Option<&str>) -> Result<Value, EvalError> {
    fold_nums("min", &args, f64::min)
}

fn max(_: &mut Interpreter, args: Vec<Value>, _: Option<&str>) -> Result<Value, EvalError> {
    fold_nums("max", &args, f64::max)
}

/// `round(x[, digits])`, half away from zero.
fn round(_: &mut Interpreter, args: Vec<Value>, _: Option<&str>) -> Result<Value, EvalError> {
    arity_range("round", &args, 1, 2)?;
    let x = get_num(&args, 0, "round")?;
    let digits = match args.get(1) {
        Some(_) => get_num(&args, 1, "round")?.trunc() as i32,
        None => 0,
    };
    let scale = 10f64.powi(digits);
    Ok(Value::Float((x * scale).round() / scale))
}

// ── Argument helpers ──────────────────────────────────────────────────────────

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(FunctionError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        }
        .into());
    }
    Ok(())
}

fn arity_range(name: &str, args: &[Value], lo: usize, hi: usize) -> Result<(), EvalError> {
    if args.len() < lo || args.len() > hi {
        return Err(EvalError::host(format!(
            "{name}() expects {lo} to {hi} arguments, got {}",
            args.len()
        )));
    }
    Ok(())
}

fn get_num(args: &[Value], idx: usize, name: &str) -> Result<f64, EvalError> {
    let v = args
        .get(idx)
        .ok_or_else(|| EvalError::host(format!("{name}: too few arguments")))?;
    v.as_f64().ok_or_else(|| {
        EvalError::host(format!(
            "argument {} to {name}() must be a number, got {v}",
            idx + 1
        ))
    })
}

fn fold_nums(name: &str, args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(EvalError::host(format!("{name}() expects at least 1 argument")));
    }
    let mut acc = get_num(args, 0, name)?;
    for i in 1..args.len() {
        acc = f(acc, get_num(args, i, name)?);
    }
    Ok(Value::Float(acc))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;

    fn run(src: &str) -> Result<Value, EvalError> {
        let mut interp = Interpreter::new();
        register_defaults(interp.functions_mut());
        interp.interpret(&parse(src).unwrap())
    }

    #[test]
    fn add_honours_call_type() {
        assert_eq!(run("add(2, 3)").unwrap(), Value::Float(5.0));
        assert!(matches!(run("add<int>(2, 3)").unwrap(), Value::Int(5)));
        assert!(matches!(run("add<INT>(2.9, 3.9)").unwrap(), Value::Int(5)));
        assert!(run("add<string>(2, 3)").is_err());
        assert!(run("add(2)").is_err());
        assert!(run("add('a', 1)").is_err());
        assert!(matches!(
            run("add<int>(9000000000000000000.0, 9000000000000000000.0)").unwrap(),
            Value::Int(-2)
        ));
        assert!(matches!(run("add<int>(2147483647, 1)").unwrap(), Value::Int(-2147483648)));
        assert!(matches!(run("add<int>(-2.5, 0)").unwrap(), Value::Int(-2)));
    }

    #[test]
    fn out_converts_or_passes_through() {
        assert!(matches!(run("Out<int>(7)").unwrap(), Value::Int(7)));
        assert!(matches!(run("Out<boolean>('TRUE')").unwrap(), Value::Bool(true)));
        assert_eq!(run("Out<Material>('stone')").unwrap(), Value::from("stone"));
        // The dispatcher still coerces the result to the call type.
        assert!(matches!(
            run("Out<int>('abc')").unwrap_err(),
            EvalError::Function(FunctionError::ReturnType { .. })
        ));
        assert_eq!(run("Out('x')").unwrap(), Value::from("x"));
        assert!(run("Out()").unwrap().is_null());
    }

    #[test]
    fn string_functions() {
        assert_eq!(run("strlen('héllo')").unwrap(), Value::Int(5));
        assert_eq!(run("substr('abcdef', 2)").unwrap(), Value::from("cdef"));
        assert_eq!(run("substr('abcdef', 1, 3)").unwrap(), Value::from("bcd"));
        assert_eq!(run("substr('abc', 10, 2)").unwrap(), Value::from(""));
        assert_eq!(run("strcat('a', 1, true)").unwrap(), Value::from("a1true"));
        assert_eq!(run("toupper('abc')").unwrap(), Value::from("ABC"));
        assert_eq!(run("tolower('ABC')").unwrap(), Value::from("abc"));
    }

    #[test]
    fn math_functions() {
        assert_eq!(run("abs(-3)").unwrap(), Value::Float(3.0));
        assert_eq!(run("min(4, 2, 8)").unwrap(), Value::Float(2.0));
        assert_eq!(run("max(4, 2, 8)").unwrap(), Value::Float(8.0));
        assert_eq!(run("round(2.5)").unwrap(), Value::Float(3.0));
        assert_eq!(run("round(3.14159, 2)").unwrap(), Value::Float(3.14));
        assert!(run("min()").is_err());
        assert!(run("abs('x')").is_err());
    }

    #[test]
    fn defaults_do_not_override_existing() {
        let mut reg = FunctionRegistry::new();
        reg.register("add", RegisteredFunction::new(|_, _, _| Ok(Value::Null)));
        register_defaults(&mut reg);
        assert!(reg.get("add").unwrap().default_type.is_none());
        assert_eq!(reg.len(), names().count());
    }
}
