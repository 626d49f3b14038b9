//! Functions defined from text: `name<Default>(a:int, b) => body`.
//!
//! The header is validated and the body parsed once, when the definition is
//! compiled.  Each call binds the parameters as single-use variables,
//! evaluates the body and restores whatever those names held before.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use super::ast::Expr;
use super::coerce::{coerce, TypeTag};
use super::error::{DefinitionError, EvalError, FunctionError};
use super::function::RegisteredFunction;
use super::interp::Interpreter;
use super::parser::parse;
use super::value::Value;

/// `name` optionally followed by `<Type>`.
const HEADER_PATTERN: &str = r"^([A-Za-z_][A-Za-z0-9_]*)\s*(?:<\s*([^<>]*?)\s*>)?$";
const IDENT_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

struct Patterns {
    header: Regex,
    ident: Regex,
}

fn patterns() -> Result<&'static Patterns, regex::Error> {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    if let Some(p) = PATTERNS.get() {
        return Ok(p);
    }
    let compiled = Patterns {
        header: Regex::new(HEADER_PATTERN)?,
        ident: Regex::new(IDENT_PATTERN)?,
    };
    Ok(PATTERNS.get_or_init(|| compiled))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeTag,
}

/// A compiled text definition.
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub default_type: Option<String>,
    pub params: Vec<Param>,
    pub body: Expr,
    /// The definition as written.
    pub source: String,
}

impl FunctionDefinition {
    pub fn parse(text: &str) -> Result<Self, DefinitionError> {
        let (header, body) = text.split_once("=>").ok_or(DefinitionError::MissingArrow)?;
        let header = header.trim();
        let body = body.trim();

        let (open, close) = match (header.find('('), header.rfind(')')) {
            (Some(o), Some(c)) if o < c => (o, c),
            _ => return Err(DefinitionError::MissingParams),
        };
        check_parens(header)?;
        if !header[close + 1..].trim().is_empty() {
            return Err(DefinitionError::MissingParams);
        }

        let pats = patterns().map_err(|_| DefinitionError::InvalidName(header.to_string()))?;
        let name_part = header[..open].trim();
        let caps = pats
            .header
            .captures(name_part)
            .ok_or_else(|| DefinitionError::InvalidName(name_part.to_string()))?;
        let name = caps[1].to_string();
        let default_type = caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .filter(|t| !t.is_empty());

        let inner = header[open + 1..close].trim();
        let mut params = Vec::new();
        if !inner.is_empty() {
            for raw in inner.split(',') {
                let raw = raw.trim();
                let (pname, ty) = match raw.split_once(':') {
                    Some((n, t)) => (n.trim(), TypeTag::parse(t)),
                    None => (raw, TypeTag::Any),
                };
                if !pats.ident.is_match(pname) {
                    return Err(DefinitionError::InvalidParam {
                        name: name.clone(),
                        param: raw.to_string(),
                    });
                }
                params.push(Param {
                    name: pname.to_string(),
                    ty,
                });
            }
        }

        let body = parse(body).map_err(|source| DefinitionError::Body {
            name: name.clone(),
            source,
        })?;

        Ok(FunctionDefinition {
            name,
            default_type,
            params,
            body,
            source: text.trim().to_string(),
        })
    }

    /// Wrap the definition as a registrable function.
    pub fn into_function(self) -> RegisteredFunction {
        let default_type = self.default_type.clone();
        let def = Arc::new(self);
        let f = RegisteredFunction::new(move |interp, args, call_type| def.invoke(interp, args, call_type));
        match default_type {
            Some(ty) => f.with_default_type(ty),
            None => f,
        }
    }

    fn invoke(
        &self,
        interp: &mut Interpreter,
        args: Vec<Value>,
        call_type: Option<&str>,
    ) -> Result<Value, EvalError> {
        if args.len() != self.params.len() {
            return Err(FunctionError::Arity {
                name: self.name.clone(),
                expected: self.params.len(),
                got: args.len(),
            }
            .into());
        }

        let mut bound = Vec::with_capacity(args.len());
        for (i, (param, arg)) in self.params.iter().zip(args).enumerate() {
            let arg = coerce(arg, &param.ty).map_err(|source| FunctionError::ArgumentType {
                name: self.name.clone(),
                index: i + 1,
                param: param.name.clone(),
                expected: param.ty.to_string(),
                source,
            })?;
            bound.push(arg);
        }

        let shadowed: Vec<_> = self
            .params
            .iter()
            .map(|p| interp.vars_mut().take_slot(&p.name))
            .collect();
        for (param, arg) in self.params.iter().zip(bound) {
            interp.vars_mut().set(param.name.clone(), arg, 1);
        }

        let result = interp.eval(&self.body);

        for (param, prev) in self.params.iter().zip(shadowed) {
            interp.vars_mut().unset(&param.name);
            if let Some(slot) = prev {
                interp.vars_mut().restore_slot(param.name.clone(), slot);
            }
        }

        let result = result?;
        let Some(ty) = call_type.or(self.default_type.as_deref()) else {
            return Ok(result);
        };
        let target = TypeTag::parse(ty);
        coerce(result, &target).map_err(|source| {
            FunctionError::ReturnType {
                name: self.name.clone(),
                expected: target.to_string(),
                source,
            }
            .into()
        })
    }
}

/// Reject headers whose parentheses do not pair up, reporting the first
/// `)` with no matching `(`.
fn check_parens(header: &str) -> Result<(), DefinitionError> {
    let mut depth = 0i32;
    let mut first_unmatched = None;
    for (i, ch) in header.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 && first_unmatched.is_none() {
                    first_unmatched = Some(i);
                }
            }
            _ => {}
        }
    }
    let opens = header.matches('(').count();
    let closes = header.matches(')').count();
    if opens != closes || first_unmatched.is_some() {
        return Err(DefinitionError::UnbalancedParens {
            header: header.to_string(),
            at: first_unmatched,
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn interp_with(def: &str) -> Interpreter {
        let mut interp = Interpreter::new();
        let f = FunctionDefinition::parse(def).unwrap();
        let name = f.name.clone();
        interp.functions_mut().register(name, f.into_function());
        interp
    }

    fn run(interp: &mut Interpreter, src: &str) -> Result<Value, EvalError> {
        interp.interpret(&parse(src).unwrap())
    }

    #[test]
    fn parses_header() {
        let d = FunctionDefinition::parse("scale<int>(x:double, factor) => x * factor").unwrap();
        assert_eq!(d.name, "scale");
        assert_eq!(d.default_type.as_deref(), Some("int"));
        assert_eq!(
            d.params,
            vec![
                Param { name: "x".into(), ty: TypeTag::Double },
                Param { name: "factor".into(), ty: TypeTag::Any },
            ]
        );
        let d = FunctionDefinition::parse("now() => 1").unwrap();
        assert!(d.params.is_empty());
        assert!(d.default_type.is_none());
    }

    #[test]
    fn header_errors() {
        assert!(matches!(
            FunctionDefinition::parse("f(x) x"),
            Err(DefinitionError::MissingArrow)
        ));
        assert!(matches!(
            FunctionDefinition::parse("f x => x"),
            Err(DefinitionError::MissingParams)
        ));
        assert!(matches!(
            FunctionDefinition::parse("f(x)) => x"),
            Err(DefinitionError::UnbalancedParens { at: Some(4), .. })
        ));
        assert!(matches!(
            FunctionDefinition::parse("f((x) => x"),
            Err(DefinitionError::UnbalancedParens { at: None, .. })
        ));
        assert!(matches!(
            FunctionDefinition::parse("9f(x) => x"),
            Err(DefinitionError::InvalidName(_))
        ));
        assert!(matches!(
            FunctionDefinition::parse("f(x, 2) => x"),
            Err(DefinitionError::InvalidParam { .. })
        ));
        assert!(matches!(
            FunctionDefinition::parse("f(x) => x +"),
            Err(DefinitionError::Body { .. })
        ));
    }

    #[test]
    fn doubles() {
        let mut interp = interp_with("double(x) => x * 2");
        assert_eq!(run(&mut interp, "double(21)").unwrap(), Value::Float(42.0));
        assert!(!interp.vars().contains("x"));
    }

    #[test]
    fn arity_and_argument_types() {
        let mut interp = interp_with("inc(n:int) => n + 1");
        let err = run(&mut interp, "inc(1, 2)").unwrap_err();
        assert_eq!(
            err.root_cause().to_string(),
            "function inc expects 1 arguments, got 2"
        );
        let err = run(&mut interp, "inc('abc')").unwrap_err();
        assert!(matches!(
            err.root_cause(),
            EvalError::Function(FunctionError::ArgumentType { index: 1, param, .. }) if param == "n"
        ));
        assert!(!interp.vars().contains("n"));
    }

    #[test]
    fn return_type_from_default_or_call_site() {
        let mut interp = interp_with("half<int>(x) => x / 2");
        assert_eq!(run(&mut interp, "half(8)").unwrap(), Value::Int(4));
        assert_eq!(run(&mut interp, "half<double>(8)").unwrap(), Value::Float(4.0));
        assert!(matches!(
            run(&mut interp, "half(3)").unwrap_err().root_cause(),
            EvalError::Function(FunctionError::ReturnType { .. })
        ));
    }

    #[test]
    fn params_are_single_use_and_unbound_after_failure() {
        let mut interp = interp_with("sq(x) => x * x");
        assert!(matches!(
            run(&mut interp, "sq(3)").unwrap_err().root_cause(),
            EvalError::Variable(_)
        ));
        assert!(!interp.vars().contains("x"));
    }

    #[test]
    fn outer_variable_is_restored() {
        let mut interp = interp_with("id(x) => x");
        interp.vars_mut().set("x", Value::from("outer"), -1);
        assert_eq!(run(&mut interp, "id(1) + x").unwrap(), Value::from("1outer"));
        assert_eq!(interp.vars().peek("x"), Some(&Value::from("outer")));
    }
}
