//! Tree-walking interpreter.
//!
//! The [`Interpreter`] owns the variable store, function registry, context
//! map and access filters of one engine, and evaluates [`Expr`] trees against
//! them.  It is synchronous and single-threaded; share it across threads only
//! behind a lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use super::ast::{BinaryOp, ConditionalBranch, Expr, Literal, LogicalOp, UnaryOp};
use super::coerce::{coerce, TypeTag};
use super::error::{EvalError, FunctionError, VariableError};
use super::function::{AccessFilter, FunctionRegistry, RegisteredFunction};
use super::value::{parse_float, Value};
use crate::var::VarStore;

/// Default limit on nested function calls.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 100;

/// Evaluation knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterConfig {
    /// Emit a `debug!` event for every node evaluated.
    pub debug: bool,
    /// Stored and reported only; no evaluation rule depends on it yet.
    pub strict: bool,
    /// Maximum depth of nested function calls.
    pub max_recursion_depth: usize,
    /// Wall-clock budget for one top-level evaluation.  Zero means no limit.
    pub evaluation_timeout: Duration,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            debug: false,
            strict: false,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            evaluation_timeout: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub struct Interpreter {
    vars: VarStore,
    functions: FunctionRegistry,
    context: HashMap<String, Value>,
    variable_filter: AccessFilter,
    function_filter: AccessFilter,
    config: InterpreterConfig,
    /// Current nesting of function calls.
    call_depth: usize,
    /// Nesting of `interpret` calls; the outermost one owns the deadline.
    active: usize,
    /// Set while a top-level evaluation with a timeout is running.
    deadline: Option<Instant>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    // ── State access ──────────────────────────────────────────────────────────

    pub fn vars(&self) -> &VarStore {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VarStore {
        &mut self.vars
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    pub fn context(&self) -> &HashMap<String, Value> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.context
    }

    pub fn variable_filter_mut(&mut self) -> &mut AccessFilter {
        &mut self.variable_filter
    }

    pub fn function_filter_mut(&mut self) -> &mut AccessFilter {
        &mut self.function_filter
    }

    pub fn variable_filter(&self) -> &AccessFilter {
        &self.variable_filter
    }

    pub fn function_filter(&self) -> &AccessFilter {
        &self.function_filter
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut InterpreterConfig {
        &mut self.config
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Evaluate a whole tree.  Arms the evaluation timeout unless an outer
    /// evaluation already did.
    pub fn interpret(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        let outermost = self.active == 0;
        if outermost && !self.config.evaluation_timeout.is_zero() {
            self.deadline = Some(Instant::now() + self.config.evaluation_timeout);
        }
        self.active += 1;
        let result = self.eval(expr);
        self.active -= 1;
        if outermost {
            self.deadline = None;
            self.call_depth = 0;
        }
        result
    }

    /// Evaluate one node.  Host callables use this to evaluate subtrees
    /// within the current evaluation.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(EvalError::Timeout {
                    millis: self.config.evaluation_timeout.as_millis(),
                });
            }
        }
        if self.config.debug {
            debug!(node = expr.kind_name(), expr = ?expr, "evaluating");
        }
        let result = self.eval_node(expr);
        if self.config.debug {
            match &result {
                Ok(v) => debug!(node = expr.kind_name(), result = %v, "evaluated"),
                Err(e) => debug!(node = expr.kind_name(), error = %e, "evaluation failed"),
            }
        }
        result
    }

    fn eval_node(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Binary(lhs, op, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                binary(*op, l, r)
            }

            Expr::Logical(lhs, op, rhs) => {
                let l = self.eval(lhs)?;
                let decided = match op {
                    LogicalOp::Or => l.is_truthy(),
                    LogicalOp::And => !l.is_truthy(),
                };
                if decided {
                    Ok(l)
                } else {
                    self.eval(rhs)
                }
            }

            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                match op {
                    UnaryOp::Neg => Ok(Value::Float(-number(&v, "-")?)),
                    UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                }
            }

            Expr::Literal(lit) => Ok(self.literal(lit)),

            Expr::Variable(name) => self.variable(name),

            Expr::Grouping(inner) => self.eval(inner),

            Expr::Call {
                name,
                type_arg,
                args,
            } => self.call(name, type_arg.as_deref(), args),

            Expr::Ternary(cond, then, else_) => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(else_)
                }
            }

            Expr::ConditionalChain {
                branches,
                else_branch,
            } => {
                for ConditionalBranch { condition, output } in branches {
                    if self.eval(condition)?.is_truthy() {
                        return self.eval(output);
                    }
                }
                match else_branch {
                    Some(e) => self.eval(e),
                    None => Ok(Value::Null),
                }
            }

            Expr::Assignment { name, value, uses } => {
                let v = self.eval(value)?;
                self.vars.set(name.clone(), v.clone(), *uses);
                Ok(v)
            }

            Expr::Sequence(items) => {
                let mut last = Value::Null;
                for item in items {
                    last = self.eval(item)?;
                }
                Ok(last)
            }
        }
    }

    fn literal(&self, lit: &Literal) -> Value {
        match lit {
            Literal::Number(n) => Value::Float(n.as_f64()),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Bare(text) => {
                if let Some(v) = self.context.get(text) {
                    v.clone().normalize_number()
                } else if let Some(x) = parse_float(text) {
                    Value::Float(x)
                } else if text.eq_ignore_ascii_case("true") {
                    Value::Bool(true)
                } else if text.eq_ignore_ascii_case("false") {
                    Value::Bool(false)
                } else {
                    Value::Str(text.clone())
                }
            }
        }
    }

    /// Filter, then consuming read from the store, then the context map.
    fn variable(&mut self, name: &str) -> Result<Value, EvalError> {
        if !self.variable_filter.is_allowed(name) {
            return Err(VariableError::Denied(name.to_string()).into());
        }
        if let Some(v) = self.vars.read(name)? {
            return Ok(v.normalize_number());
        }
        match self.context.get(name) {
            Some(v) => Ok(v.clone().normalize_number()),
            None => Err(VariableError::Undefined(name.to_string()).into()),
        }
    }

    // ── Function calls ────────────────────────────────────────────────────────

    fn call(&mut self, name: &str, type_arg: Option<&str>, args: &[Expr]) -> Result<Value, EvalError> {
        if !self.function_filter.is_allowed(name) {
            return Err(FunctionError::Denied(name.to_string()).into());
        }
        // Clone out of the registry so the callable can borrow the
        // interpreter mutably.
        let func: RegisteredFunction = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| FunctionError::Undefined(name.to_string()))?;

        let mut values = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let v = self.eval(arg)?;
            let v = match func.arg_types.as_ref().and_then(|t| t.get(i)) {
                Some(tag) => coerce(v, tag).map_err(|source| FunctionError::ArgumentType {
                    name: name.to_string(),
                    index: i + 1,
                    param: format!("arg{}", i + 1),
                    expected: tag.to_string(),
                    source,
                })?,
                None => v,
            };
            values.push(v);
        }

        let call_type = type_arg.map(str::to_string).or_else(|| func.default_type.clone());

        if self.call_depth >= self.config.max_recursion_depth {
            return Err(FunctionError::RecursionLimit {
                name: name.to_string(),
                limit: self.config.max_recursion_depth,
            }
            .into());
        }
        self.call_depth += 1;
        let result = (func.callable)(self, values, call_type.as_deref());
        self.call_depth -= 1;

        let result = result.map_err(|e| FunctionError::Raised {
            name: name.to_string(),
            source: Box::new(e),
        })?;

        let target = match (&func.return_type, &call_type) {
            (Some(tag), _) => tag.clone(),
            (None, Some(ty)) => TypeTag::parse(ty),
            (None, None) => return Ok(result),
        };
        coerce(result, &target).map_err(|source| {
            FunctionError::ReturnType {
                name: name.to_string(),
                expected: target.to_string(),
                source,
            }
            .into()
        })
    }
}

// ── Operators ─────────────────────────────────────────────────────────────────

fn number(v: &Value, op: &'static str) -> Result<f64, EvalError> {
    v.as_f64().ok_or_else(|| EvalError::NotANumber {
        op,
        found: v.to_string(),
    })
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    let sym = op.symbol();
    Ok(match op {
        BinaryOp::Add => {
            if let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) {
                Value::Float(a + b)
            } else if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
                Value::Str(format!("{l}{r}"))
            } else {
                return Err(EvalError::InvalidConcat);
            }
        }
        BinaryOp::Sub => Value::Float(number(&l, sym)? - number(&r, sym)?),
        BinaryOp::Mul => Value::Float(number(&l, sym)? * number(&r, sym)?),
        BinaryOp::Div => {
            let (a, b) = (number(&l, sym)?, number(&r, sym)?);
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Value::Float(a / b)
        }
        // IEEE remainder semantics (`fmod`): a zero divisor yields NaN.
        BinaryOp::Rem => Value::Float(number(&l, sym)? % number(&r, sym)?),
        BinaryOp::Pow => Value::Float(number(&l, sym)?.powf(number(&r, sym)?)),
        BinaryOp::Gt => Value::Bool(number(&l, sym)? > number(&r, sym)?),
        BinaryOp::Ge => Value::Bool(number(&l, sym)? >= number(&r, sym)?),
        BinaryOp::Lt => Value::Bool(number(&l, sym)? < number(&r, sym)?),
        BinaryOp::Le => Value::Bool(number(&l, sym)? <= number(&r, sym)?),
        BinaryOp::Eq => Value::Bool(l == r),
        BinaryOp::Ne => Value::Bool(l != r),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;

    fn eval(interp: &mut Interpreter, src: &str) -> Result<Value, EvalError> {
        let expr = parse(src).unwrap();
        interp.interpret(&expr)
    }

    fn eval_ok(src: &str) -> Value {
        eval(&mut Interpreter::new(), src).unwrap()
    }

    #[test]
    fn arithmetic_yields_floats() {
        assert!(matches!(eval_ok("2 + 3 * 4"), Value::Float(x) if x == 14.0));
        assert!(matches!(eval_ok("(2 + 3) * 4"), Value::Float(x) if x == 20.0));
        assert!(matches!(eval_ok("2 ^ 10"), Value::Float(x) if x == 1024.0));
        assert!(matches!(eval_ok("7 % 3"), Value::Float(x) if x == 1.0));
        assert!(matches!(eval_ok("-7 % 3"), Value::Float(x) if x == -1.0));
        assert!(matches!(eval_ok("5 % 0"), Value::Float(x) if x.is_nan()));
    }

    #[test]
    fn concatenation() {
        assert_eq!(eval_ok("'a' + 1"), Value::from("a1"));
        assert_eq!(eval_ok("2.5 + 'x'"), Value::from("2.5x"));
        assert_eq!(eval_ok("'n=' + (1 < 2)"), Value::from("n=true"));
        assert!(matches!(
            eval(&mut Interpreter::new(), "true + 1"),
            Err(EvalError::InvalidConcat)
        ));
    }

    #[test]
    fn numeric_operand_checks() {
        let err = eval(&mut Interpreter::new(), "'a' - 1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid operand for operator -: a (must be a number)"
        );
        assert!(matches!(
            eval(&mut Interpreter::new(), "'b' > 1"),
            Err(EvalError::NotANumber { op: ">", .. })
        ));
        assert!(matches!(
            eval(&mut Interpreter::new(), "1 / 0"),
            Err(EvalError::DivisionByZero)
        ));
        assert!(matches!(
            eval(&mut Interpreter::new(), "-'x'"),
            Err(EvalError::NotANumber { op: "-", .. })
        ));
    }

    #[test]
    fn equality() {
        assert_eq!(eval_ok("1 == 1.0"), Value::Bool(true));
        assert_eq!(eval_ok("'a' == 'a'"), Value::Bool(true));
        assert_eq!(eval_ok("'1' == 1"), Value::Bool(false));
        assert_eq!(eval_ok("true != false"), Value::Bool(true));
    }

    #[test]
    fn logical_short_circuit_returns_operand() {
        assert_eq!(eval_ok("false and undefinedVar"), Value::Bool(false));
        assert_eq!(eval_ok("'' or 'fallback'"), Value::from("fallback"));
        assert_eq!(eval_ok("'x' and 0"), Value::Float(0.0));
        assert_eq!(eval_ok("5 > 3 and 2 < 4"), Value::Bool(true));
        assert_eq!(eval_ok("not 0"), Value::Bool(true));
    }

    #[test]
    fn ternary_and_chain() {
        assert_eq!(eval_ok("1 < 2 ? 'yes' : 'no'"), Value::from("yes"));
        let mut interp = Interpreter::new();
        interp.vars_mut().set("level", Value::Int(5), -1);
        let src = "if level > 10: 'high' elif level > 3: 'mid' else: 'low'";
        assert_eq!(eval(&mut interp, src).unwrap(), Value::from("mid"));
        assert!(eval_ok("if 0: 1 elif '': 2").is_null());
    }

    #[test]
    fn bare_literals_consult_context_first() {
        let mut interp = Interpreter::new();
        assert_eq!(eval(&mut interp, "TRUE").unwrap(), Value::Bool(true));
        interp.context_mut().insert("true".into(), Value::from("overridden"));
        assert_eq!(eval(&mut interp, "true").unwrap(), Value::from("overridden"));
    }

    #[test]
    fn variables_and_context() {
        let mut interp = Interpreter::new();
        interp.context_mut().insert("lang".into(), Value::from("de"));
        interp.context_mut().insert("count".into(), Value::Int(3));
        assert_eq!(eval(&mut interp, "lang").unwrap(), Value::from("de"));
        assert!(matches!(eval(&mut interp, "count").unwrap(), Value::Float(x) if x == 3.0));

        interp.vars_mut().set("lang", Value::from("en"), 1);
        assert_eq!(eval(&mut interp, "lang").unwrap(), Value::from("en"));
        // Store shadows context, even when exhausted.
        assert!(matches!(
            eval(&mut interp, "lang"),
            Err(EvalError::Variable(VariableError::Exhausted { .. }))
        ));
        assert!(matches!(
            eval(&mut interp, "nope"),
            Err(EvalError::Variable(VariableError::Undefined(_)))
        ));
    }

    #[test]
    fn variable_filter() {
        let mut interp = Interpreter::new();
        interp.vars_mut().set("secret", Value::Int(1), -1);
        interp.variable_filter_mut().set_blacklist(["secret"]);
        assert!(matches!(
            eval(&mut interp, "secret"),
            Err(EvalError::Variable(VariableError::Denied(_)))
        ));
    }

    #[test]
    fn assignment_with_uses() {
        let mut interp = Interpreter::new();
        let v = eval(&mut interp, "let a = (let b = 6 as 1; b * 2) as 2; a + a").unwrap();
        assert_eq!(v, Value::Float(24.0));
        assert!(eval(&mut interp, "a").is_err());
        assert!(eval(&mut interp, "b").is_err());
    }

    #[test]
    fn calls_coerce_arguments_and_results() {
        let mut interp = Interpreter::new();
        interp.functions_mut().register(
            "describe",
            RegisteredFunction::new(|_, args, ty| {
                Ok(Value::Str(format!("{}:{}", args[0].type_name(), ty.unwrap_or("-"))))
            })
            .with_signature(vec![TypeTag::Int], None),
        );
        assert_eq!(eval(&mut interp, "describe(4)").unwrap(), Value::from("integer:-"));
        assert_eq!(eval(&mut interp, "describe<T>(4)").unwrap(), Value::from("integer:T"));
        let err = eval(&mut interp, "describe('x')").unwrap_err();
        assert!(matches!(
            err,
            EvalError::Function(FunctionError::ArgumentType { index: 1, .. })
        ));
    }

    #[test]
    fn call_errors() {
        let mut interp = Interpreter::new();
        assert!(matches!(
            eval(&mut interp, "missing()"),
            Err(EvalError::Function(FunctionError::Undefined(_)))
        ));
        interp
            .functions_mut()
            .register("boom", RegisteredFunction::new(|_, _, _| Err(EvalError::host("kaboom"))));
        let err = eval(&mut interp, "boom()").unwrap_err();
        assert_eq!(err.to_string(), "error calling function boom: kaboom");
        interp.function_filter_mut().set_whitelist(["other"]);
        assert!(matches!(
            eval(&mut interp, "boom()"),
            Err(EvalError::Function(FunctionError::Denied(_)))
        ));
    }

    #[test]
    fn recursion_limit() {
        let mut interp = Interpreter::new();
        interp.config_mut().max_recursion_depth = 5;
        interp.functions_mut().register(
            "again",
            RegisteredFunction::new(|interp, _, _| {
                let e = parse("again()").map_err(|e| EvalError::host(e.to_string()))?;
                interp.eval(&e)
            }),
        );
        let err = eval(&mut interp, "again()").unwrap_err();
        assert!(matches!(
            err.root_cause(),
            EvalError::Function(FunctionError::RecursionLimit { limit: 5, .. })
        ));
        // Depth is reset for the next evaluation.
        interp.functions_mut().register("one", RegisteredFunction::new(|_, _, _| Ok(Value::Int(1))));
        assert_eq!(eval(&mut interp, "one()").unwrap(), Value::Int(1));
    }

    #[test]
    fn timeout() {
        let mut interp = Interpreter::new();
        interp.config_mut().evaluation_timeout = Duration::from_millis(1);
        interp.functions_mut().register(
            "slow",
            RegisteredFunction::new(|_, _, _| {
                std::thread::sleep(Duration::from_millis(5));
                Ok(Value::Null)
            }),
        );
        let err = eval(&mut interp, "slow() + 1").unwrap_err();
        assert!(matches!(err, EvalError::Timeout { millis: 1 }));
        interp.config_mut().evaluation_timeout = Duration::ZERO;
        assert!(eval(&mut interp, "1 + 1").is_ok());
    }
}
