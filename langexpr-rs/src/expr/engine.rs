//! The public entry point: lexer, parser and interpreter behind one API.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::ast::Expr;
use super::builtins;
use super::coerce::{coerce, FromValue, TypeTag};
use super::define::FunctionDefinition;
use super::error::{DefinitionError, EngineError, EvalError, VariableError};
use super::format::format_expr;
use super::function::RegisteredFunction;
use super::interp::Interpreter;
use super::lexer::Lexer;
use super::parser::Parser;
use super::value::Value;
use crate::var::UNLIMITED;

/// Message reported by [`Engine::validate`] for blank input.
pub const EMPTY_EXPRESSION: &str = "Empty or invalid expression.";

/// Observer for failed evaluations.  Sees the error before the caller does.
pub type ErrorHandler = Arc<dyn Fn(&EngineError) + Send + Sync>;

/// One self-contained expression engine.
///
/// Owns its variables, functions, context and settings.  Not internally
/// synchronized; see [`EnginePool`](crate::pool::EnginePool) for sharing.
pub struct Engine {
    lexer: Lexer,
    parser: Parser,
    interp: Interpreter,
    on_error: Option<ErrorHandler>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("lexer", &self.lexer)
            .field("parser", &self.parser)
            .field("interp", &self.interp)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with the built-in functions registered.
    pub fn new() -> Self {
        let mut engine = Self::empty();
        builtins::register_defaults(engine.interp.functions_mut());
        engine
    }

    /// An engine with no functions at all.
    pub fn empty() -> Self {
        Engine {
            lexer: Lexer::default(),
            parser: Parser::new(Vec::new()),
            interp: Interpreter::new(),
            on_error: None,
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interp
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interp
    }

    // ── Parsing and evaluation ────────────────────────────────────────────────

    /// Tokenize and parse `src`.
    pub fn parse_expression(&mut self, src: &str) -> Result<Expr, EngineError> {
        if src.trim().is_empty() {
            return Err(EngineError::Empty);
        }
        self.lexer.set_source(src);
        let syntax = |source| EngineError::Syntax {
            expression: src.to_string(),
            source,
        };
        let tokens = self.lexer.scan_tokens().map_err(syntax)?;
        self.parser.set_tokens(tokens);
        self.parser.parse().map_err(syntax)
    }

    /// Parse and evaluate `src`.  Failures go through the error handler,
    /// if one is set, before they are returned.
    pub fn evaluate(&mut self, src: &str) -> Result<Value, EngineError> {
        self.run(src).map_err(|e| self.report(e))
    }

    fn run(&mut self, src: &str) -> Result<Value, EngineError> {
        let expr = self.parse_expression(src)?;
        if self.interp.config().debug {
            debug!(expression = src, "evaluating expression");
        }
        self.interp.interpret(&expr).map_err(|source| EngineError::Eval {
            expression: src.to_string(),
            source,
        })
    }

    fn report(&self, err: EngineError) -> EngineError {
        if let Some(handler) = &self.on_error {
            handler(&err);
        }
        err
    }

    /// Evaluate without any result conversion.
    pub fn parse_primitive(&mut self, src: &str) -> Result<Value, EngineError> {
        self.evaluate(src)
    }

    /// Evaluate and convert the result to `target`.
    pub fn parse_as(&mut self, src: &str, target: &TypeTag) -> Result<Value, EngineError> {
        let v = self.evaluate(src)?;
        coerce(v, target).map_err(|source| EngineError::Result {
            expression: src.to_string(),
            source,
        })
    }

    /// Evaluate and extract the result as a Rust type.
    pub fn parse<T: FromValue>(&mut self, src: &str) -> Result<T, EngineError> {
        let v = self.evaluate(src)?;
        T::from_value(v).map_err(|source| EngineError::Result {
            expression: src.to_string(),
            source,
        })
    }

    /// Replace all variables with `vars` (unlimited uses), then evaluate.
    /// A blank name fails before any variable is touched.
    pub fn evaluate_with<I, K, V>(&mut self, src: &str, vars: I) -> Result<Value, EngineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let vars: Vec<(String, Value)> = vars
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        for (name, _) in &vars {
            if let Err(e) = check_name(name) {
                return Err(self.report(EngineError::Eval {
                    expression: src.to_string(),
                    source: EvalError::Variable(e),
                }));
            }
        }
        self.interp.vars_mut().clear();
        for (name, value) in vars {
            self.interp.vars_mut().set(name, value, UNLIMITED);
        }
        self.evaluate(src)
    }

    /// Check syntax only.  Returns the error message, or `None` if `src`
    /// parses.
    pub fn validate(&mut self, src: &str) -> Option<String> {
        match self.parse_expression(src) {
            Ok(_) => None,
            Err(EngineError::Empty) => Some(EMPTY_EXPRESSION.to_string()),
            Err(e) => Some(e.to_string()),
        }
    }

    /// Re-serialize `src` in compact or pretty form.
    pub fn format_expression(&mut self, src: &str, pretty: bool) -> Result<String, EngineError> {
        let expr = self.parse_expression(src)?;
        Ok(format_expr(&expr, pretty))
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) -> Result<(), VariableError> {
        self.set_variable_uses(name, value, UNLIMITED)
    }

    /// Bind `name` with a use budget; negative means unlimited.
    pub fn set_variable_uses(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        uses: i64,
    ) -> Result<(), VariableError> {
        check_name(name)?;
        self.interp.vars_mut().set(name, value.into(), uses);
        Ok(())
    }

    /// Bind `name` only if it is not bound yet.  Returns `true` if stored.
    pub fn set_variable_if_absent(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        uses: i64,
    ) -> Result<bool, VariableError> {
        check_name(name)?;
        Ok(self.interp.vars_mut().set_if_absent(name, value.into(), uses))
    }

    /// Consuming read: spends one use.  `Ok(None)` if unbound.
    pub fn get_variable(&mut self, name: &str) -> Result<Option<Value>, VariableError> {
        self.interp.vars_mut().read(name)
    }

    /// Non-consuming read.
    pub fn peek_variable(&self, name: &str) -> Option<Value> {
        self.interp.vars().peek(name).cloned()
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.interp.vars().contains(name)
    }

    /// `true` if `name` is bound and has uses left.
    pub fn has_variable_with_uses(&self, name: &str) -> bool {
        self.interp.vars().has_uses_left(name)
    }

    pub fn remove_variable(&mut self, name: &str) -> bool {
        self.interp.vars_mut().unset(name)
    }

    pub fn clear_variables(&mut self) {
        self.interp.vars_mut().clear();
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    /// Register a prepared function.  The first registration of a name wins.
    pub fn register(&mut self, name: &str, f: RegisteredFunction) -> bool {
        self.interp.functions_mut().register(name, f)
    }

    pub fn register_function<F>(&mut self, name: &str, f: F) -> bool
    where
        F: Fn(&mut Interpreter, Vec<Value>, Option<&str>) -> Result<Value, EvalError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, RegisteredFunction::new(f))
    }

    /// Register with a default call type, used when a call has no `<Type>`.
    pub fn register_function_typed<F>(&mut self, name: &str, f: F, default_type: &str) -> bool
    where
        F: Fn(&mut Interpreter, Vec<Value>, Option<&str>) -> Result<Value, EvalError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, RegisteredFunction::new(f).with_default_type(default_type))
    }

    /// Register with argument conversions and a return conversion.
    pub fn register_function_signature<F>(
        &mut self,
        name: &str,
        f: F,
        default_type: Option<&str>,
        arg_types: Vec<TypeTag>,
        return_type: Option<TypeTag>,
    ) -> bool
    where
        F: Fn(&mut Interpreter, Vec<Value>, Option<&str>) -> Result<Value, EvalError>
            + Send
            + Sync
            + 'static,
    {
        let mut func = RegisteredFunction::new(f).with_signature(arg_types, return_type);
        if let Some(ty) = default_type {
            func = func.with_default_type(ty);
        }
        self.register(name, func)
    }

    /// Compile and register a `name(params) => body` definition.
    pub fn register_function_def(&mut self, definition: &str) -> Result<bool, DefinitionError> {
        let def = FunctionDefinition::parse(definition)?;
        let name = def.name.clone();
        Ok(self.register(&name, def.into_function()))
    }

    pub fn unregister_function(&mut self, name: &str) -> bool {
        self.interp.functions_mut().unregister(name)
    }

    pub fn clear_functions(&mut self) {
        self.interp.functions_mut().clear();
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.interp.functions().contains(name)
    }

    // ── Context ───────────────────────────────────────────────────────────────

    pub fn put_context(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.interp.context_mut().insert(key.into(), value.into());
    }

    pub fn get_context(&self, key: &str) -> Option<&Value> {
        self.interp.context().get(key)
    }

    pub fn remove_context(&mut self, key: &str) -> Option<Value> {
        self.interp.context_mut().remove(key)
    }

    pub fn clear_context(&mut self) {
        self.interp.context_mut().clear();
    }

    // ── Access filters ────────────────────────────────────────────────────────

    pub fn set_function_whitelist<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interp.function_filter_mut().set_whitelist(names);
    }

    pub fn set_function_blacklist<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interp.function_filter_mut().set_blacklist(names);
    }

    pub fn set_variable_whitelist<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interp.variable_filter_mut().set_whitelist(names);
    }

    pub fn set_variable_blacklist<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interp.variable_filter_mut().set_blacklist(names);
    }

    // ── Settings ──────────────────────────────────────────────────────────────

    /// Call `handler` with every error [`evaluate`](Self::evaluate) returns.
    /// Replaces any previous handler.
    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(&EngineError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
    }

    pub fn error_handler(&self) -> Option<&ErrorHandler> {
        self.on_error.as_ref()
    }

    pub fn clear_error_handler(&mut self) {
        self.on_error = None;
    }

    pub fn set_debug_mode(&mut self, on: bool) {
        self.interp.config_mut().debug = on;
    }

    pub fn is_debug_mode(&self) -> bool {
        self.interp.config().debug
    }

    pub fn set_strict_mode(&mut self, on: bool) {
        self.interp.config_mut().strict = on;
    }

    pub fn is_strict_mode(&self) -> bool {
        self.interp.config().strict
    }

    pub fn set_max_recursion_depth(&mut self, depth: usize) {
        self.interp.config_mut().max_recursion_depth = depth;
    }

    pub fn max_recursion_depth(&self) -> usize {
        self.interp.config().max_recursion_depth
    }

    /// Zero disables the timeout.
    pub fn set_evaluation_timeout(&mut self, timeout: Duration) {
        self.interp.config_mut().evaluation_timeout = timeout;
    }

    pub fn evaluation_timeout(&self) -> Duration {
        self.interp.config().evaluation_timeout
    }
}

fn check_name(name: &str) -> Result<(), VariableError> {
    if name.trim().is_empty() {
        Err(VariableError::InvalidName)
    } else {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        let mut e = Engine::new();
        assert!(matches!(e.evaluate("   "), Err(EngineError::Empty)));
        assert_eq!(e.validate("").as_deref(), Some(EMPTY_EXPRESSION));
    }

    #[test]
    fn syntax_errors_carry_source() {
        let mut e = Engine::new();
        let err = e.evaluate("1 +").unwrap_err();
        assert!(err.is_syntax_error());
        assert!(err.to_string().starts_with("syntax error in `1 +`"));
        assert!(e.validate("1 + 2").is_none());
        assert!(e.validate("(1").is_some());
    }

    #[test]
    fn typed_results() {
        let mut e = Engine::new();
        assert_eq!(e.parse::<i32>("2 + 3 * 4").unwrap(), 14);
        assert_eq!(e.parse::<String>("'a' + 1").unwrap(), "a1");
        assert!(e.parse::<bool>("5 > 3 and 2 < 4").unwrap());
        assert!(matches!(
            e.parse::<i32>("'x'"),
            Err(EngineError::Result { .. })
        ));
        assert_eq!(e.parse_as("7", &TypeTag::String).unwrap(), Value::from("7"));
    }

    #[test]
    fn evaluate_with_replaces_variables() {
        let mut e = Engine::new();
        e.set_variable("stale", 1).unwrap();
        let v = e.evaluate_with("a * b", [("a", 6), ("b", 7)]).unwrap();
        assert_eq!(v, Value::Float(42.0));
        assert!(!e.has_variable("stale"));
    }

    #[test]
    fn evaluate_with_rejects_blank_names_up_front() {
        let mut e = Engine::new();
        e.set_variable("kept", 1).unwrap();
        let err = e
            .evaluate_with("a", [("a", 1), (" ", 2)])
            .unwrap_err();
        assert!(err.is_variable_error());
        assert!(e.has_variable("kept"));
        assert!(!e.has_variable("a"));
    }

    #[test]
    fn error_handler_sees_failures() {
        use parking_lot::Mutex;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut e = Engine::new();
        let sink = Arc::clone(&seen);
        e.set_error_handler(move |err| sink.lock().push(err.to_string()));
        assert!(e.error_handler().is_some());

        assert!(e.evaluate("1 +").is_err());
        assert!(e.evaluate("missing").is_err());
        assert!(e.evaluate("1 + 1").is_ok());
        assert!(e.evaluate_with("1", [("", 1)]).is_err());
        {
            let seen = seen.lock();
            assert_eq!(seen.len(), 3);
            assert!(seen[0].starts_with("syntax error in `1 +`"));
            assert!(seen[1].contains("missing"));
        }

        e.clear_error_handler();
        assert!(e.evaluate("missing").is_err());
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn variable_api() {
        let mut e = Engine::new();
        assert_eq!(e.set_variable("", 1), Err(VariableError::InvalidName));
        e.set_variable_uses("x", 5, 1).unwrap();
        assert!(e.has_variable_with_uses("x"));
        assert_eq!(e.get_variable("x").unwrap(), Some(Value::Int(5)));
        assert!(e.get_variable("x").is_err());
        assert_eq!(e.peek_variable("x"), Some(Value::Int(5)));
        assert!(!e.has_variable_with_uses("x"));
        assert!(!e.set_variable_if_absent("x", 9, -1).unwrap());
        assert!(e.remove_variable("x"));
        e.clear_variables();
        assert!(!e.has_variable("x"));
    }

    #[test]
    fn settings_round_trip() {
        let mut e = Engine::new();
        assert_eq!(e.max_recursion_depth(), 100);
        assert_eq!(e.evaluation_timeout(), Duration::ZERO);
        e.set_strict_mode(true);
        e.set_debug_mode(true);
        e.set_max_recursion_depth(3);
        e.set_evaluation_timeout(Duration::from_millis(250));
        assert!(e.is_strict_mode() && e.is_debug_mode());
        assert_eq!(e.max_recursion_depth(), 3);
        assert_eq!(e.evaluation_timeout(), Duration::from_millis(250));
        // Debug mode only adds logging.
        assert_eq!(e.evaluate("1 + 1").unwrap(), Value::Float(2.0));
    }

    #[test]
    fn empty_engine_has_no_builtins() {
        let mut e = Engine::empty();
        assert!(!e.has_function("add"));
        assert!(e.evaluate("add(1, 2)").unwrap_err().is_function_error());
        assert!(Engine::new().has_function("add"));
    }

    #[test]
    fn engine_is_reusable_after_errors() {
        let mut e = Engine::new();
        assert!(e.evaluate("1 / 0").is_err());
        assert!(e.evaluate("'unterminated").is_err());
        assert_eq!(e.evaluate("3 - 1").unwrap(), Value::Float(2.0));
    }
}
