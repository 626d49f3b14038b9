//! Error types for every stage of the engine.
//!
//! Each stage has its own enum; they nest upward through `#[from]`
//! conversions until [`EngineError`] attaches the source expression text at
//! the public boundary.

use thiserror::Error;

/// Lexer or parser failure.  Fatal: there is no error recovery.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxError {
    #[error("unexpected character '{ch}' at {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unterminated string starting at {position}")]
    UnterminatedString { position: usize },

    #[error("invalid number literal '{text}' at {position}")]
    InvalidNumber { text: String, position: usize },

    /// A grammar violation.  `found` is the offending token as displayed.
    #[error("{message} (found {found} at {position})")]
    Unexpected {
        message: String,
        found: String,
        position: usize,
    },
}

/// Best-effort conversion failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {value} to {target}")]
pub struct CoercionError {
    pub value: String,
    pub target: String,
}

/// Variable lookup failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariableError {
    #[error("undefined variable or context: {0}")]
    Undefined(String),

    #[error("access to variable '{0}' is not allowed")]
    Denied(String),

    #[error("variable '{name}' exceeded its allowed uses (0/{max_uses})")]
    Exhausted { name: String, max_uses: i64 },

    #[error("variable name cannot be empty")]
    InvalidName,
}

/// Function dispatch failures.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("undefined function: {0}")]
    Undefined(String),

    #[error("access to function '{0}' is not allowed")]
    Denied(String),

    #[error("function {name} expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    /// `index` is 1-based.
    #[error("argument {index} ('{param}') to function {name} is not of type {expected}: {source}")]
    ArgumentType {
        name: String,
        index: usize,
        param: String,
        expected: String,
        #[source]
        source: CoercionError,
    },

    #[error("return value of function {name} cannot be converted to {expected}: {source}")]
    ReturnType {
        name: String,
        expected: String,
        #[source]
        source: CoercionError,
    },

    #[error("call to {name} exceeds the maximum recursion depth of {limit}")]
    RecursionLimit { name: String, limit: usize },

    /// An error escaping the callable itself.
    #[error("error calling function {name}: {source}")]
    Raised {
        name: String,
        #[source]
        source: Box<EvalError>,
    },
}

/// Anything that can go wrong while walking an expression tree.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid operand for operator {op}: {found} (must be a number)")]
    NotANumber { op: &'static str, found: String },

    #[error("operands of '+' must be two numbers or at least one string")]
    InvalidConcat,

    #[error("evaluation exceeded the timeout of {millis} ms")]
    Timeout { millis: u128 },

    /// A plain message raised by a host callable.
    #[error("{0}")]
    Host(String),
}

impl EvalError {
    /// Build a message error, for use inside host callables.
    pub fn host(msg: impl Into<String>) -> Self {
        EvalError::Host(msg.into())
    }

    /// Follow [`FunctionError::Raised`] wrappers down to the original error.
    pub fn root_cause(&self) -> &EvalError {
        match self {
            EvalError::Function(FunctionError::Raised { source, .. }) => source.root_cause(),
            other => other,
        }
    }

    pub fn is_variable_error(&self) -> bool {
        matches!(self.root_cause(), EvalError::Variable(_))
    }

    pub fn is_function_error(&self) -> bool {
        matches!(self, EvalError::Function(_))
    }
}

/// Malformed `name(params) => body` definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("invalid function format, expected 'name(params) => expression'")]
    MissingArrow,

    #[error("invalid function parameters, expected 'name(param1, param2)'")]
    MissingParams,

    #[error("mismatched parentheses in function definition: {header}{}", .at.map(|p| format!(" at position {p}")).unwrap_or_default())]
    UnbalancedParens { header: String, at: Option<usize> },

    #[error("invalid function name '{0}'")]
    InvalidName(String),

    #[error("invalid parameter '{param}' in definition of {name}")]
    InvalidParam { name: String, param: String },

    #[error("syntax error in body of {name}: {source}")]
    Body {
        name: String,
        #[source]
        source: SyntaxError,
    },
}

/// Error returned by the public [`Engine`](super::engine::Engine) API,
/// annotated with the expression text being processed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("expression cannot be empty")]
    Empty,

    #[error("syntax error in `{expression}`: {source}")]
    Syntax {
        expression: String,
        #[source]
        source: SyntaxError,
    },

    #[error("error evaluating `{expression}`: {source}")]
    Eval {
        expression: String,
        #[source]
        source: EvalError,
    },

    #[error("unexpected result type for `{expression}`: {source}")]
    Result {
        expression: String,
        #[source]
        source: CoercionError,
    },
}

impl EngineError {
    /// The evaluation error, if this failure happened while evaluating.
    pub fn eval_error(&self) -> Option<&EvalError> {
        match self {
            EngineError::Eval { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_syntax_error(&self) -> bool {
        matches!(self, EngineError::Syntax { .. })
    }

    pub fn is_variable_error(&self) -> bool {
        self.eval_error().is_some_and(EvalError::is_variable_error)
    }

    pub fn is_function_error(&self) -> bool {
        self.eval_error().is_some_and(EvalError::is_function_error)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
