//! The expression language: tokens, syntax tree, parser, interpreter and the
//! [`Engine`] facade that ties them together.

pub mod ast;
pub mod builtins;
pub mod coerce;
pub mod define;
pub mod engine;
pub mod error;
pub mod format;
pub mod function;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod value;

pub use ast::Expr;
pub use coerce::{coerce, FromValue, TypeTag};
pub use define::FunctionDefinition;
pub use engine::{Engine, ErrorHandler};
pub use error::{
    CoercionError, DefinitionError, EngineError, EvalError, FunctionError, SyntaxError,
    VariableError,
};
pub use function::{AccessFilter, FunctionRegistry, NativeFn, RegisteredFunction};
pub use interp::{Interpreter, InterpreterConfig};
pub use value::{HostValue, Value};
