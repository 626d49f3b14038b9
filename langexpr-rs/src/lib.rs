pub mod cli;
pub mod config;
pub mod expr;
pub mod pool;
pub mod var;

pub use expr::{Engine, EngineError, EvalError, TypeTag, Value};
pub use pool::EnginePool;
