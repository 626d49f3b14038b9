//! Function registry and name-based access filters.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::coerce::TypeTag;
use super::error::EvalError;
use super::interp::Interpreter;
use super::value::Value;

/// A host callable.  Receives the interpreter, the evaluated arguments, and
/// the resolved call type (explicit `name<Type>(..)` or the registered
/// default).
pub type NativeFn =
    Arc<dyn Fn(&mut Interpreter, Vec<Value>, Option<&str>) -> Result<Value, EvalError> + Send + Sync>;

/// A callable plus its optional type information.
#[derive(Clone)]
pub struct RegisteredFunction {
    pub callable: NativeFn,
    pub default_type: Option<String>,
    /// Per-position argument conversions.  Arguments past the end are left
    /// alone.
    pub arg_types: Option<Vec<TypeTag>>,
    pub return_type: Option<TypeTag>,
}

impl RegisteredFunction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Interpreter, Vec<Value>, Option<&str>) -> Result<Value, EvalError>
            + Send
            + Sync
            + 'static,
    {
        RegisteredFunction {
            callable: Arc::new(f),
            default_type: None,
            arg_types: None,
            return_type: None,
        }
    }

    pub fn with_default_type(mut self, ty: impl Into<String>) -> Self {
        self.default_type = Some(ty.into());
        self
    }

    pub fn with_signature(mut self, arg_types: Vec<TypeTag>, return_type: Option<TypeTag>) -> Self {
        self.arg_types = Some(arg_types);
        self.return_type = return_type;
        self
    }
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("default_type", &self.default_type)
            .field("arg_types", &self.arg_types)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

/// Name → function table.  The first registration of a name wins.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, RegisteredFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (and keeps the existing entry) if `name` is taken.
    pub fn register(&mut self, name: impl Into<String>, f: RegisteredFunction) -> bool {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return false;
        }
        self.functions.insert(name, f);
        true
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn clear(&mut self) {
        self.functions.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Whitelist/blacklist name filter.
///
/// A non-empty whitelist admits only the names it lists.  The blacklist
/// always denies, even names that are whitelisted.
#[derive(Debug, Clone, Default)]
pub struct AccessFilter {
    whitelist: HashSet<String>,
    blacklist: HashSet<String>,
}

impl AccessFilter {
    pub fn set_whitelist<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = names.into_iter().map(Into::into).collect();
    }

    pub fn set_blacklist<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = names.into_iter().map(Into::into).collect();
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        if !self.whitelist.is_empty() && !self.whitelist.contains(name) {
            return false;
        }
        !self.blacklist.contains(name)
    }

    pub fn whitelist(&self) -> &HashSet<String> {
        &self.whitelist
    }

    pub fn blacklist(&self) -> &HashSet<String> {
        &self.blacklist
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
