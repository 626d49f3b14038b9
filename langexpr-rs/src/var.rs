//! Use-counted variable store.
//!
//! Every variable carries a use budget.  A consuming [`VarStore::read`]
//! spends one use; once the budget hits zero further reads fail.  A negative
//! budget means unlimited.  [`VarStore::peek`] never spends a use.

use std::collections::HashMap;

use tracing::trace;

use crate::expr::error::VariableError;
use crate::expr::value::Value;

/// Use budget meaning "no limit".
pub const UNLIMITED: i64 = -1;

/// A stored value and its remaining use budget.
#[derive(Debug, Clone)]
pub struct Slot {
    value: Value,
    remaining_uses: i64,
    max_uses: i64,
}

impl Slot {
    pub fn new(value: Value, uses: i64) -> Self {
        Slot {
            value,
            remaining_uses: uses,
            max_uses: uses,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn remaining_uses(&self) -> i64 {
        self.remaining_uses
    }

    pub fn max_uses(&self) -> i64 {
        self.max_uses
    }

    pub fn is_unlimited(&self) -> bool {
        self.remaining_uses < 0
    }

    /// Spend one use and return the value.
    fn consume(&mut self, name: &str) -> Result<Value, VariableError> {
        if self.remaining_uses == 0 {
            return Err(VariableError::Exhausted {
                name: name.to_string(),
                max_uses: self.max_uses,
            });
        }
        if self.remaining_uses > 0 {
            self.remaining_uses -= 1;
            trace!(variable = name, remaining = self.remaining_uses, "variable use consumed");
        }
        Ok(self.value.clone())
    }
}

#[derive(Debug, Default)]
pub struct VarStore {
    vars: HashMap<String, Slot>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable with a fresh use budget.
    pub fn set(&mut self, name: impl Into<String>, value: Value, uses: i64) {
        self.vars.insert(name.into(), Slot::new(value, uses));
    }

    /// Set a variable only if the name is not already bound.  Returns `true`
    /// if the value was stored.
    pub fn set_if_absent(&mut self, name: impl Into<String>, value: Value, uses: i64) -> bool {
        let mut stored = false;
        self.vars.entry(name.into()).or_insert_with(|| {
            stored = true;
            Slot::new(value, uses)
        });
        stored
    }

    /// Consuming read.  `Ok(None)` means the name is not bound here.
    pub fn read(&mut self, name: &str) -> Result<Option<Value>, VariableError> {
        match self.vars.get_mut(name) {
            Some(slot) => slot.consume(name).map(Some),
            None => Ok(None),
        }
    }

    /// Non-consuming read.
    pub fn peek(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).map(Slot::value)
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.vars.get(name)
    }

    /// Detach a variable's slot, use budget included.
    pub fn take_slot(&mut self, name: &str) -> Option<Slot> {
        self.vars.remove(name)
    }

    pub fn restore_slot(&mut self, name: impl Into<String>, slot: Slot) {
        self.vars.insert(name.into(), slot);
    }

    /// Remove a variable.  Returns `true` if it existed.
    pub fn unset(&mut self, name: &str) -> bool {
        self.vars.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// `true` if the variable exists and a consuming read would succeed.
    pub fn has_uses_left(&self, name: &str) -> bool {
        self.vars.get(name).is_some_and(|s| s.remaining_uses != 0)
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Slot)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_reads() {
        let mut vars = VarStore::new();
        vars.set("wrap", Value::Int(1), UNLIMITED);
        for _ in 0..5 {
            assert_eq!(vars.read("wrap").unwrap(), Some(Value::Int(1)));
        }
        assert!(vars.slot("wrap").unwrap().is_unlimited());
    }

    #[test]
    fn budget_runs_out() {
        let mut vars = VarStore::new();
        vars.set("x", Value::Int(5), 2);
        assert!(vars.read("x").unwrap().is_some());
        assert_eq!(vars.slot("x").unwrap().remaining_uses(), 1);
        assert!(vars.read("x").unwrap().is_some());
        assert_eq!(
            vars.read("x"),
            Err(VariableError::Exhausted {
                name: "x".into(),
                max_uses: 2
            })
        );
        assert!(!vars.has_uses_left("x"));
    }

    #[test]
    fn peek_does_not_consume() {
        let mut vars = VarStore::new();
        vars.set("x", Value::from("hi"), 1);
        for _ in 0..3 {
            assert_eq!(vars.peek("x"), Some(&Value::from("hi")));
        }
        assert!(vars.has_uses_left("x"));
        assert!(vars.read("x").is_ok());
    }

    #[test]
    fn overwrite_resets_budget() {
        let mut vars = VarStore::new();
        vars.set("x", Value::Int(1), 1);
        vars.read("x").unwrap();
        vars.set("x", Value::Int(2), 1);
        assert_eq!(vars.read("x").unwrap(), Some(Value::Int(2)));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn set_if_absent_keeps_existing() {
        let mut vars = VarStore::new();
        assert!(vars.set_if_absent("x", Value::Int(1), UNLIMITED));
        assert!(!vars.set_if_absent("x", Value::Int(2), UNLIMITED));
        assert_eq!(vars.peek("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn missing_and_unset() {
        let mut vars = VarStore::new();
        assert_eq!(vars.read("nope"), Ok(None));
        vars.set("gone", Value::Null, UNLIMITED);
        assert!(vars.unset("gone"));
        assert!(!vars.unset("gone"));
        assert!(!vars.contains("gone"));
        assert!(vars.is_empty());
    }
}
