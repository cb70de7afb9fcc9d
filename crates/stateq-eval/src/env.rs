//! Dynamically scoped variable environment.

use std::collections::BTreeMap;

use crate::value::Value;

#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: BTreeMap<String, Value>,
}

/// Variable environment with push/pop semantics.
///
/// Lookups search from the innermost scope outward, so a `block` local
/// shadows a global for everything evaluated while the block runs,
/// including called functions.
#[derive(Debug, Clone)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    /// One global scope holding `simp: true`.
    pub fn new() -> Self {
        let mut global = Scope::default();
        global.bindings.insert("simp".to_string(), Value::Bool(true));
        Self {
            scopes: vec![global],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pop the innermost scope. The global scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Bind in the innermost scope.
    pub fn define(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.to_string(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
    }

    /// Assign to the innermost scope that binds `name`, or to the global
    /// scope when none does.
    pub fn set(&mut self, name: &str, value: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.bindings.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.scopes[0].bindings.insert(name.to_string(), value);
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Global bindings, for inspecting what a program leaked.
    pub fn global_bindings(&self) -> &BTreeMap<String, Value> {
        &self.scopes[0].bindings
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
