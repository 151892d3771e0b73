//! Functions and variables a host application exposes to scripts.

mod internal;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::function::{Arity, Function, InternalFunction, IntrinsicFunction};
use crate::variable::Variable;

/// Name-keyed tables of host functions and read-only host variables.
///
/// The compiler resolves calls and variable references against these
/// tables; a loaded program re-binds its host functions against them by
/// name.
#[derive(Debug, Clone, Default)]
pub struct HostRegistry {
    functions: IndexMap<String, Function>,
    variables: IndexMap<String, Variable>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function answered by the runtime host's `function`
    /// event.
    pub fn register_intrinsic(&mut self, name: impl Into<String>, arity: Arity) -> &mut Self {
        let name = name.into();
        self.functions
            .insert(name.clone(), Function::Intrinsic(IntrinsicFunction { name, arity }));
        self
    }

    /// Registers a function backed by a native callback.
    pub fn register_native<F>(&mut self, name: impl Into<String>, arity: Arity, action: F) -> &mut Self
    where
        F: Fn(&[Variable]) -> Variable + Send + Sync + 'static,
    {
        let name = name.into();
        let function = InternalFunction { name: name.clone(), arity, action: Arc::new(action) };
        self.functions.insert(name, Function::Internal(function));
        self
    }

    /// Registers a read-only global visible to every script.
    pub fn register_variable(&mut self, name: impl Into<String>, value: impl Into<Variable>) -> &mut Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Adds the built-in functions and variables. Names the host already
    /// registered keep their host definition.
    pub fn merge_internals(&mut self) {
        for (name, arity, action) in internal::functions() {
            if !self.functions.contains_key(name) {
                self.register_native(name, arity, action);
            }
        }
        for (name, value) in internal::variables() {
            if !self.variables.contains_key(name) {
                self.variables.insert(name.to_string(), value);
            }
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_names_win_over_builtins() {
        let mut registry = HostRegistry::new();
        registry
            .register_variable("True", "yes")
            .register_intrinsic("Len", Arity::exactly(2));
        registry.merge_internals();
        assert_eq!(registry.variable("True"), Some(&Variable::from("yes")));
        assert_eq!(registry.variable("False"), Some(&Variable::Integer(0)));
        assert!(matches!(registry.function("Len"), Some(Function::Intrinsic(_))));
        assert!(matches!(registry.function("UCase"), Some(Function::Internal(_))));
    }

    #[test]
    fn native_callbacks_are_callable() {
        let mut registry = HostRegistry::new();
        registry.register_native("Twice", Arity::exactly(1), |args| {
            args[0].multiply(&Variable::from(2))
        });
        let Some(Function::Internal(f)) = registry.function("Twice") else {
            panic!("expected internal function");
        };
        assert_eq!(f.call(&[Variable::from(21)]), Variable::Integer(42));
    }

    #[test]
    fn registration_order_is_kept() {
        let mut registry = HostRegistry::new();
        registry.register_intrinsic("B", Arity::ANY).register_intrinsic("A", Arity::ANY);
        let names: Vec<&str> = registry.functions().map(Function::name).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
