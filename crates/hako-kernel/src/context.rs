//! ExecContext — the continuation carried from one fragment to the next.
//!
//! A context is an immutable snapshot of the ordered bindings produced by
//! evaluating a fragment against a prior context. Evaluating never mutates a
//! context in place; it produces a new snapshot. The sandbox's shared context
//! is compared by `Arc` pointer identity when committing, not by value
//! equality — two unrelated evaluations may coincidentally produce equal
//! bindings.

use std::sync::Arc;

use hako_types::{Binding, Value};

/// Immutable snapshot of ordered top-level bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecContext {
    bindings: Vec<Binding>,
}

impl ExecContext {
    /// The empty context: no bindings yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a context from a list of bindings, preserving order.
    pub fn from_bindings(bindings: Vec<Binding>) -> Self {
        Self { bindings }
    }

    /// All bindings, in declaration order.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Look up a binding's value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.value)
    }

    /// Produce a new snapshot with `binding` applied: an existing binding of
    /// the same name is replaced in place, otherwise the binding is appended.
    pub fn with_binding(&self, binding: Binding) -> ExecContext {
        let mut bindings = self.bindings.clone();
        match bindings.iter_mut().find(|b| b.name == binding.name) {
            Some(slot) => *slot = binding,
            None => bindings.push(binding),
        }
        ExecContext { bindings }
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True if no bindings exist.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Pointer-identity comparison of two optional context handles.
///
/// Used for the commit check in `Sandbox::execute`: the outer evaluation may
/// only install its result context if the shared slot still holds the handle
/// it observed on entry.
pub fn same_context(a: &Option<Arc<ExecContext>>, b: &Option<Arc<ExecContext>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}
