//! Variable bindings produced by fragment evaluation.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One named top-level binding: name, declared type, current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Variable name.
    pub name: String,
    /// Declared type name (e.g. "int", "string").
    pub ty: String,
    /// Current value.
    pub value: Value,
}

impl Binding {
    /// Create a binding, deriving the type name from the value.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            ty: value.type_name().to_string(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_derived_from_value() {
        let b = Binding::new("x", Value::Int(5));
        assert_eq!(b.name, "x");
        assert_eq!(b.ty, "int");
        assert_eq!(b.value, Value::Int(5));
    }
}
