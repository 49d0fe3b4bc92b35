//! Runtime values and the variable environment.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

use crate::error::{FormulaError, FormulaResult};

/// Result of evaluating a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Number(Decimal),
    Bool(bool),
}

impl Value {
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
        }
    }

    /// The numeric value; booleans are a `TypeMismatch`.
    pub fn as_number(&self) -> FormulaResult<Decimal> {
        match self {
            Value::Number(number) => Ok(*number),
            Value::Bool(_) => Err(FormulaError::TypeMismatch {
                expected: "number".to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }

    /// Booleans are themselves; numbers are true when non-zero.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(number) => !number.is_zero(),
            Value::Bool(flag) => *flag,
        }
    }
}

impl From<Decimal> for Value {
    fn from(number: Decimal) -> Self {
        Value::Number(number)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(number) => write!(f, "{}", number),
            Value::Bool(flag) => write!(f, "{}", flag),
        }
    }
}

/// Named values visible to a formula.
///
/// Built fresh for every query and cloned per rule, so bindings never leak
/// between queries or between sibling rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    values: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds (or rebinds) a name.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }

    /// Looks a name up, failing with `UnknownVariable`.
    pub fn lookup(&self, name: &str) -> FormulaResult<Value> {
        self.get(name).ok_or_else(|| FormulaError::UnknownVariable {
            name: name.to_string(),
        })
    }

    /// A bound numeric value, if the name is bound to a number.
    pub fn number(&self, name: &str) -> Option<Decimal> {
        match self.get(name) {
            Some(Value::Number(number)) => Some(number),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Number(Decimal::ZERO).is_truthy());
        assert!(Value::Number(Decimal::new(-1, 2)).is_truthy());
    }

    #[test]
    fn test_bool_is_not_a_number() {
        assert!(matches!(
            Value::Bool(true).as_number(),
            Err(FormulaError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_lookup() {
        let mut env = Environment::new();
        env.bind("subTotal", Decimal::from(1000));
        assert_eq!(env.number("subTotal"), Some(Decimal::from(1000)));
        assert_eq!(
            env.lookup("missing"),
            Err(FormulaError::UnknownVariable { name: "missing".into() })
        );
    }
}
