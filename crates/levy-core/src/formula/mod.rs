//! # Formula Module
//!
//! The small expression language used by rule rates, amounts and variables.
//!
//! ## Language
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  literals     0.16   1000   true   false                               │
//! │  arithmetic   +  -  *  /  %   unary -                                  │
//! │  comparison   >  >=  <  <=  ==  !=                                     │
//! │  logic        AND(a, b, ...)  OR(a, b, ...)  NOT(x)   &&  ||  !        │
//! │  conditional  IF(cond, then, else)          (lazy)                     │
//! │  numeric      MIN(...)  MAX(...)  ROUND(x, places)  ABS(x)             │
//! │  variables    subTotal, unitPrice, any earlier-bound name              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Literals inside an expression are read by the grammar as `i64` or `f64`.
//! Decimal-point literals with more than
//! [`MAX_FLOAT_LITERAL_DIGITS`](ast::MAX_FLOAT_LITERAL_DIGITS) significant
//! digits are rejected at compile time instead of being rounded. Plain
//! literals (`"0.1234567890123456789"` or a JSON number) never reach the
//! grammar and keep every digit.
//!
//! ## Flow
//! ```text
//! FormulaSource ──► Literal(dec) ────────────────────────────► Value
//!               └─► Expression(text) ─► FormulaCache ─► Expr ─► evaluate(env)
//! ```
//!
//! ## Usage
//! ```rust
//! use levy_core::formula::{Environment, FormulaCache, Value};
//! use levy_core::FormulaSource;
//! use rust_decimal::Decimal;
//!
//! let cache = FormulaCache::new(64, 128);
//! let mut env = Environment::new();
//! env.bind("unitPrice", Decimal::from(3000));
//!
//! let source = FormulaSource::from_text("IF(unitPrice > 2000, 0.02, 0.05)").unwrap();
//! let value = cache.evaluate(&source, &env).unwrap();
//! assert_eq!(value, Value::Number("0.02".parse().unwrap()));
//! ```

pub mod ast;
pub mod cache;
pub mod env;
mod eval;

pub use ast::{compile, BinaryOp, Expr, Function};
pub use cache::FormulaCache;
pub use env::{Environment, Value};
pub use eval::evaluate;

use crate::error::FormulaResult;
use crate::types::FormulaSource;

impl FormulaCache {
    /// Evaluates a literal or formula against `env`.
    pub fn evaluate(&self, source: &FormulaSource, env: &Environment) -> FormulaResult<Value> {
        match source {
            FormulaSource::Literal(number) => Ok(Value::Number(*number)),
            FormulaSource::Expression(text) => evaluate(&*self.compile(text)?, env),
        }
    }

    /// Evaluates `source` and requires a numeric result.
    pub fn evaluate_number(
        &self,
        source: &FormulaSource,
        env: &Environment,
    ) -> FormulaResult<rust_decimal::Decimal> {
        self.evaluate(source, env)?.as_number()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormulaError;
    use rust_decimal::Decimal;

    #[test]
    fn test_literal_bypasses_grammar() {
        let cache = FormulaCache::new(64, 16);
        let value = cache
            .evaluate(&FormulaSource::Literal(Decimal::new(16, 2)), &Environment::new())
            .unwrap();
        assert_eq!(value, Value::Number(Decimal::new(16, 2)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_boolean_result_is_not_a_rate() {
        let cache = FormulaCache::new(64, 16);
        let source = FormulaSource::from_text("1 > 0").unwrap();
        assert!(matches!(
            cache.evaluate_number(&source, &Environment::new()),
            Err(FormulaError::TypeMismatch { .. })
        ));
    }
}
