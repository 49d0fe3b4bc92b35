//! # Error Types
//!
//! Domain-specific error types for levy-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  levy-core errors (this file)                                          │
//! │  ├── CoreError        - Fatal to the whole query (selection, config)   │
//! │  ├── FormulaError     - Attached to ONE tax result, never fatal        │
//! │  └── ValidationError  - Malformed queries and rule records             │
//! │                                                                         │
//! │  levy-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → CLI exit                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (country, tax name, query)
//! 3. Errors are enum variants, never String
//! 4. Selection errors abort the query; formula errors stay on their tax

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors that fail a whole `get_taxes` call.
///
/// Every selection variant carries the offending query (rendered with
/// [`TaxQuery`](crate::types::TaxQuery)'s `Display`) so a data-authoring
/// defect can be traced back to the attributes that triggered it.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No rules exist for the requested country.
    #[error("Tax rules for country '{country}' not found")]
    CountryNotFound { country: String },

    /// Attribute filtering eliminated every candidate rule.
    #[error("No tax rules found for {query}")]
    NoRuleForParams { query: String },

    /// Some requested tax names matched no candidate.
    #[error("No tax rule for {missing:?} found for {query}")]
    NoRuleForTaxes { missing: Vec<String>, query: String },

    /// More than one rule satisfies the same tax name under the same
    /// attributes.
    ///
    /// ## When This Occurs
    /// Two rules for one tax declare identical columns and values. This is
    /// always a data defect; the engine never picks one silently.
    #[error("{count} rules match tax {tax} for {query}")]
    AmbiguousRule {
        tax: String,
        count: usize,
        query: String,
    },

    /// A selected rule's validity window ended before the evaluation time.
    #[error("Rule for tax {tax} expired at {valid_until}")]
    RuleExpired {
        tax: String,
        valid_until: DateTime<Utc>,
    },

    /// A selected rule's validity window starts after the evaluation time.
    #[error("Rule for tax {tax} is not valid before {valid_from}")]
    RuleNotYetValid {
        tax: String,
        valid_from: DateTime<Utc>,
    },

    /// A query-supplied variable formula failed to evaluate.
    #[error("Query variable '{name}' could not be evaluated: {source}")]
    InvalidQueryVariable {
        name: String,
        #[source]
        source: FormulaError,
    },

    /// Summing the tax amounts overflowed the decimal range.
    #[error("Tax totals overflow for {query}")]
    TotalsOverflow { query: String },

    /// Engine configuration is unusable.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Formula Error
// =============================================================================

/// Errors raised while compiling or evaluating one formula.
///
/// These are recoverable at the level of a single tax: the pipeline stores
/// them in [`TaxResult::error`](crate::types::TaxResult) and keeps resolving
/// the sibling taxes.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormulaError {
    /// The formula text could not be parsed.
    #[error("Syntax error in '{formula}': {message}")]
    Syntax { formula: String, message: String },

    /// A referenced variable is not bound (or is bound later in `vars`).
    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String },

    /// A called function is not part of the formula language.
    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    /// A function was called with the wrong number of arguments.
    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    /// An operand had the wrong type (e.g. arithmetic on a boolean).
    #[error("Expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Division or remainder by zero.
    #[error("Division by zero")]
    DivisionByZero,

    /// Decimal arithmetic overflowed.
    #[error("Arithmetic overflow")]
    Overflow,

    /// The formula nests deeper than the configured limit.
    #[error("Formula nesting exceeds {max} levels")]
    DepthExceeded { max: usize },

    /// A construct the grammar accepts but the engine does not evaluate
    /// (strings, assignments, exponentiation).
    #[error("Unsupported construct: {construct}")]
    Unsupported { construct: String },

    /// The tax this withholding depends on carries its own error.
    #[error("Dependency {dependency} failed to evaluate")]
    DependencyFailed { dependency: String },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised for malformed queries before selection runs, and for malformed
/// rule records when a catalog is loaded.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., country code, matcher, validity window).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., the same tax requested twice).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

/// Convenience type alias for Results with FormulaError.
pub type FormulaResult<T> = Result<T, FormulaError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::AmbiguousRule {
            tax: "IVA".to_string(),
            count: 2,
            query: "country=mx txType=sales".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "2 rules match tax IVA for country=mx txType=sales"
        );

        let err = CoreError::CountryNotFound {
            country: "zz".to_string(),
        };
        assert_eq!(err.to_string(), "Tax rules for country 'zz' not found");
    }

    #[test]
    fn test_formula_error_serializes_with_kind_tag() {
        let err = FormulaError::UnknownVariable {
            name: "subTotal".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "unknown_variable");
        assert_eq!(json["name"], "subTotal");

        let json = serde_json::to_value(FormulaError::DivisionByZero).unwrap();
        assert_eq!(json["kind"], "division_by_zero");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "taxes".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
