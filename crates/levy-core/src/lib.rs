//! # levy-core: Pure Tax Rule Resolution
//!
//! This crate is the **heart** of Levy. It selects the tax rules that apply
//! to a transaction, evaluates their formulas and combines the results, all
//! as pure computation with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Levy Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 levy / seed binaries (levy-db)                  │   │
//! │  │        query --file ──► get_taxes ──► JSON report               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ levy-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │ selector  │  │  formula  │  │ pipeline  │  │  engine   │  │   │
//! │  │   │ specific- │  │  compile  │  │  factors  │  │  cache    │  │   │
//! │  │   │   ity     │  │  evaluate │  │  amounts  │  │  config   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    levy-db (Rule Store)                         │   │
//! │  │           SQLite queries, migrations, repositories              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (TaxRule, TaxQuery, TaxReport, etc.)
//! - [`money`] - Decimal rounding policy for factors and amounts
//! - [`error`] - Domain error types
//! - [`validation`] - Query and rule record validation
//! - [`config`] - Engine configuration
//! - [`formula`] - Formula compiler and evaluator
//! - [`selector`] - Exact-specificity rule selection
//! - [`pipeline`] - Rates → factors → amounts → totals
//! - [`store`] - Rule store abstraction and in-memory implementation
//! - [`engine`] - The `TaxEngine` facade
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same rules + same query = same report
//! 2. **No I/O**: stores are consumed through the [`store::RuleStore`] trait
//! 3. **Decimal Math**: rates and amounts are `rust_decimal`, never floats
//! 4. **Explicit Errors**: selection errors fail the query, formula errors
//!    stay on their tax
//!
//! ## Example Usage
//!
//! ```rust
//! use levy_core::{Column, MemoryRuleStore, TaxEngine, TaxQuery, TaxRule};
//! use rust_decimal::Decimal;
//!
//! let store = MemoryRuleStore::from_rules(vec![TaxRule::new("mx", "IVA")
//!     .with(Column::TxType, "sales")
//!     .rate("0.16")]);
//!
//! let query = TaxQuery::new("MX")
//!     .with(Column::TxType, "sales")
//!     .tax("IVA")
//!     .var("subTotal", 1000);
//!
//! let report = TaxEngine::default().get_taxes(&store, &query).unwrap();
//! assert_eq!(report.tax("IVA").unwrap().amount, Some(Decimal::from(160)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod formula;
pub mod money;
pub mod pipeline;
pub mod selector;
pub mod store;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use levy_core::TaxEngine` instead of
// `use levy_core::engine::TaxEngine`

pub use config::EngineConfig;
pub use engine::TaxEngine;
pub use error::{CoreError, CoreResult, FormulaError, ValidationError};
pub use money::Rounding;
pub use store::{MemoryRuleStore, RuleStore};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Variable name of the transaction base amount.
///
/// When a query binds it, amounts are derived from factors and the report
/// carries `taxTotal` and `grandTotal`.
pub const SUB_TOTAL_VAR: &str = "subTotal";

/// Decimal places kept on factors.
pub const DEFAULT_FACTOR_SCALE: u32 = 6;

/// Decimal places kept on amounts.
pub const DEFAULT_AMOUNT_SCALE: u32 = 2;

/// Maximum formula nesting depth.
///
/// ## Why a limit?
/// Formulas come from data, and a pathological `IF(IF(IF(...)))` chain must
/// fail with an error instead of exhausting the stack.
pub const DEFAULT_MAX_FORMULA_DEPTH: usize = 64;

/// Maximum formula text length in characters.
pub const MAX_FORMULA_LENGTH: usize = 4096;
