//! # Tax Engine
//!
//! The public entry point: query in, report out.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get_taxes(store, query)                                                │
//! │       │                                                                 │
//! │       ├── validate_query            → ValidationError                   │
//! │       ├── store.rules_by_country    → Vec<TaxRule>                      │
//! │       └── resolve(rules, query, at)                                     │
//! │               ├── selector::select  → one rule per tax  (CoreError)     │
//! │               └── Pipeline::run     → TaxReport                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Thread Safety
//! `TaxEngine` is `Send + Sync`. Each call builds its own environment; the
//! only shared state is the compiled-formula cache.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::CoreResult;
use crate::formula::FormulaCache;
use crate::money::Rounding;
use crate::pipeline::Pipeline;
use crate::selector::select;
use crate::store::RuleStore;
use crate::types::{TaxQuery, TaxReport, TaxRule};
use crate::validation::validate_query;

/// Resolves tax queries against a rule store.
#[derive(Debug)]
pub struct TaxEngine {
    config: EngineConfig,
    rounding: Rounding,
    cache: FormulaCache,
}

impl TaxEngine {
    /// Creates an engine after validating `config`.
    pub fn new(config: EngineConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        TaxEngine {
            rounding: Rounding::new(config.factor_scale, config.amount_scale),
            cache: FormulaCache::new(config.max_formula_depth, config.max_cached_formulas),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of compiled formulas currently cached.
    pub fn cached_formulas(&self) -> usize {
        self.cache.len()
    }

    /// Fetches the query country's rules from `store` and resolves the query
    /// at `query.at` (default: now).
    pub fn get_taxes<S>(&self, store: &S, query: &TaxQuery) -> CoreResult<TaxReport>
    where
        S: RuleStore + ?Sized,
    {
        validate_query(query)?;
        let code = query.country_code();
        let rules = store.rules_by_country(&code);
        match store.country(&code) {
            Some(country) => {
                debug!(country = %code, name = %country.name, rules = rules.len(), "Fetched rules")
            }
            None => debug!(country = %code, rules = rules.len(), "Country not in catalog"),
        }
        self.resolve(&rules, query, query.at.unwrap_or_else(Utc::now))
    }

    /// Resolves a query against pre-fetched rules at instant `now`.
    pub fn resolve(
        &self,
        rules: &[TaxRule],
        query: &TaxQuery,
        now: DateTime<Utc>,
    ) -> CoreResult<TaxReport> {
        validate_query(query)?;
        let selected = select(rules, query, &self.config.columns, now)?;
        debug!(query = %query, selected = selected.len(), %now, "Selected rules");
        Pipeline::new(&self.cache, self.rounding).run(&selected, query)
    }
}

impl Default for TaxEngine {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
