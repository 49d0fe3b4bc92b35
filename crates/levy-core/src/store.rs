//! # Rule Store
//!
//! Where the engine gets its rules from.
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────────────────────┐
//! │  RuleStore (trait)   │◄───────│ MemoryRuleStore (this module)        │
//! │  rules_by_country()  │        │   built from a RuleCatalog / JSON    │
//! │  country()           │        └──────────────────────────────────────┘
//! └──────────────────────┘
//!            ▲  same operations, async
//!            └──────────────────── levy-db: TaxRuleRepository + CountryRepository
//! ```

use std::collections::HashMap;
use tracing::info;

use crate::error::{CoreResult, ValidationError};
use crate::types::{Country, RuleCatalog, TaxRule};
use crate::validation::validate_catalog;

/// Read access to tax rules and countries.
pub trait RuleStore {
    /// Every rule of a country (lowercase code), in catalog order.
    fn rules_by_country(&self, country: &str) -> Vec<TaxRule>;

    /// Country metadata, if the code is known.
    fn country(&self, code: &str) -> Option<Country>;
}

/// In-memory rule store keyed by country.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleStore {
    countries: Vec<Country>,
    rules: HashMap<String, Vec<TaxRule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from unvalidated rules.
    pub fn from_rules(rules: Vec<TaxRule>) -> Self {
        let mut store = Self::new();
        for rule in rules {
            store.insert(rule);
        }
        store
    }

    /// Builds a store from a catalog, validating every record first.
    pub fn from_catalog(catalog: RuleCatalog) -> CoreResult<Self> {
        validate_catalog(&catalog)?;

        let mut store = Self::from_rules(catalog.tax_rules);
        store.countries = catalog.countries;
        info!(
            countries = store.countries.len(),
            rules = store.len(),
            "Loaded rule catalog"
        );
        Ok(store)
    }

    /// Parses and loads a catalog document (`{ countries, taxRules }`).
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let catalog: RuleCatalog =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidFormat {
                field: "catalog".to_string(),
                reason: e.to_string(),
            })?;
        Self::from_catalog(catalog)
    }

    /// Adds a rule, keeping insertion order within its country.
    pub fn insert(&mut self, rule: TaxRule) {
        self.rules
            .entry(rule.country.to_lowercase())
            .or_default()
            .push(rule);
    }

    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    /// Total number of rules across all countries.
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleStore for MemoryRuleStore {
    fn rules_by_country(&self, country: &str) -> Vec<TaxRule> {
        self.rules
            .get(&country.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    fn country(&self, code: &str) -> Option<Country> {
        self.countries
            .iter()
            .find(|country| country.code.eq_ignore_ascii_case(code))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    const CATALOG: &str = include_str!("../../../data/tax_rules.json");

    #[test]
    fn test_loads_bundled_catalog() {
        let store = MemoryRuleStore::from_json(CATALOG).unwrap();
        assert_eq!(store.countries().len(), 3);
        assert_eq!(store.rules_by_country("MX").len(), 14);
        assert_eq!(store.rules_by_country("sa").len(), 4);
        assert_eq!(store.rules_by_country("ar").len(), 2);
        assert!(store.rules_by_country("zz").is_empty());
        assert_eq!(store.country("SA").unwrap().name, "Saudi Arabia");
    }

    #[test]
    fn test_rejects_invalid_catalog() {
        let json = r#"{ "taxRules": [ { "country": "mx", "taxName": "IVA" } ] }"#;
        assert!(matches!(
            MemoryRuleStore::from_json(json),
            Err(CoreError::Validation(ValidationError::Required { .. }))
        ));

        let json = r#"{ "taxRules": [ { "country": "mx", "taxName": "IVA", "category": "!" } ] }"#;
        assert!(matches!(
            MemoryRuleStore::from_json(json),
            Err(CoreError::Validation(ValidationError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut store = MemoryRuleStore::new();
        store.insert(TaxRule::new("mx", "IVA").rate("0.16"));
        store.insert(TaxRule::new("mx", "ISR").rate("0.10"));
        let names: Vec<String> = store
            .rules_by_country("mx")
            .into_iter()
            .map(|rule| rule.tax_name)
            .collect();
        assert_eq!(names, vec!["IVA", "ISR"]);
    }
}
