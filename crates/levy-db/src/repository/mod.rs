//! # Repository Module
//!
//! Database repository implementations for the rule store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database::get_taxes(&engine, &query)                                   │
//! │       │                                                                 │
//! │       │  db.rules().by_country("mx")                                    │
//! │       ▼                                                                 │
//! │  TaxRuleRepository                    CountryRepository                 │
//! │  ├── by_country(&self, country)       ├── get(&self, code)              │
//! │  ├── get_by_id(&self, id)             ├── list(&self)                   │
//! │  ├── insert(&self, rule)              └── upsert(&self, country)        │
//! │  └── delete / count                                                     │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database (tax_rules, countries)                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`TaxRuleRepository`](rule::TaxRuleRepository) - Rule storage and lookup by country
//! - [`CountryRepository`](country::CountryRepository) - Country metadata

pub mod country;
pub mod rule;
