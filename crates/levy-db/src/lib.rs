//! # levy-db: Rule Store for Levy
//!
//! Persists tax rules and countries in SQLite (via sqlx) and resolves
//! queries against them with a [`levy_core::TaxEngine`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Levy Data Flow                                 │
//! │                                                                         │
//! │  seed binary (catalog JSON)          levy binary (query JSON / flags)  │
//! │       │                                    │                            │
//! │       ▼                                    ▼                            │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     levy-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (rule.rs)    │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ TaxRuleRepo   │    │ 001_tax_     │  │   │
//! │  │   │ import/query  │    │ CountryRepo   │    │ rules.sql    │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  levy-core: select rules → evaluate formulas → totals                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, catalog import, `get_taxes`
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and configuration error types
//! - [`repository`] - Rule and country repositories
//! - [`config`] - `levy.toml` + environment configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use levy_core::{TaxEngine, TaxQuery};
//! use levy_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("levy.db")).await?;
//! let engine = TaxEngine::default();
//!
//! let query = TaxQuery::new("mx").tax("IVA").var("subTotal", 100);
//! let report = db.get_taxes(&engine, &query).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DatabaseSettings, LevyConfig};
pub use error::{ConfigError, DbError, DbResult};
pub use pool::{Database, DbConfig, ImportSummary};

// Repository re-exports for convenience
pub use repository::country::CountryRepository;
pub use repository::rule::TaxRuleRepository;

/// Default `RUST_LOG` filter for the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info,levy=debug,sqlx=warn";

/// Initializes `tracing` for a binary: `RUST_LOG` if set, otherwise
/// [`DEFAULT_LOG_FILTER`]. Logs go to stderr so stdout stays machine-readable.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
