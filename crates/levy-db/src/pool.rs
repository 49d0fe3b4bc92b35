//! # Database Pool Management
//!
//! Connection pool creation and the `Database` handle.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  DbConfig::new(path) ← Configure pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ├── db.import_catalog(&catalog, replace)   (seed binary)         │
//! │       ├── db.get_taxes(&engine, &query)          (levy binary)         │
//! │       └── db.rules() / db.countries()            (repositories)        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File databases run in WAL mode so `levy` readers never block a `seed`
//! import in progress. In-memory databases skip it.

use chrono::Utc;
use levy_core::validation::{validate_catalog, validate_query};
use levy_core::{RuleCatalog, TaxEngine, TaxQuery, TaxReport};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::country::{upsert_country, CountryRepository};
use crate::repository::rule::{insert_rule, next_position, TaxRuleRepository};

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/levy.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(IN_MEMORY)
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        if self.is_in_memory() {
            return SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()));
        }

        let connect_url = format!("sqlite://{}?mode=rwc", self.database_path.display());

        Ok(SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true))
    }
}

// =============================================================================
// Import Summary
// =============================================================================

/// What [`Database::import_catalog`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub countries: usize,
    pub rules: usize,
    /// Rules deleted before the import (`replace = true`).
    pub removed: u64,
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Enables WAL, NORMAL synchronous and foreign keys (file databases)
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_options = config.connect_options()?;
        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the tax rule repository.
    pub fn rules(&self) -> TaxRuleRepository {
        TaxRuleRepository::new(self.pool.clone())
    }

    /// Returns the country repository.
    pub fn countries(&self) -> CountryRepository {
        CountryRepository::new(self.pool.clone())
    }

    /// Resolves a query against the stored rules.
    ///
    /// ## Flow
    /// ```text
    /// validate query → rules().by_country(country) → engine.resolve(rules, query, at)
    /// ```
    /// `query.at` defaults to now.
    pub async fn get_taxes(&self, engine: &TaxEngine, query: &TaxQuery) -> DbResult<TaxReport> {
        validate_query(query)?;

        let rules = self.rules().by_country(&query.country_code()).await?;
        let report = engine.resolve(&rules, query, query.at.unwrap_or_else(Utc::now))?;

        debug!(query = %query, taxes = report.taxes.len(), "Resolved taxes");
        Ok(report)
    }

    /// Imports a rule catalog in one transaction.
    ///
    /// The catalog is validated first; nothing is written if any record is
    /// invalid. With `replace`, existing rules and countries are deleted
    /// before the import. Without it, rules are appended after the stored
    /// ones and countries are upserted.
    pub async fn import_catalog(
        &self,
        catalog: &RuleCatalog,
        replace: bool,
    ) -> DbResult<ImportSummary> {
        validate_catalog(catalog)?;

        let mut tx = self.pool.begin().await?;

        let mut removed = 0;
        if replace {
            removed = sqlx::query("DELETE FROM tax_rules")
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query("DELETE FROM countries").execute(&mut *tx).await?;
        }

        for country in &catalog.countries {
            upsert_country(&mut *tx, country).await?;
        }

        let first = next_position(&mut *tx).await?;
        for (position, rule) in (first..).zip(&catalog.tax_rules) {
            insert_rule(&mut *tx, rule, position).await?;
        }

        tx.commit().await?;

        let summary = ImportSummary {
            countries: catalog.countries.len(),
            rules: catalog.tax_rules.len(),
            removed,
        };
        info!(
            countries = summary.countries,
            rules = summary.rules,
            removed = summary.removed,
            "Imported rule catalog"
        );
        Ok(summary)
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
