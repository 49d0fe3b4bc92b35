//! # Levy Configuration
//!
//! Settings shared by the `seed` and `levy` binaries.
//!
//! ## Config File Location
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. --config <path>                       (explicit)                   │
//! │  2. ~/.config/levy/levy.toml               (Linux)                      │
//! │     ~/Library/Application Support/com.levy.levy/levy.toml (macOS)      │
//! │  3. Built-in defaults                                                  │
//! │                                                                         │
//! │  LEVY_* environment variables override whatever was loaded.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```toml
//! [database]
//! path = "./levy.db"
//! max_connections = 5
//!
//! [engine]
//! columns = ["region", "txType", "docType", "category", "area", "bpType"]
//! factor_scale = 6
//! amount_scale = 2
//! ```

use levy_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::pool::DbConfig;

/// Where the rule store lives and how the pool is sized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path (`:memory:` for a throwaway store).
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("levy.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevyConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl LevyConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (levy.toml); a missing default file is not an error,
    ///    a missing explicit one is
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit = config_path.is_some();
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if explicit || path.exists() {
                info!(?path, "Loading config from file");
                let contents =
                    std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                        path: path.display().to_string(),
                        source,
                    })?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "database.min_connections exceeds max_connections".into(),
            ));
        }

        self.engine
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Applies `LEVY_*` overrides read through `var`.
    fn apply_env_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = var("LEVY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(value) = var("LEVY_FACTOR_SCALE") {
            self.engine.factor_scale = parse_env("LEVY_FACTOR_SCALE", &value)?;
        }

        if let Some(value) = var("LEVY_AMOUNT_SCALE") {
            self.engine.amount_scale = parse_env("LEVY_AMOUNT_SCALE", &value)?;
        }

        if let Some(value) = var("LEVY_MAX_FORMULA_DEPTH") {
            self.engine.max_formula_depth = parse_env("LEVY_MAX_FORMULA_DEPTH", &value)?;
        }

        Ok(())
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "levy", "levy")
            .map(|dirs| dirs.config_dir().join("levy.toml"))
    }

    /// Pool settings for [`Database::new`](crate::Database::new).
    pub fn db_config(&self) -> DbConfig {
        let config = if self.database.path == PathBuf::from(":memory:") {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database.path)
                .max_connections(self.database.max_connections)
                .min_connections(self.database.min_connections)
        };
        config.connect_timeout(std::time::Duration::from_secs(
            self.database.connect_timeout_secs,
        ))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use levy_core::Column;
    use std::collections::HashMap;

    #[test]
    fn test_toml_serialization() {
        let toml_str = r#"
            [database]
            path = "/var/lib/levy/rules.db"

            [engine]
            columns = ["txType", "region"]
            amount_scale = 4
        "#;
        let config: LevyConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.database.path, PathBuf::from("/var/lib/levy/rules.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.engine.columns, vec![Column::TxType, Column::Region]);
        assert_eq!(config.engine.amount_scale, 4);
        assert_eq!(config.engine.factor_scale, 6);

        let round_trip: LevyConfig =
            toml::from_str(&toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(round_trip, config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LEVY_DB_PATH", "/tmp/override.db"),
            ("LEVY_FACTOR_SCALE", "8"),
            ("LEVY_MAX_FORMULA_DEPTH", " 16 "),
        ]
        .into_iter()
        .collect();

        let mut config = LevyConfig::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.engine.factor_scale, 8);
        assert_eq!(config.engine.amount_scale, 2);
        assert_eq!(config.engine.max_formula_depth, 16);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = LevyConfig::default();
        let result = config.apply_env_overrides(|key| {
            (key == "LEVY_AMOUNT_SCALE").then(|| "two".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue(key)) if key == "LEVY_AMOUNT_SCALE"));
    }

    #[test]
    fn test_validate() {
        assert!(LevyConfig::default().validate().is_ok());

        let mut config = LevyConfig::default();
        config.database.min_connections = 10;
        assert!(config.validate().is_err());

        let mut config = LevyConfig::default();
        config.engine.amount_scale = 40;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = LevyConfig::load(Some(PathBuf::from("/nonexistent/levy.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_db_config() {
        let mut config = LevyConfig::default();
        config.database.path = PathBuf::from(":memory:");
        assert_eq!(config.db_config().max_connections, 1);

        config.database.path = PathBuf::from("rules.db");
        config.database.max_connections = 3;
        assert_eq!(config.db_config().max_connections, 3);
    }
}
