//! # Engine Configuration
//!
//! Tunables for the tax engine. Pure data; loading from files and the
//! environment lives in levy-db (`LevyConfig`), which embeds this struct
//! as its `[engine]` table.
//!
//! ## Configuration File Format
//! ```toml
//! [engine]
//! columns = ["region", "txType", "docType", "category", "area", "bpType"]
//! max_formula_depth = 64
//! factor_scale = 6
//! amount_scale = 2
//! max_cached_formulas = 4096
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::Column;
use crate::{DEFAULT_AMOUNT_SCALE, DEFAULT_FACTOR_SCALE, DEFAULT_MAX_FORMULA_DEPTH};

/// Largest scale a `rust_decimal::Decimal` can carry.
const MAX_DECIMAL_SCALE: u32 = 28;

/// Upper bound accepted for `max_formula_depth`.
const MAX_FORMULA_DEPTH_LIMIT: usize = 1024;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Columns the selector filters on, in order.
    #[serde(default = "default_columns")]
    pub columns: Vec<Column>,

    /// Maximum formula nesting depth.
    #[serde(default = "default_max_formula_depth")]
    pub max_formula_depth: usize,

    /// Decimal places kept on factors.
    #[serde(default = "default_factor_scale")]
    pub factor_scale: u32,

    /// Decimal places kept on amounts.
    #[serde(default = "default_amount_scale")]
    pub amount_scale: u32,

    /// Compiled formulas kept in the engine cache.
    /// The cache is flushed when it would grow past this size; 0 disables it.
    #[serde(default = "default_max_cached_formulas")]
    pub max_cached_formulas: usize,
}

fn default_columns() -> Vec<Column> {
    Column::ALL.to_vec()
}

fn default_max_formula_depth() -> usize {
    DEFAULT_MAX_FORMULA_DEPTH
}

fn default_factor_scale() -> u32 {
    DEFAULT_FACTOR_SCALE
}

fn default_amount_scale() -> u32 {
    DEFAULT_AMOUNT_SCALE
}

fn default_max_cached_formulas() -> usize {
    4096
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            columns: default_columns(),
            max_formula_depth: default_max_formula_depth(),
            factor_scale: default_factor_scale(),
            amount_scale: default_amount_scale(),
            max_cached_formulas: default_max_cached_formulas(),
        }
    }
}

impl EngineConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> CoreResult<()> {
        if self.columns.is_empty() {
            return Err(CoreError::InvalidConfig(
                "columns must list at least one column".into(),
            ));
        }

        for (index, column) in self.columns.iter().enumerate() {
            if self.columns[..index].contains(column) {
                return Err(CoreError::InvalidConfig(format!(
                    "column '{}' is listed twice",
                    column
                )));
            }
        }

        if self.max_formula_depth == 0 || self.max_formula_depth > MAX_FORMULA_DEPTH_LIMIT {
            return Err(CoreError::InvalidConfig(format!(
                "max_formula_depth must be between 1 and {}",
                MAX_FORMULA_DEPTH_LIMIT
            )));
        }

        if self.factor_scale > MAX_DECIMAL_SCALE || self.amount_scale > MAX_DECIMAL_SCALE {
            return Err(CoreError::InvalidConfig(format!(
                "factor_scale and amount_scale must be at most {}",
                MAX_DECIMAL_SCALE
            )));
        }

        Ok(())
    }
}
