//! # Validation Module
//!
//! Input validation for queries and rule records.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                      │
//! │  ├── Field types, matcher text, formula literals                       │
//! │  └── Unknown fields ignored                                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── validate_query  → before selection runs                           │
//! │  └── validate_rule   → when a catalog is loaded into a store           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  └── CHECK constraints on rate/amount presence                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use levy_core::validation::{validate_country_code, validate_query};
//! use levy_core::TaxQuery;
//!
//! assert_eq!(validate_country_code(" MX ").unwrap(), "mx");
//! assert!(validate_query(&TaxQuery::new("mx").tax("IVA")).is_ok());
//! assert!(validate_query(&TaxQuery::new("mx")).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{eq_ignore_case, RuleCatalog, TaxQuery, TaxRule};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted tax name.
const MAX_TAX_NAME_LENGTH: usize = 64;

/// Longest accepted variable name.
const MAX_VARIABLE_NAME_LENGTH: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a country code and returns it lowercased.
///
/// ## Rules
/// - Must not be empty
/// - 2 or 3 ASCII letters (`mx`, `ar`, `sa`, `usa`)
pub fn validate_country_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "country".to_string(),
        });
    }

    if !(2..=3).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: "country".to_string(),
            reason: format!("'{}' is not a 2-3 letter country code", code),
        });
    }

    Ok(code.to_lowercase())
}

/// Validates a tax name.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Letters, digits and underscores only (`IVA`, `RET_IVA`)
pub fn validate_tax_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "taxName".to_string(),
        });
    }

    if name.len() > MAX_TAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "taxName".to_string(),
            max: MAX_TAX_NAME_LENGTH,
        });
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidFormat {
            field: "taxName".to_string(),
            reason: "must contain only letters, numbers and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a formula variable name.
///
/// Names must be identifiers the formula grammar can reference:
/// a letter or `_` followed by letters, digits or `_`.
pub fn validate_variable_name(name: &str) -> ValidationResult<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(ValidationError::Required {
            field: "variable".to_string(),
        });
    };

    if name.len() > MAX_VARIABLE_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "variable".to_string(),
            max: MAX_VARIABLE_NAME_LENGTH,
        });
    }

    if !(first.is_ascii_alphabetic() || first == '_')
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "variable".to_string(),
            reason: format!("'{}' is not a valid identifier", name),
        });
    }

    Ok(())
}

// =============================================================================
// Query Validation
// =============================================================================

/// Validates a query before rule selection.
///
/// ## Rules
/// - Country code is well formed
/// - At least one tax is requested
/// - Tax names are well formed and not repeated (case-insensitive)
/// - Variable names are identifiers
pub fn validate_query(query: &TaxQuery) -> ValidationResult<()> {
    validate_country_code(&query.country)?;

    if query.taxes.is_empty() {
        return Err(ValidationError::Required {
            field: "taxes".to_string(),
        });
    }

    for (index, tax) in query.taxes.iter().enumerate() {
        validate_tax_name(tax)?;
        if query.taxes[..index].iter().any(|earlier| eq_ignore_case(earlier, tax)) {
            return Err(ValidationError::Duplicate {
                field: "taxes".to_string(),
                value: tax.clone(),
            });
        }
    }

    for (name, _) in query.vars.iter() {
        validate_variable_name(name)?;
    }

    Ok(())
}

// =============================================================================
// Rule Validation
// =============================================================================

/// Validates one rule record.
///
/// ## Rules
/// - Country code and tax name are well formed
/// - At least one of `rate` / `amount` is present
/// - `validFrom` is strictly before `validUntil` when both are set
/// - A rule does not depend on its own tax
/// - Variable names are identifiers
pub fn validate_rule(rule: &TaxRule) -> ValidationResult<()> {
    let code = validate_country_code(&rule.country)?;
    if code != rule.country {
        return Err(ValidationError::InvalidFormat {
            field: "country".to_string(),
            reason: format!("'{}' must be lowercase", rule.country),
        });
    }

    validate_tax_name(&rule.tax_name)?;

    if rule.rate.is_none() && rule.amount.is_none() {
        return Err(ValidationError::Required {
            field: format!("rate or amount of {}", rule.tax_name),
        });
    }

    if let (Some(from), Some(until)) = (rule.valid_from, rule.valid_until) {
        if from >= until {
            return Err(ValidationError::InvalidFormat {
                field: "validFrom".to_string(),
                reason: format!("{} is not before validUntil {}", from, until),
            });
        }
    }

    if let Some(dep) = &rule.dep {
        validate_tax_name(dep)?;
        if eq_ignore_case(dep, &rule.tax_name) {
            return Err(ValidationError::InvalidFormat {
                field: "dep".to_string(),
                reason: format!("{} cannot depend on itself", rule.tax_name),
            });
        }
    }

    for (name, _) in rule.vars.iter() {
        validate_variable_name(name)?;
    }

    Ok(())
}

/// Validates every record of a catalog.
///
/// Country codes must be unique; every rule must pass [`validate_rule`].
pub fn validate_catalog(catalog: &RuleCatalog) -> ValidationResult<()> {
    for (index, country) in catalog.countries.iter().enumerate() {
        let code = validate_country_code(&country.code)?;
        if catalog.countries[..index]
            .iter()
            .any(|earlier| eq_ignore_case(&earlier.code, &code))
        {
            return Err(ValidationError::Duplicate {
                field: "country".to_string(),
                value: code,
            });
        }
    }

    catalog.tax_rules.iter().try_for_each(validate_rule)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Country;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_validate_country_code() {
        assert_eq!(validate_country_code("mx").unwrap(), "mx");
        assert_eq!(validate_country_code("SA").unwrap(), "sa");
        assert!(validate_country_code("").is_err());
        assert!(validate_country_code("m").is_err());
        assert!(validate_country_code("mexico").is_err());
        assert!(validate_country_code("m1").is_err());
    }

    #[test]
    fn test_validate_tax_name() {
        assert!(validate_tax_name("IVA").is_ok());
        assert!(validate_tax_name("RET_IVA").is_ok());
        assert!(validate_tax_name("").is_err());
        assert!(validate_tax_name("RET IVA").is_err());
        assert!(validate_tax_name(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_variable_name() {
        assert!(validate_variable_name("subTotal").is_ok());
        assert!(validate_variable_name("_x1").is_ok());
        assert!(validate_variable_name("").is_err());
        assert!(validate_variable_name("1x").is_err());
        assert!(validate_variable_name("a-b").is_err());
    }

    #[test]
    fn test_validate_query() {
        assert!(validate_query(&TaxQuery::new("mx").tax("IVA").tax("ISR")).is_ok());

        assert!(matches!(
            validate_query(&TaxQuery::new("mx")),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_query(&TaxQuery::new("mx").tax("IVA").tax("iva")),
            Err(ValidationError::Duplicate { .. })
        ));
        assert!(validate_query(&TaxQuery::new("").tax("IVA")).is_err());
    }

    #[test]
    fn test_validate_rule() {
        assert!(validate_rule(&TaxRule::new("mx", "IVA").rate("0.16")).is_ok());

        // Neither rate nor amount
        assert!(validate_rule(&TaxRule::new("mx", "IVA")).is_err());

        // Self dependency
        let rule = TaxRule::new("mx", "IVA").rate("0.16").withholding_of("iva");
        assert!(validate_rule(&rule).is_err());

        // Inverted window
        let mut rule = TaxRule::new("mx", "IVA").rate("0.16");
        rule.valid_from = Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        rule.valid_until = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert!(validate_rule(&rule).is_err());

        // Uppercase country on a stored record
        let mut rule = TaxRule::new("mx", "IVA").rate("0.16");
        rule.country = "MX".to_string();
        assert!(validate_rule(&rule).is_err());
    }

    #[test]
    fn test_validate_catalog_rejects_duplicate_countries() {
        let catalog = RuleCatalog {
            countries: vec![
                Country { code: "mx".into(), name: "Mexico".into() },
                Country { code: "MX".into(), name: "México".into() },
            ],
            tax_rules: vec![],
        };
        assert!(matches!(
            validate_catalog(&catalog),
            Err(ValidationError::Duplicate { .. })
        ));
    }
}
