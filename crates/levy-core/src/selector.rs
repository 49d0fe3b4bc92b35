//! # Rule Selector
//!
//! Narrows a country's rules to exactly one rule per requested tax.
//!
//! ## Exact Specificity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  query: txType=sales docType=invoice category=DRUG area=PHARMACY        │
//! │                                                                         │
//! │  rule A  IVA  txType=sales docType=invoice                 ✗ (category │
//! │                                                              supplied, │
//! │                                                              A silent) │
//! │  rule B  IVA  txType=sales docType=invoice                              │
//! │               category=DRUG area=PHARMACY                  ✓            │
//! │                                                                         │
//! │  A column a rule does not declare must also be absent from the query.  │
//! │  There is no wildcard and no "most specific wins" tie-break: every     │
//! │  surviving rule matches the query's attribute set exactly.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::types::{eq_ignore_case, Column, TaxQuery, TaxRule};

/// Whether `rule` survives the attribute filter for one column.
fn column_matches(rule: &TaxRule, query: &TaxQuery, column: Column) -> bool {
    match rule.matcher(column) {
        Some(matcher) => matcher.accepts(query.attribute(column)),
        None => query.attribute(column).is_none(),
    }
}

/// Selects one rule per requested tax name.
///
/// ## Steps
/// 1. Keep rules of the query's country (`CountryNotFound` if none)
/// 2. Filter column by column in `columns` order (`NoRuleForParams` if none left)
/// 3. Group by requested tax name (`NoRuleForTaxes`, `AmbiguousRule`)
/// 4. Check validity windows against `now` (`RuleExpired`, `RuleNotYetValid`)
///
/// The result follows the order of `query.taxes`.
pub fn select<'a>(
    rules: &'a [TaxRule],
    query: &TaxQuery,
    columns: &[Column],
    now: DateTime<Utc>,
) -> CoreResult<Vec<&'a TaxRule>> {
    let country = query.country_code();

    let mut candidates: Vec<&TaxRule> = rules
        .iter()
        .filter(|rule| eq_ignore_case(&rule.country, &country))
        .collect();

    if candidates.is_empty() {
        return Err(CoreError::CountryNotFound { country });
    }

    for column in columns {
        candidates.retain(|rule| column_matches(rule, query, *column));
        debug!(column = %column, remaining = candidates.len(), "Filtered candidates");
    }

    if candidates.is_empty() {
        return Err(CoreError::NoRuleForParams {
            query: query.to_string(),
        });
    }

    let mut selected = Vec::with_capacity(query.taxes.len());
    let mut missing = Vec::new();

    for tax in &query.taxes {
        let matching: Vec<&TaxRule> = candidates
            .iter()
            .copied()
            .filter(|rule| eq_ignore_case(&rule.tax_name, tax))
            .collect();

        match matching.as_slice() {
            [] => missing.push(tax.clone()),
            [rule] => selected.push(*rule),
            _ => {
                return Err(CoreError::AmbiguousRule {
                    tax: tax.clone(),
                    count: matching.len(),
                    query: query.to_string(),
                })
            }
        }
    }

    if !missing.is_empty() {
        return Err(CoreError::NoRuleForTaxes {
            missing,
            query: query.to_string(),
        });
    }

    for rule in &selected {
        check_validity(rule, now)?;
    }

    Ok(selected)
}

/// Validity is `[validFrom, validUntil)`; absent bounds are open.
fn check_validity(rule: &TaxRule, now: DateTime<Utc>) -> CoreResult<()> {
    if let Some(valid_until) = rule.valid_until {
        if valid_until <= now {
            return Err(CoreError::RuleExpired {
                tax: rule.tax_name.clone(),
                valid_until,
            });
        }
    }

    if let Some(valid_from) = rule.valid_from {
        if valid_from > now {
            return Err(CoreError::RuleNotYetValid {
                tax: rule.tax_name.clone(),
                valid_from,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn mx_rules() -> Vec<TaxRule> {
        vec![
            TaxRule::new("mx", "IVA")
                .with(Column::TxType, "sales")
                .with(Column::DocType, "invoice")
                .rate("0.16"),
            TaxRule::new("mx", "IVA")
                .with(Column::TxType, "sales")
                .with(Column::DocType, "invoice")
                .with(Column::Category, "DRUG")
                .with(Column::Area, "PHARMACY")
                .rate("0"),
            TaxRule::new("mx", "IVA")
                .with(Column::Region, "AGS")
                .with(Column::TxType, "sales")
                .with(Column::DocType, "invoice")
                .rate("0.16"),
            TaxRule::new("mx", "ISR")
                .with(Column::Region, "AGS")
                .with(Column::TxType, "sales")
                .with(Column::DocType, "invoice")
                .rate("0.10"),
        ]
    }

    fn run<'a>(rules: &'a [TaxRule], query: &TaxQuery) -> CoreResult<Vec<&'a TaxRule>> {
        select(rules, query, &Column::ALL, now())
    }

    fn sales_invoice() -> TaxQuery {
        TaxQuery::new("MX")
            .with(Column::TxType, "sales")
            .with(Column::DocType, "invoice")
    }

    #[test]
    fn test_general_rule_when_no_extra_attributes() {
        let rules = mx_rules();
        let selected = run(&rules, &sales_invoice().tax("IVA")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].specificity(), 2);
    }

    #[test]
    fn test_extra_attributes_exclude_general_rule() {
        let rules = mx_rules();
        let query = sales_invoice()
            .with(Column::Category, "drug")
            .with(Column::Area, "pharmacy")
            .tax("iva");
        let selected = run(&rules, &query).unwrap();
        assert_eq!(selected[0].specificity(), 4);
    }

    #[test]
    fn test_region_rule_requires_region() {
        let rules = mx_rules();
        let query = sales_invoice().with(Column::Region, "AGS").tax("IVA").tax("ISR");
        let selected = run(&rules, &query).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].tax_name, "IVA");
        assert_eq!(selected[1].tax_name, "ISR");
        assert!(selected.iter().all(|rule| rule.region.is_some()));
    }

    #[test]
    fn test_country_not_found() {
        let rules = mx_rules();
        let err = run(&rules, &TaxQuery::new("zz").tax("IVA")).unwrap_err();
        assert!(matches!(err, CoreError::CountryNotFound { country } if country == "zz"));
    }

    #[test]
    fn test_no_rule_for_params() {
        let rules = mx_rules();
        let query = sales_invoice().with(Column::BpType, "signed").tax("IVA");
        assert!(matches!(run(&rules, &query), Err(CoreError::NoRuleForParams { .. })));
    }

    #[test]
    fn test_missing_taxes_are_all_reported() {
        let rules = mx_rules();
        let query = sales_invoice().tax("IVA").tax("IEPS").tax("ISR");
        match run(&rules, &query) {
            Err(CoreError::NoRuleForTaxes { missing, .. }) => {
                assert_eq!(missing, vec!["IEPS".to_string(), "ISR".to_string()]);
            }
            other => panic!("expected NoRuleForTaxes, got {:?}", other),
        }
    }

    #[test]
    fn test_ambiguous_rules() {
        let mut rules = mx_rules();
        rules.push(rules[0].clone().rate("0.08"));
        match run(&rules, &sales_invoice().tax("IVA")) {
            Err(CoreError::AmbiguousRule { tax, count, .. }) => {
                assert_eq!(tax, "IVA");
                assert_eq!(count, 2);
            }
            other => panic!("expected AmbiguousRule, got {:?}", other),
        }
    }

    #[test]
    fn test_negated_matcher() {
        let rules = vec![
            TaxRule::new("sa", "VAT").with(Column::Category, "DRUG").rate("0.05"),
            TaxRule::new("sa", "VAT").with(Column::Category, "!DRUG").rate("0.04"),
        ];

        let drug = TaxQuery::new("sa").with(Column::Category, "DRUG").tax("VAT");
        assert_eq!(run(&rules, &drug).unwrap()[0].rate, Some("0.05".into()));

        let other = TaxQuery::new("sa").with(Column::Category, "FOOD").tax("VAT");
        assert_eq!(run(&rules, &other).unwrap()[0].rate, Some("0.04".into()));

        // A negated matcher still needs a supplied value.
        let absent = TaxQuery::new("sa").tax("VAT");
        assert!(matches!(run(&rules, &absent), Err(CoreError::NoRuleForParams { .. })));
    }

    #[test]
    fn test_validity_window() {
        let mut expired = TaxRule::new("mx", "IVA").rate("0.16");
        expired.valid_until = Some(now());
        let query = TaxQuery::new("mx").tax("IVA");
        assert!(matches!(
            run(std::slice::from_ref(&expired), &query),
            Err(CoreError::RuleExpired { .. })
        ));

        let mut future = TaxRule::new("mx", "IVA").rate("0.16");
        future.valid_from = Some(now() + Duration::days(1));
        assert!(matches!(
            run(std::slice::from_ref(&future), &query),
            Err(CoreError::RuleNotYetValid { .. })
        ));

        let mut current = TaxRule::new("mx", "IVA").rate("0.16");
        current.valid_from = Some(now());
        current.valid_until = Some(now() + Duration::seconds(1));
        assert!(run(std::slice::from_ref(&current), &query).is_ok());
    }

    #[test]
    fn test_column_order_is_configurable() {
        let rules = mx_rules();
        // Filtering only on txType ignores the docType the rules declare.
        let query = TaxQuery::new("mx").with(Column::TxType, "sales").tax("IVA");
        let selected = select(&rules, &query, &[Column::TxType], now());
        assert!(matches!(selected, Err(CoreError::AmbiguousRule { count: 3, .. })));
    }
}
