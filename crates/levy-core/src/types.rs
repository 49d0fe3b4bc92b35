//! # Domain Types
//!
//! Core domain types used throughout Levy.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRule      │   │    TaxQuery     │   │   TaxReport     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  country        │   │  country        │   │  subTotal?      │       │
//! │  │  matchers ×6    │   │  attributes ×6  │   │  taxTotal?      │       │
//! │  │  taxName, dep   │   │  taxes [..]     │   │  grandTotal?    │       │
//! │  │  rate / amount  │   │  vars {..}      │   │  taxes {..}     │       │
//! │  │  vars, meta     │   │  at?            │   │   └ TaxResult   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Column       │   │    Matcher      │   │ FormulaSource   │       │
//! │  │  Region, TxType │   │  Equals(v)      │   │  Literal(dec)   │       │
//! │  │  DocType, ...   │   │  NotEquals(v)   │   │  Expression(s)  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Declared vs. Absent
//! A rule column is `Option<Matcher>`. `None` is NOT a wildcard: it demands
//! that the query leaves that column unset too. `Some(NotEquals("DRUG"))` is a
//! declared matcher that accepts any supplied value except `DRUG`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{FormulaError, ValidationError};
use crate::money::parse_literal;

// =============================================================================
// Column
// =============================================================================

/// An attribute axis a rule may discriminate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Column {
    Region,
    TxType,
    DocType,
    Category,
    Area,
    BpType,
}

impl Column {
    /// Every column in the default filtering order.
    pub const ALL: [Column; 6] = [
        Column::Region,
        Column::TxType,
        Column::DocType,
        Column::Category,
        Column::Area,
        Column::BpType,
    ];

    /// The catalog/query key for this column.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Column::Region => "region",
            Column::TxType => "txType",
            Column::DocType => "docType",
            Column::Category => "category",
            Column::Area => "area",
            Column::BpType => "bpType",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::ALL
            .into_iter()
            .find(|column| column.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "column".to_string(),
                reason: format!("unknown column '{}'", s),
            })
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// A declared column value on a rule.
///
/// Catalog text `"DRUG"` is `Equals`, `"!DRUG"` is `NotEquals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Matcher {
    Equals(String),
    NotEquals(String),
}

impl Matcher {
    /// Parses matcher text from a catalog.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let text = text.trim();
        let (negated, value) = match text.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, text),
        };

        if value.is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: "matcher".to_string(),
                reason: format!("'{}' has no value to match", text),
            });
        }

        Ok(if negated {
            Matcher::NotEquals(value.to_string())
        } else {
            Matcher::Equals(value.to_string())
        })
    }

    /// Whether this matcher accepts the query's value for its column.
    ///
    /// Comparison is case-insensitive. A declared matcher never accepts an
    /// unset query value, negated or not.
    pub fn accepts(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Matcher::Equals(expected) => eq_ignore_case(expected, value),
            Matcher::NotEquals(excluded) => !eq_ignore_case(excluded, value),
        }
    }
}

impl TryFrom<String> for Matcher {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Matcher::parse(&value)
    }
}

impl From<Matcher> for String {
    fn from(matcher: Matcher) -> Self {
        matcher.to_string()
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Equals(value) => write!(f, "{}", value),
            Matcher::NotEquals(value) => write!(f, "!{}", value),
        }
    }
}

/// Case-insensitive comparison used for countries, matchers and tax names.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

// =============================================================================
// Formula Source
// =============================================================================

/// A rate, amount or variable definition as written in the catalog.
///
/// JSON numbers and plain numeric strings are literals and never reach the
/// formula grammar; everything else is an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub enum FormulaSource {
    Literal(Decimal),
    Expression(String),
}

impl FormulaSource {
    /// Classifies formula text as a literal or an expression.
    pub fn from_text(text: &str) -> Result<Self, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Required {
                field: "formula".to_string(),
            });
        }
        Ok(match parse_literal(trimmed) {
            Some(value) => FormulaSource::Literal(value),
            None => FormulaSource::Expression(trimmed.to_string()),
        })
    }

    /// The formula as text (literals rendered in decimal notation).
    pub fn as_text(&self) -> String {
        match self {
            FormulaSource::Literal(value) => value.to_string(),
            FormulaSource::Expression(text) => text.clone(),
        }
    }
}

impl From<Decimal> for FormulaSource {
    fn from(value: Decimal) -> Self {
        FormulaSource::Literal(value)
    }
}

impl From<i32> for FormulaSource {
    fn from(value: i32) -> Self {
        FormulaSource::Literal(Decimal::from(value))
    }
}

impl From<i64> for FormulaSource {
    fn from(value: i64) -> Self {
        FormulaSource::Literal(Decimal::from(value))
    }
}

impl From<&str> for FormulaSource {
    /// Classifies text; empty text becomes an (unevaluable) empty expression.
    fn from(text: &str) -> Self {
        FormulaSource::from_text(text)
            .unwrap_or_else(|_| FormulaSource::Expression(String::new()))
    }
}

impl From<FormulaSource> for String {
    fn from(source: FormulaSource) -> Self {
        source.as_text()
    }
}

/// Wire form of a formula: a JSON number or a string.
///
/// Numbers arrive as their source text (`serde_json` is built with
/// `arbitrary_precision`), so every written digit reaches the `Decimal`.
impl TryFrom<serde_json::Value> for FormulaSource {
    type Error = ValidationError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Number(number) => {
                let text = number.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .map(FormulaSource::Literal)
                    .map_err(|_| ValidationError::InvalidFormat {
                        field: "formula".to_string(),
                        reason: format!("{} is not a representable decimal", text),
                    })
            }
            serde_json::Value::String(text) => FormulaSource::from_text(&text),
            other => Err(ValidationError::InvalidFormat {
                field: "formula".to_string(),
                reason: format!("expected a number or a string, got {}", other),
            }),
        }
    }
}

// =============================================================================
// Variable Bindings
// =============================================================================

/// Named formulas in declaration order.
///
/// Serialized as a JSON object; deserialization keeps the object's key order
/// because later variables may reference earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarBindings(Vec<(String, FormulaSource)>);

impl VarBindings {
    pub fn new() -> Self {
        VarBindings(Vec::new())
    }

    /// Appends a binding. A repeated name replaces the earlier definition in
    /// place so declaration order stays stable.
    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<FormulaSource>) {
        let name = name.into();
        let source = source.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = source,
            None => self.0.push((name, source)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FormulaSource> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, source)| source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormulaSource)> {
        self.0.iter().map(|(name, source)| (name.as_str(), source))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for VarBindings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, source) in &self.0 {
            map.serialize_entry(name, source)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for VarBindings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = VarBindings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of variable names to formulas")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut bindings = VarBindings::new();
                while let Some((name, source)) = access.next_entry::<String, FormulaSource>()? {
                    bindings.insert(name, source);
                }
                Ok(bindings)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(VarBindings::new())
            }
        }

        deserializer.deserialize_any(OrderedVisitor)
    }
}

// =============================================================================
// Tax Rule
// =============================================================================

/// One tax rule record. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRule {
    /// Lowercase country code.
    pub country: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Matcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<Matcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<Matcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Matcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<Matcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bp_type: Option<Matcher>,

    pub tax_name: String,

    /// Withholding: the evaluated rate is negated.
    #[serde(default)]
    pub whitholded: bool,

    /// Tax this rule withholds from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dep: Option<String>,

    /// Inclusive start of validity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,

    /// Exclusive end of validity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<FormulaSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<FormulaSource>,

    #[serde(default, skip_serializing_if = "VarBindings::is_empty")]
    pub vars: VarBindings,

    /// Opaque data copied to the result unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl TaxRule {
    /// Creates a rule with no matchers, no window and no formulas.
    pub fn new(country: impl Into<String>, tax_name: impl Into<String>) -> Self {
        TaxRule {
            country: country.into().to_lowercase(),
            region: None,
            tx_type: None,
            doc_type: None,
            category: None,
            area: None,
            bp_type: None,
            tax_name: tax_name.into(),
            whitholded: false,
            dep: None,
            valid_from: None,
            valid_until: None,
            rate: None,
            amount: None,
            vars: VarBindings::new(),
            meta: None,
        }
    }

    /// Returns the declared matcher for a column, if any.
    pub fn matcher(&self, column: Column) -> Option<&Matcher> {
        match column {
            Column::Region => self.region.as_ref(),
            Column::TxType => self.tx_type.as_ref(),
            Column::DocType => self.doc_type.as_ref(),
            Column::Category => self.category.as_ref(),
            Column::Area => self.area.as_ref(),
            Column::BpType => self.bp_type.as_ref(),
        }
    }

    fn matcher_slot(&mut self, column: Column) -> &mut Option<Matcher> {
        match column {
            Column::Region => &mut self.region,
            Column::TxType => &mut self.tx_type,
            Column::DocType => &mut self.doc_type,
            Column::Category => &mut self.category,
            Column::Area => &mut self.area,
            Column::BpType => &mut self.bp_type,
        }
    }

    /// Builder: declares a column matcher (`"!X"` for a negated matcher).
    ///
    /// Invalid matcher text leaves the column undeclared; catalogs go
    /// through [`Matcher::parse`] and report the error instead.
    pub fn with(mut self, column: Column, matcher: &str) -> Self {
        *self.matcher_slot(column) = Matcher::parse(matcher).ok();
        self
    }

    /// Builder: sets the rate formula.
    pub fn rate(mut self, source: impl Into<FormulaSource>) -> Self {
        self.rate = Some(source.into());
        self
    }

    /// Builder: sets the amount formula.
    pub fn amount(mut self, source: impl Into<FormulaSource>) -> Self {
        self.amount = Some(source.into());
        self
    }

    /// Builder: marks the rule as a withholding of `dep`.
    pub fn withholding_of(mut self, dep: impl Into<String>) -> Self {
        self.whitholded = true;
        self.dep = Some(dep.into());
        self
    }

    /// Builder: appends a rule-local variable.
    pub fn var(mut self, name: impl Into<String>, source: impl Into<FormulaSource>) -> Self {
        self.vars.insert(name, source);
        self
    }

    /// Number of declared columns (the rule's specificity).
    pub fn specificity(&self) -> usize {
        Column::ALL
            .into_iter()
            .filter(|column| self.matcher(*column).is_some())
            .count()
    }
}

// =============================================================================
// Country
// =============================================================================

/// A country known to the rule store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
}

// =============================================================================
// Rule Catalog
// =============================================================================

/// The static rule data set: the import format for stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCatalog {
    #[serde(default)]
    pub countries: Vec<Country>,
    #[serde(default)]
    pub tax_rules: Vec<TaxRule>,
}

// =============================================================================
// Tax Query
// =============================================================================

/// Caller input to `get_taxes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxQuery {
    pub country: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bp_type: Option<String>,

    /// Requested tax names, in resolution order.
    #[serde(default)]
    pub taxes: Vec<String>,

    /// Base variables (e.g. `subTotal`), numbers or formula strings.
    #[serde(default, skip_serializing_if = "VarBindings::is_empty")]
    pub vars: VarBindings,

    /// Evaluation instant; defaults to now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
}

impl TaxQuery {
    pub fn new(country: impl Into<String>) -> Self {
        TaxQuery {
            country: country.into(),
            ..Default::default()
        }
    }

    /// The query's value for a column. Blank values count as unset.
    pub fn attribute(&self, column: Column) -> Option<&str> {
        let value = match column {
            Column::Region => self.region.as_deref(),
            Column::TxType => self.tx_type.as_deref(),
            Column::DocType => self.doc_type.as_deref(),
            Column::Category => self.category.as_deref(),
            Column::Area => self.area.as_deref(),
            Column::BpType => self.bp_type.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn set_attribute(&mut self, column: Column, value: impl Into<String>) {
        let slot = match column {
            Column::Region => &mut self.region,
            Column::TxType => &mut self.tx_type,
            Column::DocType => &mut self.doc_type,
            Column::Category => &mut self.category,
            Column::Area => &mut self.area,
            Column::BpType => &mut self.bp_type,
        };
        *slot = Some(value.into());
    }

    /// Builder: supplies a column value.
    pub fn with(mut self, column: Column, value: impl Into<String>) -> Self {
        self.set_attribute(column, value);
        self
    }

    /// Builder: requests a tax.
    pub fn tax(mut self, name: impl Into<String>) -> Self {
        self.taxes.push(name.into());
        self
    }

    /// Builder: binds a base variable.
    pub fn var(mut self, name: impl Into<String>, source: impl Into<FormulaSource>) -> Self {
        self.vars.insert(name, source);
        self
    }

    /// Builder: pins the evaluation instant.
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    /// Lowercased country code used for store lookups.
    pub fn country_code(&self) -> String {
        self.country.trim().to_lowercase()
    }
}

/// Compact rendering for error context:
/// `country=mx region=AGS txType=sales taxes=[IVA, ISR]`.
impl fmt::Display for TaxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "country={}", self.country_code())?;
        for column in Column::ALL {
            if let Some(value) = self.attribute(column) {
                write!(f, " {}={}", column, value)?;
            }
        }
        write!(f, " taxes=[{}]", self.taxes.join(", "))
    }
}

// =============================================================================
// Results
// =============================================================================

/// Resolved values for one tax.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxResult {
    /// Formula failure for this tax only.
    pub error: Option<FormulaError>,

    /// Evaluated rate (negated for withholdings), unrounded.
    pub rate: Decimal,

    /// Effective multiplier on the base amount.
    pub factor: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl TaxResult {
    /// A result whose formulas evaluated cleanly.
    pub fn evaluated(rate: Decimal, amount: Option<Decimal>, meta: Option<serde_json::Value>) -> Self {
        TaxResult {
            error: None,
            rate,
            factor: rate,
            amount,
            meta,
        }
    }

    /// A result carrying a formula error: zero rate, no amount.
    pub fn failed(error: FormulaError, meta: Option<serde_json::Value>) -> Self {
        TaxResult {
            error: Some(error),
            rate: Decimal::ZERO,
            factor: Decimal::ZERO,
            amount: None,
            meta,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-tax results in request order, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxBreakdown(Vec<(String, TaxResult)>);

impl TaxBreakdown {
    pub fn new() -> Self {
        TaxBreakdown(Vec::new())
    }

    pub fn push(&mut self, tax_name: impl Into<String>, result: TaxResult) {
        self.0.push((tax_name.into(), result));
    }

    /// Case-insensitive lookup by tax name.
    pub fn get(&self, tax_name: &str) -> Option<&TaxResult> {
        self.0
            .iter()
            .find(|(name, _)| eq_ignore_case(name, tax_name))
            .map(|(_, result)| result)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaxResult)> {
        self.0.iter().map(|(name, result)| (name.as_str(), result))
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for TaxBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, result) in &self.0 {
            map.serialize_entry(name, result)?;
        }
        map.end()
    }
}

/// The answer to a query.
///
/// Totals are present only when the query bound `subTotal`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_total: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_total: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grand_total: Option<Decimal>,

    pub taxes: TaxBreakdown,
}

impl TaxReport {
    /// Shortcut for `report.taxes.get(name)`.
    pub fn tax(&self, tax_name: &str) -> Option<&TaxResult> {
        self.taxes.get(tax_name)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matcher_parsing() {
        assert_eq!(Matcher::parse("DRUG").unwrap(), Matcher::Equals("DRUG".into()));
        assert_eq!(Matcher::parse("!DRUG").unwrap(), Matcher::NotEquals("DRUG".into()));
        assert!(Matcher::parse("").is_err());
        assert!(Matcher::parse("!").is_err());
        assert_eq!(Matcher::parse("!TAXYES").unwrap().to_string(), "!TAXYES");
    }

    #[test]
    fn test_matcher_accepts() {
        let equals = Matcher::Equals("DRUG".into());
        assert!(equals.accepts(Some("drug")));
        assert!(!equals.accepts(Some("CANDY")));
        assert!(!equals.accepts(None));

        let negated = Matcher::NotEquals("DRUG".into());
        assert!(negated.accepts(Some("CANDY")));
        assert!(!negated.accepts(Some("Drug")));
        assert!(!negated.accepts(None));
    }

    #[test]
    fn test_formula_source_classification() {
        assert_eq!(
            FormulaSource::from_text("0.16").unwrap(),
            FormulaSource::Literal("0.16".parse().unwrap())
        );
        assert_eq!(
            FormulaSource::from_text(" 2/3 ").unwrap(),
            FormulaSource::Expression("2/3".into())
        );
        assert!(FormulaSource::from_text("  ").is_err());
    }

    #[test]
    fn test_rule_deserializes_from_catalog_json() {
        let json = r#"{
            "country": "sa",
            "taxName": "VAT",
            "whitholded": false,
            "txType": "sales",
            "category": "!DRUG",
            "rate": 0.25,
            "meta": { "exempt": true },
            "unknownField": 1
        }"#;
        let rule: TaxRule = serde_json::from_str(json).unwrap();

        assert_eq!(rule.country, "sa");
        assert_eq!(rule.tx_type, Some(Matcher::Equals("sales".into())));
        assert_eq!(rule.category, Some(Matcher::NotEquals("DRUG".into())));
        assert_eq!(rule.region, None);
        assert_eq!(rule.rate, Some(FormulaSource::Literal("0.25".parse().unwrap())));
        assert_eq!(rule.meta.as_ref().unwrap()["exempt"], true);
        assert_eq!(rule.specificity(), 2);
    }

    #[test]
    fn test_json_number_literals_keep_every_digit() {
        let parse = |json: &str| serde_json::from_str::<FormulaSource>(json);

        assert_eq!(
            parse("0.12345678901234567890").unwrap(),
            FormulaSource::Literal("0.12345678901234567890".parse().unwrap())
        );
        assert_eq!(
            parse("12345678901234567890123").unwrap(),
            FormulaSource::Literal("12345678901234567890123".parse().unwrap())
        );
        assert_eq!(
            parse("1.6e-1").unwrap(),
            FormulaSource::Literal("0.16".parse().unwrap())
        );
        assert!(parse("true").is_err());
        assert!(parse("[0.16]").is_err());
    }

    #[test]
    fn test_var_bindings_keep_declaration_order() {
        let json = r#"{ "vars": { "zeta": "1", "alpha": "zeta + 1", "mid": "alpha * 2" } }"#;

        #[derive(Deserialize)]
        struct Holder {
            vars: VarBindings,
        }

        let holder: Holder = serde_json::from_str(json).unwrap();
        let names: Vec<&str> = holder.vars.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);

        let round_trip = serde_json::to_string(&holder.vars).unwrap();
        assert_eq!(round_trip, r#"{"zeta":"1","alpha":"zeta + 1","mid":"alpha * 2"}"#);
    }

    #[test]
    fn test_query_blank_attribute_counts_as_unset() {
        let query = TaxQuery::new("MX")
            .with(Column::Region, "  ")
            .with(Column::TxType, "sales");
        assert_eq!(query.attribute(Column::Region), None);
        assert_eq!(query.attribute(Column::TxType), Some("sales"));
        assert_eq!(query.country_code(), "mx");
    }

    #[test]
    fn test_query_display() {
        let query = TaxQuery::new("MX")
            .with(Column::Region, "AGS")
            .with(Column::TxType, "sales")
            .tax("IVA")
            .tax("ISR");
        assert_eq!(query.to_string(), "country=mx region=AGS txType=sales taxes=[IVA, ISR]");
    }

    #[test]
    fn test_breakdown_serializes_in_request_order() {
        let mut breakdown = TaxBreakdown::new();
        breakdown.push("RET_IVA", TaxResult::evaluated(Decimal::NEGATIVE_ONE, None, None));
        breakdown.push("IVA", TaxResult::evaluated(Decimal::ONE, None, None));

        let json = serde_json::to_string(&breakdown).unwrap();
        assert!(json.find("RET_IVA").unwrap() < json.find("\"IVA\"").unwrap());
        assert!(breakdown.get("ret_iva").is_some());
    }

    #[test]
    fn test_column_from_str() {
        assert_eq!("txType".parse::<Column>().unwrap(), Column::TxType);
        assert_eq!("BPTYPE".parse::<Column>().unwrap(), Column::BpType);
        assert!("color".parse::<Column>().is_err());
    }
}
