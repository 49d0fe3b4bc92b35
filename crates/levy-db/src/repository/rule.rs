//! # Tax Rule Repository
//!
//! Database operations for tax rules.
//!
//! ## Row Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tax_rules row                         TaxRule                          │
//! │                                                                         │
//! │  region   = NULL            ───────►   region   = None (not declared)   │
//! │  category = 'DRUG'          ───────►   Some(Matcher::Equals("DRUG"))    │
//! │  area     = '!PHARMACY'     ───────►   Some(Matcher::NotEquals(..))     │
//! │  rate     = '0.16'          ───────►   Some(FormulaSource::Literal)     │
//! │  amount   = 'subTotal * r'  ───────►   Some(FormulaSource::Expression)  │
//! │  vars     = '{"r":"0.1"}'   ───────►   VarBindings (key order kept)     │
//! │  meta     = '{"exempt":1}'  ───────►   Some(serde_json::Value)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are returned in `position` order, which is the catalog order the
//! in-memory store also preserves.

use chrono::{DateTime, Utc};
use levy_core::validation::validate_rule;
use levy_core::{FormulaSource, Matcher, TaxRule, VarBindings};
use sqlx::{Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

const SELECT_RULES: &str = r#"
    SELECT
        id, country, region, tx_type, doc_type, category, area, bp_type,
        tax_name, whitholded, dep, valid_from, valid_until,
        rate, amount, vars, meta
    FROM tax_rules
"#;

/// A `tax_rules` row as stored.
#[derive(Debug, sqlx::FromRow)]
struct TaxRuleRow {
    id: String,
    country: String,
    region: Option<String>,
    tx_type: Option<String>,
    doc_type: Option<String>,
    category: Option<String>,
    area: Option<String>,
    bp_type: Option<String>,
    tax_name: String,
    whitholded: bool,
    dep: Option<String>,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    rate: Option<String>,
    amount: Option<String>,
    vars: String,
    meta: Option<String>,
}

impl TaxRuleRow {
    fn matcher(&self, text: &Option<String>) -> DbResult<Option<Matcher>> {
        text.as_deref()
            .map(Matcher::parse)
            .transpose()
            .map_err(|e| DbError::decode("tax rule", &self.id, e))
    }

    fn formula(&self, text: &Option<String>) -> DbResult<Option<FormulaSource>> {
        text.as_deref()
            .map(FormulaSource::from_text)
            .transpose()
            .map_err(|e| DbError::decode("tax rule", &self.id, e))
    }
}

impl TryFrom<TaxRuleRow> for TaxRule {
    type Error = DbError;

    fn try_from(row: TaxRuleRow) -> DbResult<Self> {
        let vars: VarBindings = serde_json::from_str(&row.vars)
            .map_err(|e| DbError::decode("tax rule", &row.id, e))?;

        let meta: Option<serde_json::Value> = row
            .meta
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DbError::decode("tax rule", &row.id, e))?;

        Ok(TaxRule {
            region: row.matcher(&row.region)?,
            tx_type: row.matcher(&row.tx_type)?,
            doc_type: row.matcher(&row.doc_type)?,
            category: row.matcher(&row.category)?,
            area: row.matcher(&row.area)?,
            bp_type: row.matcher(&row.bp_type)?,
            rate: row.formula(&row.rate)?,
            amount: row.formula(&row.amount)?,
            vars,
            meta,
            country: row.country,
            tax_name: row.tax_name,
            whitholded: row.whitholded,
            dep: row.dep,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
        })
    }
}

/// Writes one rule through any executor (pool or open transaction).
pub(crate) async fn insert_rule<'e, E>(executor: E, rule: &TaxRule, position: i64) -> DbResult<String>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = Uuid::new_v4().to_string();
    let matcher = |m: &Option<Matcher>| m.as_ref().map(Matcher::to_string);
    let formula = |f: &Option<FormulaSource>| f.as_ref().map(FormulaSource::as_text);
    let vars = serde_json::to_string(&rule.vars)?;
    let meta = rule.meta.as_ref().map(serde_json::to_string).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO tax_rules (
            id, position, country,
            region, tx_type, doc_type, category, area, bp_type,
            tax_name, whitholded, dep, valid_from, valid_until,
            rate, amount, vars, meta, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
        "#,
    )
    .bind(&id)
    .bind(position)
    .bind(rule.country.to_lowercase())
    .bind(matcher(&rule.region))
    .bind(matcher(&rule.tx_type))
    .bind(matcher(&rule.doc_type))
    .bind(matcher(&rule.category))
    .bind(matcher(&rule.area))
    .bind(matcher(&rule.bp_type))
    .bind(&rule.tax_name)
    .bind(rule.whitholded)
    .bind(&rule.dep)
    .bind(rule.valid_from)
    .bind(rule.valid_until)
    .bind(formula(&rule.rate))
    .bind(formula(&rule.amount))
    .bind(vars)
    .bind(meta)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(id)
}

/// Next free `position` (one past the highest stored).
pub(crate) async fn next_position<'e, E>(executor: E) -> DbResult<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(position) FROM tax_rules")
        .fetch_one(executor)
        .await?;
    Ok(max.map_or(0, |max| max + 1))
}

/// Repository for tax rule database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = TaxRuleRepository::new(pool);
/// let rules = repo.by_country("mx").await?;
/// ```
#[derive(Debug, Clone)]
pub struct TaxRuleRepository {
    pool: SqlitePool,
}

impl TaxRuleRepository {
    /// Creates a new TaxRuleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TaxRuleRepository { pool }
    }

    /// Every rule of a country, in catalog order.
    ///
    /// Fails with [`DbError::Decode`] if any stored row no longer parses;
    /// a partial rule set would change which rule the selector picks.
    pub async fn by_country(&self, country: &str) -> DbResult<Vec<TaxRule>> {
        let country = country.trim().to_lowercase();

        let rows: Vec<TaxRuleRow> = sqlx::query_as(&format!(
            "{} WHERE country = ?1 ORDER BY position, rowid",
            SELECT_RULES
        ))
        .bind(&country)
        .fetch_all(&self.pool)
        .await?;

        debug!(country = %country, count = rows.len(), "Fetched tax rules");
        rows.into_iter().map(TaxRule::try_from).collect()
    }

    /// Gets a rule by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<TaxRule>> {
        let row: Option<TaxRuleRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_RULES))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TaxRule::try_from).transpose()
    }

    /// Validates and appends a rule after the existing ones.
    ///
    /// ## Returns
    /// The generated rule ID.
    pub async fn insert(&self, rule: &TaxRule) -> DbResult<String> {
        validate_rule(rule)?;

        let position = next_position(&self.pool).await?;
        let id = insert_rule(&self.pool, rule, position).await?;

        debug!(id = %id, country = %rule.country, tax = %rule.tax_name, "Inserted tax rule");
        Ok(id)
    }

    /// Deletes a rule by ID.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM tax_rules WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Tax rule", id));
        }

        Ok(())
    }

    /// Total number of stored rules.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tax_rules")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of rules per country code, sorted by code.
    pub async fn count_by_country(&self) -> DbResult<Vec<(String, i64)>> {
        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT country, COUNT(*) FROM tax_rules GROUP BY country ORDER BY country",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use levy_core::Column;
    use rust_decimal::Decimal;

    async fn repo() -> TaxRuleRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.rules()
    }

    #[tokio::test]
    async fn test_round_trip_keeps_matchers_and_formulas() {
        let repo = repo().await;

        let rule = TaxRule::new("mx", "RET_IVA")
            .with(Column::Region, "AGS")
            .with(Column::Category, "!DRUG")
            .withholding_of("IVA")
            .var("base", "subTotal * 2")
            .var("half", "base / 4")
            .rate("-0.666667")
            .amount("half * 0.1");
        let id = repo.insert(&rule).await.unwrap();

        let stored = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored, rule);
        assert_eq!(stored.rate, Some(FormulaSource::Literal(Decimal::new(-666667, 6))));
        assert_eq!(
            stored.category,
            Some(Matcher::NotEquals("DRUG".to_string()))
        );
        let names: Vec<&str> = stored.vars.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["base", "half"]);
    }

    #[tokio::test]
    async fn test_by_country_keeps_insertion_order() {
        let repo = repo().await;
        repo.insert(&TaxRule::new("mx", "IVA").rate("0.16")).await.unwrap();
        repo.insert(&TaxRule::new("ar", "IIBB").rate("0.03")).await.unwrap();
        repo.insert(&TaxRule::new("mx", "ISR").rate("0.10")).await.unwrap();

        let names: Vec<String> = repo
            .by_country("MX")
            .await
            .unwrap()
            .into_iter()
            .map(|rule| rule.tax_name)
            .collect();
        assert_eq!(names, vec!["IVA", "ISR"]);
        assert_eq!(repo.count().await.unwrap(), 3);
        assert_eq!(
            repo.count_by_country().await.unwrap(),
            vec![("ar".to_string(), 1), ("mx".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_rule() {
        let repo = repo().await;
        let result = repo.insert(&TaxRule::new("mx", "IVA")).await;
        assert!(matches!(result, Err(DbError::Core(_))));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_a_decode_error() {
        let repo = repo().await;
        let id = repo.insert(&TaxRule::new("mx", "IVA").rate("0.16")).await.unwrap();

        sqlx::query("UPDATE tax_rules SET category = '!' WHERE id = ?1")
            .bind(&id)
            .execute(&repo.pool)
            .await
            .unwrap();

        assert!(matches!(
            repo.by_country("mx").await,
            Err(DbError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = repo().await;
        let id = repo.insert(&TaxRule::new("mx", "IVA").rate("0.16")).await.unwrap();
        repo.delete(&id).await.unwrap();
        assert!(repo.get_by_id(&id).await.unwrap().is_none());
        assert!(matches!(repo.delete(&id).await, Err(DbError::NotFound { .. })));
    }
}
