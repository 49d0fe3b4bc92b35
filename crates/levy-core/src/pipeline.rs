//! # Tax Resolution Pipeline
//!
//! Turns the selected rules into a [`TaxReport`].
//!
//! ## Stages
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  query.vars ──► base Environment (fresh per query)                      │
//! │                        │                                                │
//! │  1. apply_rules        │ clone per rule, bind rule.vars in order,       │
//! │                        ▼ evaluate rate (negated if withholding), amount │
//! │     IVA  rate 0.16    ISR rate 0.10    RET_IVA rate -0.666…            │
//! │                        │                                                │
//! │  2. calculate_factors  ▼ dep X present → round_f(rate × rate(X))        │
//! │     IVA  0.16         ISR 0.10         RET_IVA -0.106667               │
//! │                        │                                                │
//! │  3. calculate_amounts  ▼ explicit amount, else round_a(factor × sub)    │
//! │     IVA  160.00       ISR 100.00       RET_IVA -106.67                 │
//! │                        │                                                │
//! │  4. calculate_totals   ▼ only when subTotal is bound                    │
//! │     taxTotal 153.33   grandTotal 1153.33                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Selection errors never reach this module. A formula error here stays on
//! its own tax (rate 0, no amount); the rest of the report is still built.
//! The only fatal failures are a broken query variable and overflowing totals.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult, FormulaError, FormulaResult};
use crate::formula::{Environment, FormulaCache};
use crate::money::{sum_amounts, Rounding};
use crate::types::{eq_ignore_case, TaxBreakdown, TaxQuery, TaxReport, TaxResult, TaxRule};
use crate::SUB_TOTAL_VAR;

/// Runs the four resolution stages over already-selected rules.
pub struct Pipeline<'a> {
    cache: &'a FormulaCache,
    rounding: Rounding,
}

impl<'a> Pipeline<'a> {
    pub fn new(cache: &'a FormulaCache, rounding: Rounding) -> Self {
        Pipeline { cache, rounding }
    }

    /// Resolves `rules` (one per requested tax, in request order).
    pub fn run(&self, rules: &[&TaxRule], query: &TaxQuery) -> CoreResult<TaxReport> {
        let base = self.base_environment(query)?;
        let sub_total = base.number(SUB_TOTAL_VAR);

        let mut results = self.apply_rules(rules, &base);
        self.calculate_factors(rules, &mut results);
        self.calculate_amounts(&mut results, sub_total);
        self.calculate_totals(rules, results, sub_total, query)
    }

    /// Binds the query's variables in declaration order.
    ///
    /// Query variables are caller input, so a failure here fails the query.
    pub fn base_environment(&self, query: &TaxQuery) -> CoreResult<Environment> {
        let mut env = Environment::new();
        for (name, source) in query.vars.iter() {
            let value = self.cache.evaluate(source, &env).map_err(|source| {
                CoreError::InvalidQueryVariable {
                    name: name.to_string(),
                    source,
                }
            })?;
            env.bind(name, value);
        }

        if env.contains(SUB_TOTAL_VAR) && env.number(SUB_TOTAL_VAR).is_none() {
            return Err(CoreError::InvalidQueryVariable {
                name: SUB_TOTAL_VAR.to_string(),
                source: FormulaError::TypeMismatch {
                    expected: "number".to_string(),
                    found: "boolean".to_string(),
                },
            });
        }

        Ok(env)
    }

    // =========================================================================
    // Stage 1: Bind & Evaluate
    // =========================================================================

    /// Evaluates each rule's variables, rate and amount.
    pub fn apply_rules(&self, rules: &[&TaxRule], base: &Environment) -> Vec<TaxResult> {
        rules
            .iter()
            .map(|rule| match self.evaluate_rule(rule, base) {
                Ok(result) => result,
                Err(error) => {
                    warn!(tax = %rule.tax_name, %error, "Tax formula failed");
                    TaxResult::failed(error, rule.meta.clone())
                }
            })
            .collect()
    }

    fn evaluate_rule(&self, rule: &TaxRule, base: &Environment) -> FormulaResult<TaxResult> {
        let mut env = base.clone();
        for (name, source) in rule.vars.iter() {
            let value = self.cache.evaluate(source, &env)?;
            env.bind(name, value);
        }

        let rate = match &rule.rate {
            Some(source) => self.cache.evaluate_number(source, &env)?,
            None => Decimal::ZERO,
        };
        let rate = if rule.whitholded { -rate } else { rate };

        let amount = rule
            .amount
            .as_ref()
            .map(|source| self.cache.evaluate_number(source, &env))
            .transpose()?;

        Ok(TaxResult::evaluated(rate, amount, rule.meta.clone()))
    }

    // =========================================================================
    // Stage 2: Factors
    // =========================================================================

    /// Sets each factor, multiplying withholdings by their dependency's rate.
    ///
    /// Dependencies are looked up among the requested taxes only; a rule whose
    /// `dep` was not requested keeps `factor = rate`.
    pub fn calculate_factors(&self, rules: &[&TaxRule], results: &mut [TaxResult]) {
        let evaluated: Vec<(Decimal, bool)> = results
            .iter()
            .map(|result| (result.rate, result.is_ok()))
            .collect();

        for (index, (rule, result)) in rules.iter().zip(results.iter_mut()).enumerate() {
            if !result.is_ok() {
                continue;
            }

            let dependency = rule.dep.as_deref().and_then(|dep| {
                rules
                    .iter()
                    .position(|other| eq_ignore_case(&other.tax_name, dep))
                    .filter(|position| *position != index)
                    .map(|position| (dep, evaluated[position]))
            });

            let factor = match dependency {
                Some((dep, (_, false))) => Err(FormulaError::DependencyFailed {
                    dependency: dep.to_string(),
                }),
                Some((_, (dep_rate, true))) => result
                    .rate
                    .checked_mul(dep_rate)
                    .ok_or(FormulaError::Overflow),
                None => Ok(result.rate),
            };

            match factor {
                Ok(factor) => result.factor = self.rounding.factor(factor),
                Err(error) => {
                    warn!(tax = %rule.tax_name, %error, "Tax factor failed");
                    *result = TaxResult::failed(error, result.meta.take());
                }
            }
        }
    }

    // =========================================================================
    // Stage 3: Amounts
    // =========================================================================

    /// Rounds explicit amounts, or derives them from `subTotal` when bound.
    pub fn calculate_amounts(&self, results: &mut [TaxResult], sub_total: Option<Decimal>) {
        for result in results.iter_mut().filter(|result| result.is_ok()) {
            let amount = match (result.amount, sub_total) {
                (Some(explicit), _) => Some(explicit),
                (None, Some(base)) => match result.factor.checked_mul(base) {
                    Some(amount) => Some(amount),
                    None => {
                        *result = TaxResult::failed(FormulaError::Overflow, result.meta.take());
                        continue;
                    }
                },
                (None, None) => None,
            };
            result.amount = amount.map(|amount| self.rounding.amount(amount));
        }
    }

    // =========================================================================
    // Stage 4: Totals
    // =========================================================================

    /// Builds the report; totals only when `subTotal` is bound.
    pub fn calculate_totals(
        &self,
        rules: &[&TaxRule],
        results: Vec<TaxResult>,
        sub_total: Option<Decimal>,
        query: &TaxQuery,
    ) -> CoreResult<TaxReport> {
        let (tax_total, grand_total) = match sub_total {
            Some(base) => {
                let overflow = || CoreError::TotalsOverflow {
                    query: query.to_string(),
                };
                let tax_total =
                    sum_amounts(results.iter().filter_map(|result| result.amount)).ok_or_else(overflow)?;
                let grand_total = base.checked_add(tax_total).ok_or_else(overflow)?;
                (Some(tax_total), Some(grand_total))
            }
            None => (None, None),
        };

        let mut taxes = TaxBreakdown::new();
        for (rule, result) in rules.iter().zip(results) {
            debug!(
                tax = %rule.tax_name,
                rate = %result.rate,
                factor = %result.factor,
                amount = ?result.amount,
                "Resolved tax"
            );
            taxes.push(rule.tax_name.clone(), result);
        }

        Ok(TaxReport {
            sub_total,
            tax_total,
            grand_total,
            taxes,
        })
    }
}
