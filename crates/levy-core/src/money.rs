//! # Money Module
//!
//! Fixed-precision helpers for rates, factors and amounts.
//!
//! ## Why Decimal?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In binary floating point:                                              │
//! │    -0.16 * (2/3) * 1000 = -106.66666666666667  (and drifts on sums)   │
//! │                                                                         │
//! │  OUR SOLUTION: rust_decimal + ONE rounding rule at two boundaries       │
//! │    rate    → carried unrounded (28 significant digits)                 │
//! │    factor  → rounded to `factor_scale` places (default 6)             │
//! │    amount  → rounded to `amount_scale` places (default 2)             │
//! │    totals  → exact sums of already-rounded amounts                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use levy_core::money::Rounding;
//! use rust_decimal::Decimal;
//!
//! let rounding = Rounding::default();
//! let factor = rounding.factor("-0.1066666666".parse::<Decimal>().unwrap());
//! assert_eq!(factor.to_string(), "-0.106667");
//!
//! let amount = rounding.amount(factor * Decimal::from(1000));
//! assert_eq!(amount.to_string(), "-106.67");
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::{DEFAULT_AMOUNT_SCALE, DEFAULT_FACTOR_SCALE};

// =============================================================================
// Rounding Policy
// =============================================================================

/// The single rounding policy applied by the pipeline.
///
/// Half-way values round away from zero (`0.125 → 0.13`, `-0.125 → -0.13`),
/// so a withholding and the tax it withholds from round symmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rounding {
    factor_scale: u32,
    amount_scale: u32,
}

impl Rounding {
    /// Creates a policy with explicit scales (decimal places).
    pub const fn new(factor_scale: u32, amount_scale: u32) -> Self {
        Rounding {
            factor_scale,
            amount_scale,
        }
    }

    /// Decimal places kept on factors.
    #[inline]
    pub const fn factor_scale(&self) -> u32 {
        self.factor_scale
    }

    /// Decimal places kept on amounts.
    #[inline]
    pub const fn amount_scale(&self) -> u32 {
        self.amount_scale
    }

    /// Rounds a factor (`rate`, or `rate * dependency rate`).
    pub fn factor(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.factor_scale, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Rounds a monetary amount.
    pub fn amount(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.amount_scale, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl Default for Rounding {
    fn default() -> Self {
        Rounding::new(DEFAULT_FACTOR_SCALE, DEFAULT_AMOUNT_SCALE)
    }
}

// =============================================================================
// Conversions
// =============================================================================

/// Parses a bare decimal literal such as `"0.16"`, `"-5"` or `" 1000 "`.
///
/// Returns `None` for anything that is not a plain number, including
/// expressions like `"2/3"` which must go through the formula grammar.
pub fn parse_literal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    let plain = text
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+'));
    if text.is_empty() || !plain {
        return None;
    }
    Decimal::from_str(text).ok()
}

/// Converts a JSON/grammar float into a Decimal through its shortest
/// round-trip text (`0.16_f64` becomes exactly `0.16`).
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string()).ok()
}

/// Sums amounts exactly (no further rounding). `None` on overflow.
pub fn sum_amounts<I>(amounts: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(text: &str) -> Decimal {
        Decimal::from_str(text).unwrap()
    }

    #[test]
    fn test_factor_rounding_keeps_six_places() {
        let rounding = Rounding::default();
        let two_thirds = Decimal::from(2) / Decimal::from(3);
        let factor = rounding.factor(-two_thirds * d("0.16"));
        assert_eq!(factor, d("-0.106667"));
    }

    #[test]
    fn test_amount_rounding_half_away_from_zero() {
        let rounding = Rounding::default();
        assert_eq!(rounding.amount(d("0.125")), d("0.13"));
        assert_eq!(rounding.amount(d("-0.125")), d("-0.13"));
        assert_eq!(rounding.amount(d("-106.667")), d("-106.67"));
        assert_eq!(rounding.amount(d("160")), d("160"));
    }

    #[test]
    fn test_custom_scales() {
        let rounding = Rounding::new(3, 0);
        assert_eq!(rounding.factor(d("0.16666")), d("0.167"));
        assert_eq!(rounding.amount(d("99.5")), d("100"));
        assert_eq!(rounding.factor_scale(), 3);
        assert_eq!(rounding.amount_scale(), 0);
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("0.16"), Some(d("0.16")));
        assert_eq!(parse_literal(" 1000 "), Some(d("1000")));
        assert_eq!(parse_literal("-0.5"), Some(d("-0.5")));
        assert_eq!(parse_literal("2/3"), None);
        assert_eq!(parse_literal("subTotal"), None);
        assert_eq!(parse_literal(""), None);
    }

    #[test]
    fn test_decimal_from_f64_is_exact_for_short_literals() {
        assert_eq!(decimal_from_f64(0.16), Some(d("0.16")));
        assert_eq!(decimal_from_f64(0.25), Some(d("0.25")));
        assert_eq!(decimal_from_f64(1000.0), Some(d("1000")));
        assert_eq!(decimal_from_f64(f64::NAN), None);
    }

    /// Totals are sums of rounded amounts: 160 + 100 - 106.67 = 153.33
    #[test]
    fn test_sum_amounts_is_exact() {
        let total = sum_amounts([d("160.00"), d("100.00"), d("-106.67")]);
        assert_eq!(total, Some(d("153.33")));
        assert_eq!(sum_amounts(Vec::new()), Some(Decimal::ZERO));
        assert_eq!(sum_amounts([Decimal::MAX, Decimal::MAX]), None);
    }
}
