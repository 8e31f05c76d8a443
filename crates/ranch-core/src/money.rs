//! # Money Module
//!
//! Integer-cent money for the finance domain.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Feed bill split three ways:                                            │
//! │    floats: 100.00 / 3 * 3 = 99.99999999999999                           │
//! │    cents:  10000 / 3 = 3333 (x3 = 9999, one cent left over, explicit)   │
//! │                                                                         │
//! │  Budgets compare sums of many expenses against a limit, so drift in     │
//! │  float sums would move an alert across a severity threshold.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ranch_core::money::Money;
//!
//! let feed = Money::from_cents(125_000);
//! let vet = Money::from_cents(48_050);
//! assert_eq!((feed + vet).to_string(), "$1730.50");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

/// A monetary value in cents.
///
/// Signed so refunds and corrections can be represented directly.
/// Arithmetic saturates at the `i64` bounds instead of wrapping or
/// panicking.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole dollars.
    #[inline]
    pub const fn from_dollars(dollars: i64) -> Self {
        Money(dollars.saturating_mul(100))
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.saturating_abs())
    }

    /// Returns `self / whole` as a fraction, or `None` when `whole` is not
    /// positive.
    ///
    /// Used for budget usage: `spent.ratio_of(limit)` of `1.25` means 125%.
    ///
    /// ```rust
    /// use ranch_core::money::Money;
    ///
    /// let spent = Money::from_dollars(450);
    /// let limit = Money::from_dollars(400);
    /// assert_eq!(spent.ratio_of(limit), Some(1.125));
    /// assert_eq!(spent.ratio_of(Money::zero()), None);
    /// ```
    pub fn ratio_of(&self, whole: Money) -> Option<f64> {
        if whole.0 <= 0 {
            return None;
        }
        Some(self.0 as f64 / whole.0 as f64)
    }
}

// =============================================================================
// Arithmetic
// =============================================================================

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_sub(rhs.0);
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "$10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-$5.50");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[test]
    fn test_sum_of_expenses() {
        let total: Money = [1000, 2550, -50]
            .into_iter()
            .map(Money::from_cents)
            .sum();
        assert_eq!(total.cents(), 3500);
    }

    #[test]
    fn test_ratio_of() {
        let spent = Money::from_dollars(90);
        assert_eq!(spent.ratio_of(Money::from_dollars(100)), Some(0.9));
        assert_eq!(spent.ratio_of(Money::from_dollars(-1)), None);
    }

    #[test]
    fn test_arithmetic_saturates_at_bounds() {
        let max = Money::from_cents(i64::MAX);
        let min = Money::from_cents(i64::MIN);
        assert_eq!(max + Money::from_cents(1), max);
        assert_eq!(min - Money::from_cents(1), min);
        assert_eq!(-min, max);
        assert_eq!(min.abs(), max);
        assert_eq!(Money::from_dollars(i64::MAX), max);
        assert_eq!(Money::from_dollars(i64::MIN), min);

        let mut total = max;
        total += Money::from_dollars(5);
        assert_eq!(total, max);
        let total: Money = [max, max, Money::from_cents(-1)].into_iter().sum();
        assert_eq!(total, Money::from_cents(i64::MAX - 1));
    }

    #[test]
    fn test_display_of_extremes() {
        assert_eq!(Money::from_cents(i64::MIN).to_string(), "-$92233720368547758.08");
    }

    #[test]
    fn test_serde_is_plain_integer() {
        let json = serde_json::to_string(&Money::from_cents(4200)).unwrap();
        assert_eq!(json, "4200");
    }
}
