//! Credits - Non-negative decimal wrapper for growth credit amounts
//!
//! Balances, awards, redemptions and bounty pools are all expressed in `Credits`.
//! A negative value can never be constructed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use thiserror::Error;

/// Errors that can occur when working with amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Amount must be greater than zero: {0}")]
    NotPositive(Decimal),

    #[error("Invalid amount literal: {0}")]
    Unparseable(String),
}

/// A non-negative amount of growth credits.
///
/// # Invariant
/// The inner value is always >= 0. This is enforced by the constructor.
///
/// # Example
/// ```
/// use growth_core::Credits;
/// use rust_decimal::Decimal;
///
/// let credits = Credits::new(Decimal::new(10, 0)).unwrap();
/// assert_eq!(credits.value(), Decimal::new(10, 0));
///
/// assert!(Credits::new(Decimal::new(-1, 0)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Credits(Decimal);

impl Credits {
    /// Zero credits
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new amount from a Decimal.
    ///
    /// Returns an error if the value is negative.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            Err(AmountError::NegativeAmount(value))
        } else {
            Ok(Self(value.normalize()))
        }
    }

    /// Create an amount that must be strictly positive (awards, redemptions, bounty funding).
    pub fn positive(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            Err(AmountError::NotPositive(value))
        } else {
            Ok(Self(value.normalize()))
        }
    }

    /// Create an amount without validation.
    ///
    /// The caller MUST ensure the value is non-negative.
    /// Use only for trusted sources (e.g. rows read back from validated storage).
    #[inline]
    pub const fn new_unchecked(value: Decimal) -> Self {
        Self(value)
    }

    /// Get the inner Decimal value
    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition - returns None on overflow
    pub fn checked_add(&self, other: &Credits) -> Option<Credits> {
        self.0.checked_add(other.0).map(Credits)
    }

    /// Checked subtraction - returns None if result would be negative
    pub fn checked_sub(&self, other: &Credits) -> Option<Credits> {
        let result = self.0.checked_sub(other.0)?;
        if result < Decimal::ZERO {
            None
        } else {
            Some(Credits(result))
        }
    }

    /// Subtraction clamped at zero
    pub fn saturating_sub(&self, other: &Credits) -> Credits {
        self.checked_sub(other).unwrap_or(Credits::ZERO)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Credits {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Credits> for Decimal {
    fn from(amount: Credits) -> Self {
        amount.0
    }
}

impl std::str::FromStr for Credits {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Decimal = s
            .trim()
            .parse()
            .map_err(|_| AmountError::Unparseable(s.to_string()))?;
        Self::new(value)
    }
}

impl Default for Credits {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Sum for Credits {
    fn sum<I: Iterator<Item = Credits>>(iter: I) -> Self {
        Credits(iter.map(|c| c.0).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_credits_positive() {
        let credits = Credits::new(dec!(100)).unwrap();
        assert_eq!(credits.value(), dec!(100));
    }

    #[test]
    fn test_credits_negative_rejected() {
        let result = Credits::new(dec!(-100));
        assert!(matches!(result, Err(AmountError::NegativeAmount(_))));
    }

    #[test]
    fn test_positive_rejects_zero() {
        assert!(matches!(
            Credits::positive(Decimal::ZERO),
            Err(AmountError::NotPositive(_))
        ));
        assert!(Credits::positive(dec!(0.01)).is_ok());
    }

    #[test]
    fn test_checked_sub_prevents_negative() {
        let a = Credits::new(dec!(50)).unwrap();
        let b = Credits::new(dec!(100)).unwrap();
        assert!(a.checked_sub(&b).is_none());
        assert_eq!(a.saturating_sub(&b), Credits::ZERO);
    }

    #[test]
    fn test_checked_sub_success() {
        let a = Credits::new(dec!(100)).unwrap();
        let b = Credits::new(dec!(30)).unwrap();
        assert_eq!(a.checked_sub(&b).unwrap().value(), dec!(70));
    }

    #[test]
    fn test_parse_and_sum() {
        let a: Credits = "12.50".parse().unwrap();
        let b: Credits = "7.5".parse().unwrap();
        let total: Credits = vec![a, b].into_iter().sum();
        assert_eq!(total.value(), dec!(20));
        assert!("abc".parse::<Credits>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let credits = Credits::new(dec!(123.45)).unwrap();
        let json = serde_json::to_string(&credits).unwrap();
        assert_eq!(json, "\"123.45\"");
        let parsed: Credits = serde_json::from_str(&json).unwrap();
        assert_eq!(credits, parsed);
    }
}
