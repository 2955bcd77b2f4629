//! Rate - fee fractions and currency rounding

use crate::amount::Credits;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of decimal places used for currency values (cents)
pub const CURRENCY_DP: u32 = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error("Rate must be within [0, 1]: {0}")]
    OutOfRange(Decimal),
}

/// A fee rate in the closed interval [0, 1].
///
/// `Rate::new(dec!(0.10))` is a 10% fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, RateError> {
        if value < Decimal::ZERO || value > Decimal::ONE {
            Err(RateError::OutOfRange(value))
        } else {
            Ok(Self(value))
        }
    }

    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// Split an amount into `(fee, net)` where `fee + net == amount` exactly.
    ///
    /// The fee is rounded to cents; the net is whatever remains, so the split never
    /// creates or destroys credits.
    pub fn split(&self, amount: Credits) -> (Credits, Credits) {
        let fee = round_currency(amount.value() * self.0).min(amount.value());
        let net = amount.value() - fee;
        (Credits::new_unchecked(fee), Credits::new_unchecked(net))
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = RateError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", (self.0 * Decimal::ONE_HUNDRED).normalize())
    }
}

/// Round to cents, midpoint away from zero.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rate_bounds() {
        assert!(Rate::new(dec!(0.1)).is_ok());
        assert!(Rate::new(Decimal::ONE).is_ok());
        assert!(matches!(Rate::new(dec!(1.01)), Err(RateError::OutOfRange(_))));
        assert!(matches!(Rate::new(dec!(-0.1)), Err(RateError::OutOfRange(_))));
    }

    #[test]
    fn test_split_ten_percent() {
        let rate = Rate::new(dec!(0.10)).unwrap();
        let (fee, net) = rate.split(Credits::new(dec!(10)).unwrap());
        assert_eq!(fee.value(), dec!(1));
        assert_eq!(net.value(), dec!(9));
    }

    #[test]
    fn test_split_conserves_odd_cents() {
        let rate = Rate::new(dec!(0.20)).unwrap();
        let total = Credits::new(dec!(0.07)).unwrap();
        let (fee, net) = rate.split(total);
        assert_eq!(fee.value() + net.value(), total.value());
        assert_eq!(fee.value(), dec!(0.01));
    }

    #[test]
    fn test_round_currency_midpoint() {
        assert_eq!(round_currency(dec!(2.345)), dec!(2.35));
        assert_eq!(round_currency(dec!(2.344)), dec!(2.34));
    }

    #[test]
    fn test_display() {
        assert_eq!(Rate::new(dec!(0.2)).unwrap().to_string(), "20%");
    }
}
