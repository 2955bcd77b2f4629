//! Growth Core - Domain types
//!
//! Fundamental types shared by the ledger, pricing and escrow crates:
//! - `Credits`: Non-negative decimal amount of growth credits
//! - `Rate`: Fee fraction in [0, 1] with exact fee/net splitting
//! - `IdempotencyKey`: Caller-supplied dedupe key for retried operations

pub mod amount;
pub mod rate;

pub use amount::{AmountError, Credits};
pub use rate::{round_currency, Rate, RateError, CURRENCY_DP};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied key identifying one logical operation.
///
/// Retrying an operation with the same key never applies it twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
