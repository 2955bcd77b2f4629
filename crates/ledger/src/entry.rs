//! Ledger entries - immutable, append-only record of every balance change

use chrono::{DateTime, Utc};
use growth_core::{Credits, IdempotencyKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Balance increases (award)
    Credit,
    /// Balance decreases (redemption)
    Debit,
}

/// Well-known provenance tags
pub mod source {
    pub const ENGAGEMENT_REWARD: &str = "engagement_reward";
    pub const BOUNTY_CLAIM: &str = "bounty_claim";
    pub const REDEMPTION: &str = "redemption";
    pub const BONUS: &str = "bonus";
}

/// One immutable ledger record.
///
/// # Invariants
/// - `amount` is positive for credits and negative for debits
/// - `balance_after` equals the user's balance immediately after this entry
/// - `sequence` is 1, 2, 3, ... per user with no gaps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub sequence: u64,
    pub amount: Decimal,
    pub entry_type: EntryType,
    pub source: String,
    /// Retention fee (debits only)
    pub fee: Option<Credits>,
    /// Amount after fee (debits only)
    pub net_value: Option<Credits>,
    pub balance_after: Credits,
    pub idempotency_key: Option<IdempotencyKey>,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build a credit entry
    pub fn credit(
        user_id: &str,
        sequence: u64,
        amount: Credits,
        source: &str,
        balance_after: Credits,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            sequence,
            amount: amount.value(),
            entry_type: EntryType::Credit,
            source: source.to_string(),
            fee: None,
            net_value: None,
            balance_after,
            idempotency_key: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a debit entry carrying the retention fee split
    pub fn debit(
        user_id: &str,
        sequence: u64,
        amount: Credits,
        fee: Credits,
        net_value: Credits,
        balance_after: Credits,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            sequence,
            amount: -amount.value(),
            entry_type: EntryType::Debit,
            source: source::REDEMPTION.to_string(),
            fee: Some(fee),
            net_value: Some(net_value),
            balance_after,
            idempotency_key: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_idempotency_key(mut self, key: Option<IdempotencyKey>) -> Self {
        self.idempotency_key = key;
        self
    }

    /// Absolute size of the change
    pub fn magnitude(&self) -> Credits {
        Credits::new_unchecked(self.amount.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn credits(v: Decimal) -> Credits {
        Credits::new(v).unwrap()
    }

    #[test]
    fn test_credit_entry_is_positive() {
        let entry = LedgerEntry::credit("u1", 1, credits(dec!(10)), source::ENGAGEMENT_REWARD, credits(dec!(10)));
        assert_eq!(entry.amount, dec!(10));
        assert_eq!(entry.entry_type, EntryType::Credit);
        assert!(entry.fee.is_none());
    }

    #[test]
    fn test_debit_entry_is_negative() {
        let entry = LedgerEntry::debit(
            "u1",
            2,
            credits(dec!(10)),
            credits(dec!(1)),
            credits(dec!(9)),
            Credits::ZERO,
        );
        assert_eq!(entry.amount, dec!(-10));
        assert_eq!(entry.magnitude().value(), dec!(10));
        assert_eq!(entry.fee, Some(credits(dec!(1))));
        assert_eq!(entry.source, source::REDEMPTION);
    }

    #[test]
    fn test_entry_type_strings() {
        assert_eq!(EntryType::Credit.to_string(), "credit");
        assert_eq!("debit".parse::<EntryType>().unwrap(), EntryType::Debit);
        let json = serde_json::to_string(&EntryType::Debit).unwrap();
        assert_eq!(json, "\"debit\"");
    }
}
