//! Ledger audit - replay entries and check the balance snapshots
//!
//! Replaying all entries of a user in sequence order and summing `amount`
//! must reproduce every `balance_after` and the stored balance exactly.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::entry::LedgerEntry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("Sequence gap for {user_id}: expected {expected}, got {actual}")]
    SequenceGap {
        user_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Balance snapshot mismatch for {user_id} at sequence {sequence}: replayed {replayed}, recorded {recorded}")]
    SnapshotMismatch {
        user_id: String,
        sequence: u64,
        replayed: Decimal,
        recorded: Decimal,
    },

    #[error("Balance for {user_id} went negative at sequence {sequence}: {balance}")]
    NegativeBalance {
        user_id: String,
        sequence: u64,
        balance: Decimal,
    },

    #[error("Stored balance for {user_id} is {stored}, replay gives {replayed}")]
    StoredBalanceMismatch {
        user_id: String,
        stored: Decimal,
        replayed: Decimal,
    },
}

/// Replay result for one user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayedBalance {
    pub balance: Decimal,
    pub entries: usize,
    pub total_credited: Decimal,
    pub total_debited: Decimal,
    pub total_fees: Decimal,
}

/// Replay entries for any number of users.
///
/// Entries may arrive in any order; they are grouped by user and sorted by sequence.
pub fn replay(entries: &[LedgerEntry]) -> Result<BTreeMap<String, ReplayedBalance>, AuditError> {
    let mut by_user: BTreeMap<&str, Vec<&LedgerEntry>> = BTreeMap::new();
    for entry in entries {
        by_user.entry(entry.user_id.as_str()).or_default().push(entry);
    }

    let mut result = BTreeMap::new();
    for (user_id, mut user_entries) in by_user {
        user_entries.sort_by_key(|e| e.sequence);
        result.insert(user_id.to_string(), replay_user(user_id, &user_entries)?);
    }
    Ok(result)
}

fn replay_user(user_id: &str, entries: &[&LedgerEntry]) -> Result<ReplayedBalance, AuditError> {
    let mut replayed = ReplayedBalance::default();

    for (i, entry) in entries.iter().enumerate() {
        let expected = i as u64 + 1;
        if entry.sequence != expected {
            return Err(AuditError::SequenceGap {
                user_id: user_id.to_string(),
                expected,
                actual: entry.sequence,
            });
        }

        replayed.balance += entry.amount;
        if entry.amount.is_sign_negative() {
            replayed.total_debited += -entry.amount;
        } else {
            replayed.total_credited += entry.amount;
        }
        if let Some(fee) = entry.fee {
            replayed.total_fees += fee.value();
        }
        replayed.entries += 1;

        if replayed.balance < Decimal::ZERO {
            return Err(AuditError::NegativeBalance {
                user_id: user_id.to_string(),
                sequence: entry.sequence,
                balance: replayed.balance,
            });
        }
        if replayed.balance != entry.balance_after.value() {
            return Err(AuditError::SnapshotMismatch {
                user_id: user_id.to_string(),
                sequence: entry.sequence,
                replayed: replayed.balance,
                recorded: entry.balance_after.value(),
            });
        }
    }

    Ok(replayed)
}
