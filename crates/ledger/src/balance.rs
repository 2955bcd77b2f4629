//! Per-user growth credit balance

use chrono::{DateTime, Utc};
use growth_core::Credits;
use serde::{Deserialize, Serialize};

/// Balance record for one user.
///
/// Created lazily by the first award and never deleted. Only the ledger service mutates it,
/// always in the same atomic unit as the ledger entry describing the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreditBalance {
    pub user_id: String,
    pub growth_credits: Credits,
    /// Sequence of the last ledger entry applied to this balance (0 = none)
    pub last_sequence: u64,
    pub last_awarded_at: Option<DateTime<Utc>>,
    pub last_redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserCreditBalance {
    /// A fresh zero balance
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            growth_credits: Credits::ZERO,
            last_sequence: 0,
            last_awarded_at: None,
            last_redeemed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Explicit lazy initialization: the stored record, or a new zero balance.
    pub fn get_or_create(existing: Option<UserCreditBalance>, user_id: &str) -> Self {
        existing.unwrap_or_else(|| Self::new(user_id))
    }

    pub fn next_sequence(&self) -> u64 {
        self.last_sequence + 1
    }
}
