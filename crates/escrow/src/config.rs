//! Escrow configuration

use growth_core::Rate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::verification::ReachThreshold;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// House take when a bounty is funded
    #[serde(default = "default_protocol_fee_rate")]
    pub protocol_fee_rate: Rate,

    /// Timeout for payment, payout and verification calls
    #[serde(default = "default_external_timeout_ms")]
    pub external_timeout_ms: u64,

    /// Whether a promoter may hold more than one approved claim per bounty
    #[serde(default = "default_allow_repeat_claims")]
    pub allow_repeat_claims: bool,

    /// Bounty amount per engagement unit when converting a legacy block purchase
    #[serde(default = "default_block_unit_rate")]
    pub block_unit_rate: Decimal,

    /// Currency used for payouts
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub verification: ReachThreshold,
}

fn default_protocol_fee_rate() -> Rate {
    Rate::new(Decimal::new(20, 2)).unwrap_or(Rate::ZERO)
}

fn default_external_timeout_ms() -> u64 {
    2_000
}

fn default_allow_repeat_claims() -> bool {
    true
}

fn default_block_unit_rate() -> Decimal {
    Decimal::new(15, 3) // 1.5 per 100 units
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            protocol_fee_rate: default_protocol_fee_rate(),
            external_timeout_ms: default_external_timeout_ms(),
            allow_repeat_claims: default_allow_repeat_claims(),
            block_unit_rate: default_block_unit_rate(),
            currency: default_currency(),
            verification: ReachThreshold::default(),
        }
    }
}

impl EscrowConfig {
    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }
}
