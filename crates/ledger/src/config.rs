//! Ledger configuration
//!
//! Every threshold has a serde default so a partial JSON file is enough.

use growth_core::Rate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Platform cut taken on redemption
    #[serde(default = "default_retention_fee_rate")]
    pub retention_fee_rate: Rate,

    /// Attempts (including the first) before surfacing `LedgerUnavailable`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on each retry
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Awards strictly above this amount trigger a notification
    #[serde(default = "default_notify_threshold")]
    pub notify_threshold: Decimal,

    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
}

fn default_retention_fee_rate() -> Rate {
    Rate::new(Decimal::new(10, 2)).unwrap_or(Rate::ZERO)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    25
}

fn default_notify_threshold() -> Decimal {
    Decimal::ONE
}

fn default_notify_timeout_ms() -> u64 {
    500
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retention_fee_rate: default_retention_fee_rate(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            notify_threshold: default_notify_threshold(),
            notify_timeout_ms: default_notify_timeout_ms(),
        }
    }
}

impl LedgerConfig {
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    /// Backoff before retry number `attempt` (1-based), without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}
