//! Ledger errors

use growth_core::IdempotencyKey;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::audit::AuditError;

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // === Validation ===
    #[error("Invalid amount: {0} (must be greater than zero)")]
    InvalidAmount(Decimal),

    #[error("Source tag cannot be empty")]
    EmptySource,

    // === Business rules ===
    #[error("Insufficient balance for {user_id}: available {available}, required {required}")]
    InsufficientBalance {
        user_id: String,
        available: Decimal,
        required: Decimal,
    },

    #[error("Idempotency key {0} was already used for a different operation")]
    IdempotencyConflict(IdempotencyKey),

    // === Storage ===
    /// Transient conflict with a concurrent writer; retried by the service.
    #[error("Storage contention: {0}")]
    Contention(String),

    #[error("Ledger unavailable after {attempts} attempts: {reason}")]
    LedgerUnavailable { attempts: u32, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    // === Audit ===
    #[error("Audit failed: {0}")]
    Audit(#[from] AuditError),
}

impl LedgerError {
    /// Create insufficient balance error
    pub fn insufficient(user_id: &str, available: Decimal, required: Decimal) -> Self {
        Self::InsufficientBalance {
            user_id: user_id.to_string(),
            available,
            required,
        }
    }

    /// Whether the failure is worth retrying internally
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}
