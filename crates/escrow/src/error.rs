//! Escrow errors

use growth_core::IdempotencyKey;
use growth_ledger::LedgerError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    // === Validation ===
    #[error("Invalid amount: {0} (must be greater than zero)")]
    InvalidAmount(Decimal),

    #[error("Bounty niche is required")]
    MissingNiche,

    #[error("Brand id is required")]
    MissingBrand,

    // === Business rules ===
    #[error("Bounty not found: {0}")]
    BountyNotFound(String),

    #[error("Bounty {0} is closed")]
    BountyClosed(String),

    #[error("Bounty {bounty_id} exhausted: requested {requested}, remaining {remaining}")]
    BountyExhausted {
        bounty_id: String,
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Promoter {promoter_id} already has an approved claim on bounty {bounty_id}")]
    DuplicateClaim {
        bounty_id: String,
        promoter_id: String,
    },

    #[error("Claim {claim_id} was rejected: {reason}")]
    ClaimRejected { claim_id: String, reason: String },

    #[error("Bounty {bounty_id} is not owned by {brand_id}")]
    NotBountyOwner { bounty_id: String, brand_id: String },

    #[error("Idempotency key {0} was already used for a different claim")]
    IdempotencyConflict(IdempotencyKey),

    // === External collaborators ===
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("{0} timed out")]
    Timeout(String),

    // === Downstream ===
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EscrowError {
    pub fn exhausted(bounty_id: &str, requested: Decimal, remaining: Decimal) -> Self {
        Self::BountyExhausted {
            bounty_id: bounty_id.to_string(),
            requested,
            remaining,
        }
    }
}
