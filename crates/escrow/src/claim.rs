//! Bounty claims

use chrono::{DateTime, Utc};
use growth_core::{Credits, IdempotencyKey};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClaimStatus {
    PendingVerification,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyClaim {
    pub id: String,
    pub bounty_id: String,
    pub promoter_id: String,
    /// Caller-supplied reach evidence, passed through to the verifier
    pub proof_metrics: serde_json::Value,
    /// Set once verification decides the payout
    pub payout_amount: Credits,
    pub status: ClaimStatus,
    pub rejection_reason: Option<String>,
    /// Capture reference from the payment capability
    pub payment_reference: Option<String>,
    /// Ledger entry that credited the promoter
    pub ledger_entry_id: Option<String>,
    pub idempotency_key: Option<IdempotencyKey>,
    pub claimed_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl BountyClaim {
    pub fn new(
        bounty_id: &str,
        promoter_id: &str,
        proof_metrics: serde_json::Value,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bounty_id: bounty_id.to_string(),
            promoter_id: promoter_id.to_string(),
            proof_metrics,
            payout_amount: Credits::ZERO,
            status: ClaimStatus::PendingVerification,
            rejection_reason: None,
            payment_reference: None,
            ledger_entry_id: None,
            idempotency_key,
            claimed_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn approve(&mut self, payment_reference: Option<String>, ledger_entry_id: String) {
        self.status = ClaimStatus::Approved;
        self.payment_reference = payment_reference;
        self.ledger_entry_id = Some(ledger_entry_id);
        self.resolved_at = Some(Utc::now());
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.status = ClaimStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        self.resolved_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claim_lifecycle() {
        let mut claim = BountyClaim::new("b1", "p1", json!({ "views": 12000 }), None);
        assert_eq!(claim.status, ClaimStatus::PendingVerification);

        claim.approve(Some("cap_1".to_string()), "entry-1".to_string());
        assert_eq!(claim.status, ClaimStatus::Approved);
        assert!(claim.resolved_at.is_some());
        assert_eq!(claim.ledger_entry_id.as_deref(), Some("entry-1"));
    }

    #[test]
    fn test_reject_records_reason() {
        let mut claim = BountyClaim::new("b1", "p1", json!({}), None);
        claim.reject("views below threshold");
        assert_eq!(claim.status, ClaimStatus::Rejected);
        assert_eq!(claim.rejection_reason.as_deref(), Some("views below threshold"));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ClaimStatus::PendingVerification).unwrap(),
            "\"pending_verification\""
        );
        assert_eq!(ClaimStatus::Approved.to_string(), "approved");
    }
}
