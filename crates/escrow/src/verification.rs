//! Proof-of-reach verification
//!
//! A verifier inspects the promoter's proof metrics for a bounty and decides
//! whether the claim is valid and how much it pays.

use async_trait::async_trait;
use growth_core::{round_currency, Credits};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounty::Bounty;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Verifier unavailable: {0}")]
pub struct VerificationError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
    pub payout_amount: Credits,
    /// Why the proof was rejected
    pub reason: Option<String>,
}

impl Verification {
    pub fn approved(payout_amount: Credits) -> Self {
        Self {
            verified: true,
            payout_amount,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            payout_amount: Credits::ZERO,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait VerificationPolicy: Send + Sync {
    fn name(&self) -> &str;

    async fn verify(
        &self,
        proof_metrics: &serde_json::Value,
        bounty: &Bounty,
    ) -> Result<Verification, VerificationError>;
}

/// Reach threshold settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachThreshold {
    /// Field of the proof payload holding the reach count
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Minimum reach for a valid claim
    #[serde(default = "default_min_reach")]
    pub min_reach: u64,

    /// Credits paid per unit of reach
    #[serde(default = "default_payout_per_unit")]
    pub payout_per_unit: Decimal,
}

fn default_metric() -> String {
    "views".to_string()
}

fn default_min_reach() -> u64 {
    1_000
}

fn default_payout_per_unit() -> Decimal {
    Decimal::new(1, 3) // 0.001 per view, 10k views = 10 credits
}

impl Default for ReachThreshold {
    fn default() -> Self {
        Self {
            metric: default_metric(),
            min_reach: default_min_reach(),
            payout_per_unit: default_payout_per_unit(),
        }
    }
}

/// Pays `reach × payout_per_unit` once reach meets the threshold
#[derive(Debug, Clone, Default)]
pub struct ReachThresholdVerifier {
    threshold: ReachThreshold,
}

impl ReachThresholdVerifier {
    pub fn new(threshold: ReachThreshold) -> Self {
        Self { threshold }
    }

    fn reach(&self, proof_metrics: &serde_json::Value) -> Option<u64> {
        let value = proof_metrics.get(&self.threshold.metric)?;
        value
            .as_u64()
            .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
    }
}

#[async_trait]
impl VerificationPolicy for ReachThresholdVerifier {
    fn name(&self) -> &str {
        "ReachThreshold"
    }

    async fn verify(
        &self,
        proof_metrics: &serde_json::Value,
        _bounty: &Bounty,
    ) -> Result<Verification, VerificationError> {
        let Some(reach) = self.reach(proof_metrics) else {
            return Ok(Verification::rejected(format!(
                "proof is missing numeric '{}'",
                self.threshold.metric
            )));
        };
        if reach < self.threshold.min_reach {
            return Ok(Verification::rejected(format!(
                "{} {} below threshold {}",
                self.threshold.metric, reach, self.threshold.min_reach
            )));
        }

        let payout = round_currency(Decimal::from(reach) * self.threshold.payout_per_unit);
        match Credits::positive(payout) {
            Ok(amount) => Ok(Verification::approved(amount)),
            Err(_) => Ok(Verification::rejected("reach earns no payout")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growth_core::Rate;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn bounty() -> Bounty {
        Bounty::new(
            "brandA",
            "music",
            Credits::new(dec!(100)).unwrap(),
            Rate::new(dec!(0.2)).unwrap(),
            "pm",
        )
    }

    #[tokio::test]
    async fn test_reach_above_threshold_pays() {
        let verifier = ReachThresholdVerifier::default();
        let result = verifier.verify(&json!({ "views": 12_345 }), &bounty()).await.unwrap();
        assert!(result.verified);
        assert_eq!(result.payout_amount.value(), dec!(12.35));
    }

    #[tokio::test]
    async fn test_reach_below_threshold_rejected() {
        let verifier = ReachThresholdVerifier::default();
        let result = verifier.verify(&json!({ "views": 999 }), &bounty()).await.unwrap();
        assert!(!result.verified);
        assert!(result.reason.unwrap().contains("below threshold"));
    }

    #[tokio::test]
    async fn test_missing_metric_rejected() {
        let verifier = ReachThresholdVerifier::default();
        let result = verifier.verify(&json!({ "likes": 50_000 }), &bounty()).await.unwrap();
        assert!(!result.verified);

        let result = verifier.verify(&json!({ "views": "lots" }), &bounty()).await.unwrap();
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_custom_metric() {
        let verifier = ReachThresholdVerifier::new(ReachThreshold {
            metric: "shares".to_string(),
            min_reach: 10,
            payout_per_unit: dec!(0.5),
        });
        let result = verifier.verify(&json!({ "shares": 40 }), &bounty()).await.unwrap();
        assert_eq!(result.payout_amount.value(), dec!(20));
    }
}
