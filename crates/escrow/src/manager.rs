//! Bounty escrow manager - bounty lifecycle and claim payouts
//!
//! A claim touches two aggregates (the bounty pool and the promoter's balance),
//! so it runs as a saga with a compensation path:
//!
//! ```text
//! claim_bounty
//!   │
//!   ├─ verify proof ──────────────► reject claim, VerificationFailed
//!   ├─ reserve payout in pool ────► reject claim, BountyExhausted / BountyClosed
//!   ├─ capture from funding hold ─► release reservation, PaymentFailed / Timeout
//!   ├─ ledger award ──────────────► release reservation, Ledger(..)
//!   └─ approve claim, close bounty when the pool is fully paid out
//! ```
//!
//! External calls (verifier, payment, payout) never run inside a store or
//! ledger critical section and are bounded by `external_timeout_ms`.

use growth_core::{round_currency, Credits, IdempotencyKey};
use growth_ledger::{source, CreditsLedger};
use rust_decimal::Decimal;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::bounty::{Bounty, BountyStatus};
use crate::claim::{BountyClaim, ClaimStatus};
use crate::config::EscrowConfig;
use crate::error::EscrowError;
use crate::payment::{PaymentCapability, PayoutProvider};
use crate::store::{BountyStore, ClaimInsert};
use crate::verification::VerificationPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimResult {
    pub claim_id: String,
    pub bounty_id: String,
    pub promoter_id: String,
    pub payout_amount: Credits,
    pub status: ClaimStatus,
    pub payment_reference: Option<String>,
    /// The bounty is closed after this claim
    pub bounty_closed: bool,
    /// Returned from an earlier call with the same idempotency key
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionResult {
    pub redeemed: Credits,
    pub fee: Credits,
    /// Net amount owed to the creator
    pub payout: Credits,
    pub currency: String,
    pub balance_after: Credits,
    /// Provider reference; `None` if the payout was not sent
    pub payout_reference: Option<String>,
    pub replayed: bool,
}

pub struct BountyEscrow {
    store: Arc<dyn BountyStore>,
    ledger: Arc<CreditsLedger>,
    payments: Arc<dyn PaymentCapability>,
    payouts: Arc<dyn PayoutProvider>,
    verifier: Arc<dyn VerificationPolicy>,
    config: EscrowConfig,
}

impl BountyEscrow {
    pub fn new(
        store: Arc<dyn BountyStore>,
        ledger: Arc<CreditsLedger>,
        payments: Arc<dyn PaymentCapability>,
        payouts: Arc<dyn PayoutProvider>,
        verifier: Arc<dyn VerificationPolicy>,
        config: EscrowConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            payments,
            payouts,
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<CreditsLedger> {
        &self.ledger
    }

    /// Fund a new bounty pool.
    ///
    /// The full amount is authorized (not captured) against `payment_method_ref`;
    /// nothing is persisted if validation or authorization fails.
    pub async fn create_bounty(
        &self,
        brand_id: &str,
        niche: &str,
        total_amount: Decimal,
        payment_method_ref: &str,
    ) -> Result<Bounty, EscrowError> {
        let total = Credits::positive(total_amount)
            .map_err(|_| EscrowError::InvalidAmount(total_amount))?;
        let niche = normalize_niche(niche).ok_or(EscrowError::MissingNiche)?;
        if brand_id.trim().is_empty() {
            return Err(EscrowError::MissingBrand);
        }

        let token = self
            .external(
                "payment authorization",
                self.payments.authorize(payment_method_ref, total),
            )
            .await?
            .map_err(|e| EscrowError::PaymentFailed(e.to_string()))?;

        let bounty = Bounty::new(
            brand_id,
            &niche,
            total,
            self.config.protocol_fee_rate,
            payment_method_ref,
        )
        .with_authorization(token);
        self.store.insert_bounty(&bounty).await?;

        info!(
            bounty_id = %bounty.id,
            brand_id,
            niche = %bounty.niche,
            total_amount = %bounty.total_amount,
            protocol_fee = %bounty.protocol_fee,
            net_pool = %bounty.net_pool,
            "bounty created"
        );
        Ok(bounty)
    }

    /// Legacy block purchase: converts a block size into a bounty amount
    pub async fn purchase_block(
        &self,
        brand_id: &str,
        niche: &str,
        block_size: u64,
        payment_method_ref: &str,
    ) -> Result<Bounty, EscrowError> {
        let amount = round_currency(Decimal::from(block_size) * self.config.block_unit_rate);
        self.create_bounty(brand_id, niche, amount, payment_method_ref)
            .await
    }

    /// Submit a claim against a bounty and pay it out if the proof verifies
    pub async fn claim_bounty(
        &self,
        promoter_id: &str,
        bounty_id: &str,
        proof_metrics: serde_json::Value,
        key: Option<IdempotencyKey>,
    ) -> Result<ClaimResult, EscrowError> {
        let bounty = self
            .store
            .get_bounty(bounty_id)
            .await?
            .ok_or_else(|| EscrowError::BountyNotFound(bounty_id.to_string()))?;

        let claim = BountyClaim::new(bounty_id, promoter_id, proof_metrics, key.clone());
        if let ClaimInsert::Existing(existing) = self.store.insert_claim(&claim).await? {
            return self.replay_claim(existing, promoter_id, bounty_id, key).await;
        }

        if bounty.status == BountyStatus::Closed {
            self.store.reject_claim(&claim.id, "bounty closed").await?;
            return Err(EscrowError::BountyClosed(bounty_id.to_string()));
        }

        // 1. Verify
        let verification = match self
            .external("verification", self.verifier.verify(&claim.proof_metrics, &bounty))
            .await
        {
            Ok(Ok(verification)) => verification,
            Ok(Err(e)) => {
                self.store.reject_claim(&claim.id, &e.to_string()).await?;
                return Err(EscrowError::VerificationFailed(e.to_string()));
            }
            Err(e) => {
                self.store.reject_claim(&claim.id, &e.to_string()).await?;
                return Err(e);
            }
        };
        if !verification.verified {
            let reason = verification
                .reason
                .unwrap_or_else(|| "proof rejected".to_string());
            self.store.reject_claim(&claim.id, &reason).await?;
            info!(claim_id = %claim.id, bounty_id, promoter_id, %reason, "claim rejected");
            return Err(EscrowError::VerificationFailed(reason));
        }
        let payout = verification.payout_amount;

        // 2. Reserve the payout in the pool
        let exclusive = !self.config.allow_repeat_claims;
        if let Err(e) = self.store.reserve(&claim.id, payout, exclusive).await {
            self.store.reject_claim(&claim.id, &e.to_string()).await?;
            return Err(e);
        }

        // 3. Collect the funds from the brand
        let payment_reference = match self.capture_payment(&claim.id, &bounty, payout).await {
            Ok(reference) => reference,
            Err(e) => {
                self.compensate(&claim.id, &e.to_string(), None).await;
                return Err(e);
            }
        };

        // 4. Credit the promoter
        let award = self
            .ledger
            .award(
                promoter_id,
                payout.value(),
                source::BOUNTY_CLAIM,
                Some(IdempotencyKey::new(format!("claim:{}", claim.id))),
            )
            .await;
        let award = match award {
            Ok(award) => award,
            Err(e) => {
                self.compensate(&claim.id, &e.to_string(), payment_reference.as_deref())
                    .await;
                return Err(e.into());
            }
        };

        // 5. Finalize
        let approval = self
            .store
            .approve(&claim.id, payment_reference.clone(), &award.entry_id)
            .await
            .map_err(|e| {
                error!(
                    claim_id = %claim.id,
                    entry_id = %award.entry_id,
                    error = %e,
                    "promoter credited but claim approval failed"
                );
                e
            })?;

        info!(
            claim_id = %claim.id,
            bounty_id,
            promoter_id,
            payout = %payout,
            claimed_amount = %approval.bounty.claimed_amount,
            bounty_closed = approval.closed_bounty,
            "bounty claim approved"
        );

        Ok(ClaimResult {
            claim_id: claim.id,
            bounty_id: bounty_id.to_string(),
            promoter_id: promoter_id.to_string(),
            payout_amount: payout,
            status: ClaimStatus::Approved,
            payment_reference,
            bounty_closed: approval.bounty.status == BountyStatus::Closed,
            replayed: false,
        })
    }

    /// Cash out credits: debit the ledger, then send the net amount through the payout provider.
    ///
    /// A payout failure after the debit commits is logged and reported as
    /// `payout_reference: None`; the debit stands.
    pub async fn redeem_credits(
        &self,
        creator_id: &str,
        credits_to_redeem: Decimal,
        key: Option<IdempotencyKey>,
    ) -> Result<RedemptionResult, EscrowError> {
        let redemption = self.ledger.redeem(creator_id, credits_to_redeem, key).await?;

        let payout_reference = if redemption.replayed || redemption.net_value.is_zero() {
            None
        } else {
            self.send_payout(creator_id, redemption.net_value).await
        };

        Ok(RedemptionResult {
            redeemed: redemption.redeemed,
            fee: redemption.fee,
            payout: redemption.net_value,
            currency: self.config.currency.clone(),
            balance_after: redemption.balance_after,
            payout_reference,
            replayed: redemption.replayed,
        })
    }

    pub async fn bounty(&self, bounty_id: &str) -> Result<Bounty, EscrowError> {
        self.store
            .get_bounty(bounty_id)
            .await?
            .ok_or_else(|| EscrowError::BountyNotFound(bounty_id.to_string()))
    }

    /// Claims submitted against a bounty, oldest first
    pub async fn claims(&self, bounty_id: &str) -> Result<Vec<BountyClaim>, EscrowError> {
        self.store.claims_for_bounty(bounty_id).await
    }

    /// A brand's bounty portfolio, newest first
    pub async fn bounties_for_brand(&self, brand_id: &str) -> Result<Vec<Bounty>, EscrowError> {
        self.store.bounties_for_brand(brand_id).await
    }

    /// Bounty board: active bounties, optionally for one niche
    pub async fn active_bounties(&self, niche: Option<&str>) -> Result<Vec<Bounty>, EscrowError> {
        let niche = niche.and_then(normalize_niche);
        self.store.active_bounties(niche.as_deref()).await
    }

    /// Funder cancellation
    pub async fn close_bounty(&self, bounty_id: &str, brand_id: &str) -> Result<Bounty, EscrowError> {
        let bounty = self.bounty(bounty_id).await?;
        if bounty.brand_id != brand_id {
            return Err(EscrowError::NotBountyOwner {
                bounty_id: bounty_id.to_string(),
                brand_id: brand_id.to_string(),
            });
        }
        let bounty = self.store.close_bounty(bounty_id).await?;
        info!(
            bounty_id,
            brand_id,
            claimed_amount = %bounty.claimed_amount,
            unclaimed = %bounty.remaining(),
            "bounty closed by funder"
        );
        Ok(bounty)
    }

    async fn replay_claim(
        &self,
        existing: BountyClaim,
        promoter_id: &str,
        bounty_id: &str,
        key: Option<IdempotencyKey>,
    ) -> Result<ClaimResult, EscrowError> {
        if existing.promoter_id != promoter_id || existing.bounty_id != bounty_id {
            return Err(EscrowError::IdempotencyConflict(
                key.unwrap_or_else(|| IdempotencyKey::new(existing.id.clone())),
            ));
        }
        if existing.status == ClaimStatus::Rejected {
            return Err(EscrowError::ClaimRejected {
                claim_id: existing.id,
                reason: existing.rejection_reason.unwrap_or_default(),
            });
        }

        let bounty = self.bounty(bounty_id).await?;
        Ok(ClaimResult {
            claim_id: existing.id,
            bounty_id: existing.bounty_id,
            promoter_id: existing.promoter_id,
            payout_amount: existing.payout_amount,
            status: existing.status,
            payment_reference: existing.payment_reference,
            bounty_closed: bounty.status == BountyStatus::Closed,
            replayed: true,
        })
    }

    /// Capture `amount` against the authorization placed when the bounty was funded
    async fn capture_payment(
        &self,
        claim_id: &str,
        bounty: &Bounty,
        amount: Credits,
    ) -> Result<Option<String>, EscrowError> {
        let token = bounty.authorization_token.as_deref().ok_or_else(|| {
            EscrowError::PaymentFailed(format!("bounty {} has no funding authorization", bounty.id))
        })?;

        let receipt = match self
            .external("payment capture", self.payments.capture(token, amount))
            .await
        {
            Ok(result) => result.map_err(|e| EscrowError::PaymentFailed(e.to_string()))?,
            Err(e) => {
                error!(
                    claim_id,
                    bounty_id = %bounty.id,
                    authorization_token = token,
                    amount = %amount,
                    "payment capture timed out; capture state must be reconciled"
                );
                return Err(e);
            }
        };
        if !receipt.success {
            return Err(EscrowError::PaymentFailed(format!(
                "capture of {} against {} declined by {}",
                amount,
                token,
                self.payments.name()
            )));
        }
        Ok(receipt.reference)
    }

    /// Undo a reservation after a failed claim step
    async fn compensate(&self, claim_id: &str, reason: &str, payment_reference: Option<&str>) {
        if let Some(reference) = payment_reference {
            error!(
                claim_id,
                payment_reference = reference,
                reason,
                "payment captured for failed claim; refund required"
            );
        }
        match self.store.release(claim_id, reason).await {
            Ok(bounty) => warn!(
                claim_id,
                bounty_id = %bounty.id,
                claimed_amount = %bounty.claimed_amount,
                reason,
                "claim reservation released"
            ),
            Err(e) => error!(claim_id, error = %e, reason, "failed to release claim reservation"),
        }
    }

    async fn send_payout(&self, creator_id: &str, amount: Credits) -> Option<String> {
        let provider = self.payouts.name();

        match self.external("payout account status", self.payouts.account_status(creator_id)).await {
            Ok(Ok(status)) if status.connected && status.payouts_enabled => {}
            Ok(Ok(status)) => {
                warn!(creator_id, provider, ?status, "payout account not ready; payout skipped");
                return None;
            }
            Ok(Err(e)) => {
                warn!(creator_id, provider, error = %e, "payout account lookup failed");
                return None;
            }
            Err(e) => {
                warn!(creator_id, provider, error = %e, "payout account lookup failed");
                return None;
            }
        }

        match self
            .external(
                "payout",
                self.payouts
                    .create_payout(creator_id, amount, &self.config.currency),
            )
            .await
        {
            Ok(Ok(receipt)) => {
                info!(creator_id, provider, amount = %amount, reference = %receipt.reference, "payout sent");
                Some(receipt.reference)
            }
            Ok(Err(e)) => {
                warn!(creator_id, provider, amount = %amount, error = %e, "payout failed after debit");
                None
            }
            Err(e) => {
                warn!(creator_id, provider, amount = %amount, error = %e, "payout failed after debit");
                None
            }
        }
    }

    /// Bound an external call by the configured timeout
    async fn external<T>(
        &self,
        what: &str,
        call: impl Future<Output = T>,
    ) -> Result<T, EscrowError> {
        tokio::time::timeout(self.config.external_timeout(), call)
            .await
            .map_err(|_| EscrowError::Timeout(what.to_string()))
    }
}

fn normalize_niche(niche: &str) -> Option<String> {
    let niche = niche.trim().to_lowercase();
    (!niche.is_empty()).then_some(niche)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{SandboxPaymentGateway, SandboxPayoutProvider};
    use crate::store::MemoryBountyStore;
    use crate::verification::ReachThresholdVerifier;
    use async_trait::async_trait;
    use growth_ledger::{
        Commit, LedgerEntry, LedgerError, LedgerStore, MemoryLedgerStore, NoOpNotifier, Planner,
        UserCreditBalance,
    };
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        escrow: Arc<BountyEscrow>,
        gateway: Arc<SandboxPaymentGateway>,
        payouts: Arc<SandboxPayoutProvider>,
    }

    fn harness_with(config: EscrowConfig, ledger_store: Arc<dyn LedgerStore>) -> Harness {
        let gateway = Arc::new(SandboxPaymentGateway::new());
        let payouts = Arc::new(SandboxPayoutProvider::new());
        let ledger = Arc::new(CreditsLedger::new(
            ledger_store,
            Arc::new(NoOpNotifier),
            growth_ledger::LedgerConfig {
                backoff_base_ms: 1,
                ..Default::default()
            },
        ));
        let escrow = Arc::new(BountyEscrow::new(
            Arc::new(MemoryBountyStore::new()),
            ledger,
            gateway.clone(),
            payouts.clone(),
            Arc::new(ReachThresholdVerifier::new(config.verification.clone())),
            config,
        ));
        Harness {
            escrow,
            gateway,
            payouts,
        }
    }

    fn harness() -> Harness {
        harness_with(EscrowConfig::default(), Arc::new(MemoryLedgerStore::new()))
    }

    /// Ledger backend that is permanently down
    struct BrokenLedgerStore;

    #[async_trait]
    impl LedgerStore for BrokenLedgerStore {
        async fn transact(
            &self,
            _user_id: &str,
            _key: Option<&IdempotencyKey>,
            _plan: &Planner<'_>,
        ) -> Result<Commit, LedgerError> {
            Err(LedgerError::Storage("disk I/O error".to_string()))
        }

        async fn balance(&self, _user_id: &str) -> Result<Option<UserCreditBalance>, LedgerError> {
            Ok(None)
        }

        async fn entries(&self, _user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
            Ok(Vec::new())
        }

        async fn all_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
            Ok(Vec::new())
        }
    }

    async fn balance(h: &Harness, user: &str) -> Decimal {
        h.escrow.ledger().balance(user).await.unwrap().value()
    }

    #[tokio::test]
    async fn test_create_bounty_applies_protocol_fee() {
        let h = harness();
        let bounty = h
            .escrow
            .create_bounty("brandA", "fashion", dec!(100), "pm_1")
            .await
            .unwrap();

        assert_eq!(bounty.protocol_fee.value(), dec!(20));
        assert_eq!(bounty.net_pool.value(), dec!(80));
        assert_eq!(bounty.claimed_amount, Credits::ZERO);
        assert_eq!(bounty.status, BountyStatus::Active);
        assert!(bounty.authorization_token.is_some());
        // Authorized only; nothing captured until a claim is approved
        assert!(h.gateway.captured().is_empty());
    }

    #[tokio::test]
    async fn test_create_bounty_validation() {
        let h = harness();
        assert_eq!(
            h.escrow.create_bounty("brandA", "music", dec!(0), "pm").await,
            Err(EscrowError::InvalidAmount(dec!(0)))
        );
        assert_eq!(
            h.escrow.create_bounty("brandA", "music", dec!(-5), "pm").await,
            Err(EscrowError::InvalidAmount(dec!(-5)))
        );
        assert_eq!(
            h.escrow.create_bounty("brandA", "  ", dec!(10), "pm").await,
            Err(EscrowError::MissingNiche)
        );
        assert!(h.escrow.bounties_for_brand("brandA").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_bounty_payment_failure_persists_nothing() {
        let h = harness();
        h.gateway.set_fail_authorize(true);
        let result = h.escrow.create_bounty("brandA", "music", dec!(50), "pm").await;
        assert!(matches!(result, Err(EscrowError::PaymentFailed(_))));
        assert!(h.escrow.bounties_for_brand("brandA").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_bounty_payment_timeout() {
        let config = EscrowConfig {
            external_timeout_ms: 20,
            ..Default::default()
        };
        let h = harness_with(config, Arc::new(MemoryLedgerStore::new()));
        h.gateway.set_delay(Duration::from_millis(500));

        let result = h.escrow.create_bounty("brandA", "music", dec!(50), "pm").await;
        assert!(matches!(result, Err(EscrowError::Timeout(_))));
        assert!(h.escrow.active_bounties(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_pays_promoter() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();

        let result = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 20_000 }), None)
            .await
            .unwrap();

        assert_eq!(result.payout_amount.value(), dec!(20));
        assert_eq!(result.status, ClaimStatus::Approved);
        assert!(result.payment_reference.is_some());
        assert!(!result.bounty_closed);
        assert_eq!(balance(&h, "p1").await, dec!(20));

        let bounty = h.escrow.bounty(&bounty.id).await.unwrap();
        assert_eq!(bounty.claimed_amount.value(), dec!(20));
        let token = bounty.authorization_token.clone().unwrap();
        assert_eq!(h.gateway.captured(), vec![(token, Credits::new(dec!(20)).unwrap())]);

        let history = h.escrow.ledger().history("p1").await.unwrap();
        assert_eq!(history[0].source, "bounty_claim");
    }

    #[tokio::test]
    async fn test_claim_exhausting_pool_closes_bounty() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();

        let result = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 80_000 }), None)
            .await
            .unwrap();
        assert!(result.bounty_closed);

        let next = h
            .escrow
            .claim_bounty("p2", &bounty.id, json!({ "views": 5_000 }), None)
            .await;
        assert!(matches!(next, Err(EscrowError::BountyClosed(_))));
        assert!(h.escrow.active_bounties(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_beyond_pool_is_exhausted() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();

        let result = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 90_000 }), None)
            .await;
        assert!(matches!(result, Err(EscrowError::BountyExhausted { .. })));
        assert_eq!(balance(&h, "p1").await, Decimal::ZERO);

        let bounty = h.escrow.bounty(&bounty.id).await.unwrap();
        assert_eq!(bounty.claimed_amount, Credits::ZERO);
        let claims = h.escrow.claims(&bounty.id).await.unwrap();
        assert_eq!(claims[0].status, ClaimStatus::Rejected);
    }

    #[tokio::test]
    async fn test_claim_unknown_bounty() {
        let h = harness();
        let result = h.escrow.claim_bounty("p1", "nope", json!({}), None).await;
        assert_eq!(result, Err(EscrowError::BountyNotFound("nope".to_string())));
    }

    #[tokio::test]
    async fn test_claim_verification_failure() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();

        let result = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 10 }), None)
            .await;
        assert!(matches!(result, Err(EscrowError::VerificationFailed(_))));
        assert_eq!(balance(&h, "p1").await, Decimal::ZERO);

        let claims = h.escrow.claims(&bounty.id).await.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].status, ClaimStatus::Rejected);
    }

    #[tokio::test]
    async fn test_capture_failure_releases_reservation() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();
        h.gateway.set_fail_capture(true);

        let result = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 20_000 }), None)
            .await;
        assert!(matches!(result, Err(EscrowError::PaymentFailed(_))));

        let bounty = h.escrow.bounty(&bounty.id).await.unwrap();
        assert_eq!(bounty.claimed_amount, Credits::ZERO);
        assert!(bounty.is_active());
        assert_eq!(balance(&h, "p1").await, Decimal::ZERO);
        assert_eq!(h.escrow.claims(&bounty.id).await.unwrap()[0].status, ClaimStatus::Rejected);
    }

    #[tokio::test]
    async fn test_claims_capture_against_funding_authorization() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();
        let token = bounty.authorization_token.clone().unwrap();
        assert_eq!(h.gateway.authorizations(), 1);

        for promoter in ["p1", "p2", "p3"] {
            h.escrow
                .claim_bounty(promoter, &bounty.id, json!({ "views": 20_000 }), None)
                .await
                .unwrap();
        }

        // No extra holds: every payout comes out of the creation-time authorization
        assert_eq!(h.gateway.authorizations(), 1);
        let captured = h.gateway.captured();
        assert_eq!(captured.len(), 3);
        assert!(captured.iter().all(|(t, _)| *t == token));
        assert_eq!(h.gateway.captured_total(&token).value(), dec!(60));
    }

    #[tokio::test]
    async fn test_capture_timeout_releases_reservation() {
        let config = EscrowConfig {
            external_timeout_ms: 50,
            ..Default::default()
        };
        let h = harness_with(config, Arc::new(MemoryLedgerStore::new()));
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();
        h.gateway.set_delay(Duration::from_millis(500));

        let result = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 20_000 }), None)
            .await;
        assert!(matches!(result, Err(EscrowError::Timeout(_))));

        let bounty = h.escrow.bounty(&bounty.id).await.unwrap();
        assert_eq!(bounty.claimed_amount, Credits::ZERO);
        assert_eq!(balance(&h, "p1").await, Decimal::ZERO);
        assert_eq!(h.escrow.claims(&bounty.id).await.unwrap()[0].status, ClaimStatus::Rejected);
    }

    #[tokio::test]
    async fn test_ledger_failure_releases_reservation() {
        let h = harness_with(EscrowConfig::default(), Arc::new(BrokenLedgerStore));
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();

        let result = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 20_000 }), None)
            .await;
        assert!(matches!(result, Err(EscrowError::Ledger(LedgerError::Storage(_)))));

        let bounty = h.escrow.bounty(&bounty.id).await.unwrap();
        assert_eq!(bounty.claimed_amount, Credits::ZERO);
        let claim = &h.escrow.claims(&bounty.id).await.unwrap()[0];
        assert_eq!(claim.status, ClaimStatus::Rejected);
    }

    #[tokio::test]
    async fn test_claim_idempotency_key_replays() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();
        let key = IdempotencyKey::new("claim-req-1");

        let first = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 20_000 }), Some(key.clone()))
            .await
            .unwrap();
        let second = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 20_000 }), Some(key.clone()))
            .await
            .unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.claim_id, second.claim_id);
        assert_eq!(balance(&h, "p1").await, dec!(20));
        assert_eq!(h.escrow.bounty(&bounty.id).await.unwrap().claimed_amount.value(), dec!(20));

        let other = h
            .escrow
            .claim_bounty("p2", &bounty.id, json!({ "views": 20_000 }), Some(key))
            .await;
        assert!(matches!(other, Err(EscrowError::IdempotencyConflict(_))));
    }

    #[tokio::test]
    async fn test_rejected_claim_replays_as_rejection() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();
        let key = IdempotencyKey::new("claim-req-2");

        let _ = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 1 }), Some(key.clone()))
            .await;
        let retry = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 1 }), Some(key))
            .await;
        assert!(matches!(retry, Err(EscrowError::ClaimRejected { .. })));
    }

    #[tokio::test]
    async fn test_repeat_claims_policy() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();
        for _ in 0..2 {
            h.escrow
                .claim_bounty("p1", &bounty.id, json!({ "views": 10_000 }), None)
                .await
                .unwrap();
        }
        assert_eq!(balance(&h, "p1").await, dec!(20));

        let strict = harness_with(
            EscrowConfig {
                allow_repeat_claims: false,
                ..Default::default()
            },
            Arc::new(MemoryLedgerStore::new()),
        );
        let bounty = strict.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();
        strict
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 10_000 }), None)
            .await
            .unwrap();
        let second = strict
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 10_000 }), None)
            .await;
        assert!(matches!(second, Err(EscrowError::DuplicateClaim { .. })));
        assert_eq!(balance(&strict, "p1").await, dec!(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_never_overdraw_pool() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let escrow = Arc::clone(&h.escrow);
            let bounty_id = bounty.id.clone();
            handles.push(tokio::spawn(async move {
                escrow
                    .claim_bounty(&format!("p{}", i), &bounty_id, json!({ "views": 10_000 }), None)
                    .await
            }));
        }

        let mut approved = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => approved += 1,
                Err(EscrowError::BountyExhausted { .. }) | Err(EscrowError::BountyClosed(_)) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(approved, 8);
        let bounty = h.escrow.bounty(&bounty.id).await.unwrap();
        assert_eq!(bounty.claimed_amount, bounty.net_pool);
        assert_eq!(bounty.status, BountyStatus::Closed);

        let mut paid = Decimal::ZERO;
        for i in 0..20 {
            paid += balance(&h, &format!("p{}", i)).await;
        }
        assert_eq!(paid, bounty.claimed_amount.value());
    }

    #[tokio::test]
    async fn test_redeem_credits_pays_out_net() {
        let h = harness();
        h.escrow
            .ledger()
            .award("c1", dec!(10), source::ENGAGEMENT_REWARD, None)
            .await
            .unwrap();

        let result = h.escrow.redeem_credits("c1", dec!(10), None).await.unwrap();
        assert_eq!(result.redeemed.value(), dec!(10));
        assert_eq!(result.fee.value(), dec!(1));
        assert_eq!(result.payout.value(), dec!(9));
        assert_eq!(result.currency, "USD");
        assert!(result.payout_reference.is_some());
        assert_eq!(h.payouts.payouts()[0].amount.value(), dec!(9));
    }

    #[tokio::test]
    async fn test_redeem_credits_payout_failure_keeps_debit() {
        let h = harness();
        h.escrow
            .ledger()
            .award("c1", dec!(10), source::ENGAGEMENT_REWARD, None)
            .await
            .unwrap();
        h.payouts.set_fail_payouts(true);

        let result = h.escrow.redeem_credits("c1", dec!(4), None).await.unwrap();
        assert!(result.payout_reference.is_none());
        assert_eq!(balance(&h, "c1").await, dec!(6));
    }

    #[tokio::test]
    async fn test_redeem_credits_insufficient() {
        let h = harness();
        let result = h.escrow.redeem_credits("c1", dec!(5), None).await;
        assert!(matches!(
            result,
            Err(EscrowError::Ledger(LedgerError::InsufficientBalance { .. }))
        ));
        assert!(h.payouts.payouts().is_empty());
    }

    #[tokio::test]
    async fn test_purchase_block_converts_size() {
        let h = harness();
        let bounty = h.escrow.purchase_block("brandA", "crypto", 1000, "pm").await.unwrap();
        assert_eq!(bounty.total_amount.value(), dec!(15));
        assert_eq!(bounty.protocol_fee.value(), dec!(3));
        assert_eq!(bounty.net_pool.value(), dec!(12));

        assert!(matches!(
            h.escrow.purchase_block("brandA", "crypto", 0, "pm").await,
            Err(EscrowError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_board_and_portfolio() {
        let h = harness();
        h.escrow.create_bounty("brandA", "Music", dec!(10), "pm").await.unwrap();
        h.escrow.create_bounty("brandA", "crypto", dec!(20), "pm").await.unwrap();
        h.escrow.create_bounty("brandB", "music", dec!(30), "pm").await.unwrap();

        let portfolio = h.escrow.bounties_for_brand("brandA").await.unwrap();
        assert_eq!(portfolio.len(), 2);
        assert!(portfolio[0].created_at >= portfolio[1].created_at);

        assert_eq!(h.escrow.active_bounties(None).await.unwrap().len(), 3);
        assert_eq!(h.escrow.active_bounties(Some("MUSIC")).await.unwrap().len(), 2);
        assert!(h.escrow.active_bounties(Some("fashion")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_bounty_by_funder_only() {
        let h = harness();
        let bounty = h.escrow.create_bounty("brandA", "music", dec!(100), "pm").await.unwrap();

        assert!(matches!(
            h.escrow.close_bounty(&bounty.id, "brandB").await,
            Err(EscrowError::NotBountyOwner { .. })
        ));

        let closed = h.escrow.close_bounty(&bounty.id, "brandA").await.unwrap();
        assert_eq!(closed.status, BountyStatus::Closed);

        let claim = h
            .escrow
            .claim_bounty("p1", &bounty.id, json!({ "views": 10_000 }), None)
            .await;
        assert!(matches!(claim, Err(EscrowError::BountyClosed(_))));
    }
}
