//! Bounty store - bounties and claims with atomic pool reservation
//!
//! The claim saga needs three atomic steps from the store:
//! - `reserve`: add the payout to `claimed_amount` if it fits in `net_pool`
//! - `release`: undo a reservation and reject the claim
//! - `approve`: finalize the claim and close the bounty once it is exhausted

use async_trait::async_trait;
use growth_core::{Credits, IdempotencyKey};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::bounty::Bounty;
use crate::claim::{BountyClaim, ClaimStatus};
use crate::error::EscrowError;

/// Outcome of inserting a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimInsert {
    Inserted,
    /// A claim with the same idempotency key already exists
    Existing(BountyClaim),
}

/// Outcome of approving a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub claim: BountyClaim,
    pub bounty: Bounty,
    /// True if this approval closed the bounty
    pub closed_bounty: bool,
}

/// Storage backend for bounties and claims
///
/// Implementations:
/// - `MemoryBountyStore`: single lock, for tests and embedding
/// - `growth_storage::SqliteStore`: SQLite transactions via sqlx
#[async_trait]
pub trait BountyStore: Send + Sync {
    async fn insert_bounty(&self, bounty: &Bounty) -> Result<(), EscrowError>;

    async fn get_bounty(&self, bounty_id: &str) -> Result<Option<Bounty>, EscrowError>;

    /// Bounties funded by `brand_id`, newest first
    async fn bounties_for_brand(&self, brand_id: &str) -> Result<Vec<Bounty>, EscrowError>;

    /// Active bounties, newest first, optionally limited to one niche
    async fn active_bounties(&self, niche: Option<&str>) -> Result<Vec<Bounty>, EscrowError>;

    /// Move an active bounty to closed
    async fn close_bounty(&self, bounty_id: &str) -> Result<Bounty, EscrowError>;

    /// Insert a new claim unless its idempotency key is already taken
    async fn insert_claim(&self, claim: &BountyClaim) -> Result<ClaimInsert, EscrowError>;

    async fn get_claim(&self, claim_id: &str) -> Result<Option<BountyClaim>, EscrowError>;

    async fn claims_for_bounty(&self, bounty_id: &str) -> Result<Vec<BountyClaim>, EscrowError>;

    /// Reserve `amount` of the bounty's pool for a pending claim.
    ///
    /// With `exclusive`, fails if the promoter already holds an approved or reserved
    /// claim on the same bounty.
    async fn reserve(
        &self,
        claim_id: &str,
        amount: Credits,
        exclusive: bool,
    ) -> Result<Bounty, EscrowError>;

    /// Return a reservation to the pool and reject the claim
    async fn release(&self, claim_id: &str, reason: &str) -> Result<Bounty, EscrowError>;

    /// Reject a claim that never reserved anything
    async fn reject_claim(&self, claim_id: &str, reason: &str) -> Result<BountyClaim, EscrowError>;

    /// Approve a reserved claim; closes the bounty when its pool is fully paid out
    async fn approve(
        &self,
        claim_id: &str,
        payment_reference: Option<String>,
        ledger_entry_id: &str,
    ) -> Result<Approval, EscrowError>;
}

/// A pending claim holds a reservation once its payout is set
pub fn is_reserved(claim: &BountyClaim) -> bool {
    claim.status == ClaimStatus::PendingVerification && !claim.payout_amount.is_zero()
}

/// `other` blocks an exclusive reservation for `claim`: same promoter and bounty,
/// already approved or holding a reservation
pub fn competes_with(claim: &BountyClaim, other: &BountyClaim) -> bool {
    other.id != claim.id
        && other.bounty_id == claim.bounty_id
        && other.promoter_id == claim.promoter_id
        && (other.status == ClaimStatus::Approved || is_reserved(other))
}

/// An active bounty closes once fully paid out with no claim still in flight
pub fn settles(bounty: &Bounty, others_reserved: bool) -> bool {
    bounty.is_active() && bounty.is_exhausted() && !others_reserved
}

#[derive(Debug, Default)]
struct State {
    bounties: HashMap<String, Bounty>,
    claims: HashMap<String, BountyClaim>,
    claim_keys: HashMap<IdempotencyKey, String>,
}

impl State {
    fn bounty_mut(&mut self, bounty_id: &str) -> Result<&mut Bounty, EscrowError> {
        self.bounties
            .get_mut(bounty_id)
            .ok_or_else(|| EscrowError::BountyNotFound(bounty_id.to_string()))
    }

    fn claim(&self, claim_id: &str) -> Result<&BountyClaim, EscrowError> {
        self.claims
            .get(claim_id)
            .ok_or_else(|| EscrowError::Storage(format!("claim not found: {}", claim_id)))
    }

    fn claim_mut(&mut self, claim_id: &str) -> Result<&mut BountyClaim, EscrowError> {
        self.claims
            .get_mut(claim_id)
            .ok_or_else(|| EscrowError::Storage(format!("claim not found: {}", claim_id)))
    }
}

fn newest_first(mut bounties: Vec<Bounty>) -> Vec<Bounty> {
    bounties.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    bounties
}

/// In-memory bounty store; one lock keeps bounty and claim updates atomic.
#[derive(Debug, Default)]
pub struct MemoryBountyStore {
    state: RwLock<State>,
}

impl MemoryBountyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BountyStore for MemoryBountyStore {
    async fn insert_bounty(&self, bounty: &Bounty) -> Result<(), EscrowError> {
        let mut state = self.state.write().unwrap();
        if state.bounties.contains_key(&bounty.id) {
            return Err(EscrowError::Storage(format!("duplicate bounty id: {}", bounty.id)));
        }
        state.bounties.insert(bounty.id.clone(), bounty.clone());
        Ok(())
    }

    async fn get_bounty(&self, bounty_id: &str) -> Result<Option<Bounty>, EscrowError> {
        Ok(self.state.read().unwrap().bounties.get(bounty_id).cloned())
    }

    async fn bounties_for_brand(&self, brand_id: &str) -> Result<Vec<Bounty>, EscrowError> {
        let state = self.state.read().unwrap();
        Ok(newest_first(
            state
                .bounties
                .values()
                .filter(|b| b.brand_id == brand_id)
                .cloned()
                .collect(),
        ))
    }

    async fn active_bounties(&self, niche: Option<&str>) -> Result<Vec<Bounty>, EscrowError> {
        let state = self.state.read().unwrap();
        Ok(newest_first(
            state
                .bounties
                .values()
                .filter(|b| b.is_active() && niche.map_or(true, |n| b.niche == n))
                .cloned()
                .collect(),
        ))
    }

    async fn close_bounty(&self, bounty_id: &str) -> Result<Bounty, EscrowError> {
        let mut state = self.state.write().unwrap();
        let bounty = state.bounty_mut(bounty_id)?;
        if !bounty.is_active() {
            return Err(EscrowError::BountyClosed(bounty_id.to_string()));
        }
        bounty.close();
        Ok(bounty.clone())
    }

    async fn insert_claim(&self, claim: &BountyClaim) -> Result<ClaimInsert, EscrowError> {
        let mut state = self.state.write().unwrap();
        if let Some(key) = &claim.idempotency_key {
            if let Some(existing_id) = state.claim_keys.get(key) {
                let existing = state.claim(existing_id)?.clone();
                return Ok(ClaimInsert::Existing(existing));
            }
            state.claim_keys.insert(key.clone(), claim.id.clone());
        }
        state.claims.insert(claim.id.clone(), claim.clone());
        Ok(ClaimInsert::Inserted)
    }

    async fn get_claim(&self, claim_id: &str) -> Result<Option<BountyClaim>, EscrowError> {
        Ok(self.state.read().unwrap().claims.get(claim_id).cloned())
    }

    async fn claims_for_bounty(&self, bounty_id: &str) -> Result<Vec<BountyClaim>, EscrowError> {
        let state = self.state.read().unwrap();
        let mut claims: Vec<BountyClaim> = state
            .claims
            .values()
            .filter(|c| c.bounty_id == bounty_id)
            .cloned()
            .collect();
        claims.sort_by(|a, b| a.claimed_at.cmp(&b.claimed_at));
        Ok(claims)
    }

    async fn reserve(
        &self,
        claim_id: &str,
        amount: Credits,
        exclusive: bool,
    ) -> Result<Bounty, EscrowError> {
        let mut state = self.state.write().unwrap();
        let claim = state.claim(claim_id)?.clone();

        if exclusive && state.claims.values().any(|other| competes_with(&claim, other)) {
            return Err(EscrowError::DuplicateClaim {
                bounty_id: claim.bounty_id.clone(),
                promoter_id: claim.promoter_id.clone(),
            });
        }

        let bounty = state.bounty_mut(&claim.bounty_id)?;
        bounty.reserve(amount)?;
        let bounty = bounty.clone();

        state.claim_mut(claim_id)?.payout_amount = amount;
        Ok(bounty)
    }

    async fn release(&self, claim_id: &str, reason: &str) -> Result<Bounty, EscrowError> {
        let mut state = self.state.write().unwrap();
        let claim = state.claim(claim_id)?.clone();

        let bounty = state.bounty_mut(&claim.bounty_id)?;
        if is_reserved(&claim) {
            bounty.release(claim.payout_amount);
        }
        let bounty = bounty.clone();

        state.claim_mut(claim_id)?.reject(reason);
        Ok(bounty)
    }

    async fn reject_claim(&self, claim_id: &str, reason: &str) -> Result<BountyClaim, EscrowError> {
        let mut state = self.state.write().unwrap();
        let claim = state.claim_mut(claim_id)?;
        claim.reject(reason);
        Ok(claim.clone())
    }

    async fn approve(
        &self,
        claim_id: &str,
        payment_reference: Option<String>,
        ledger_entry_id: &str,
    ) -> Result<Approval, EscrowError> {
        let mut state = self.state.write().unwrap();
        let bounty_id = state.claim(claim_id)?.bounty_id.clone();

        let claim = state.claim_mut(claim_id)?;
        claim.approve(payment_reference, ledger_entry_id.to_string());
        let claim = claim.clone();

        let others_reserved = state
            .claims
            .values()
            .any(|c| c.bounty_id == bounty_id && is_reserved(c));

        let bounty = state.bounty_mut(&bounty_id)?;
        let closed_bounty = settles(bounty, others_reserved);
        if closed_bounty {
            bounty.close();
        }

        Ok(Approval {
            claim,
            bounty: bounty.clone(),
            closed_bounty,
        })
    }
}
