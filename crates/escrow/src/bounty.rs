//! Bounty - brand-funded reward pool
//!
//! `protocol_fee + net_pool == total_amount` is fixed at creation;
//! `claimed_amount <= net_pool` holds for the whole lifetime.

use chrono::{DateTime, Utc};
use growth_core::{Credits, Rate};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::error::EscrowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BountyStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounty {
    pub id: String,
    /// Funding brand
    pub brand_id: String,
    pub niche: String,
    pub total_amount: Credits,
    pub protocol_fee: Credits,
    pub net_pool: Credits,
    pub status: BountyStatus,
    /// Running sum of approved and reserved payouts
    pub claimed_amount: Credits,
    /// Opaque funding reference from the payment capability
    pub payment_method_ref: String,
    /// Token returned when the full amount was authorized
    pub authorization_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Bounty {
    /// New active bounty with the protocol fee split off the total
    pub fn new(
        brand_id: &str,
        niche: &str,
        total_amount: Credits,
        fee_rate: Rate,
        payment_method_ref: &str,
    ) -> Self {
        let (protocol_fee, net_pool) = fee_rate.split(total_amount);
        Self {
            id: Uuid::new_v4().to_string(),
            brand_id: brand_id.to_string(),
            niche: niche.to_string(),
            total_amount,
            protocol_fee,
            net_pool,
            status: BountyStatus::Active,
            claimed_amount: Credits::ZERO,
            payment_method_ref: payment_method_ref.to_string(),
            authorization_token: None,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn with_authorization(mut self, token: impl Into<String>) -> Self {
        self.authorization_token = Some(token.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == BountyStatus::Active
    }

    /// Pool still available for claims
    pub fn remaining(&self) -> Credits {
        self.net_pool.saturating_sub(&self.claimed_amount)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Add `amount` to the claimed total if the pool can cover it
    pub fn reserve(&mut self, amount: Credits) -> Result<(), EscrowError> {
        if !self.is_active() {
            return Err(EscrowError::BountyClosed(self.id.clone()));
        }
        let remaining = self.remaining();
        if amount > remaining {
            return Err(EscrowError::exhausted(&self.id, amount.value(), remaining.value()));
        }
        self.claimed_amount = self
            .claimed_amount
            .checked_add(&amount)
            .ok_or(EscrowError::InvalidAmount(amount.value()))?;
        Ok(())
    }

    /// Hand a reservation back to the pool
    pub fn release(&mut self, amount: Credits) {
        self.claimed_amount = self.claimed_amount.saturating_sub(&amount);
    }

    pub fn close(&mut self) {
        if self.is_active() {
            self.status = BountyStatus::Closed;
            self.closed_at = Some(Utc::now());
        }
    }
}
