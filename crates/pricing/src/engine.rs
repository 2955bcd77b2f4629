//! Pricing engine - engagement block price from velocity and niche
//!
//! ```text
//! price = block_size × base_price_per_unit × surge × niche
//!
//! surge = 1                                      if v <= threshold
//!       = 1 + log10(v - threshold) × surge_factor otherwise
//! ```
//!
//! All arithmetic is decimal; the final price is rounded to cents.

use growth_core::round_currency;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::PricingConfig;
use crate::error::PricingError;
use crate::velocity::VelocityCounter;

/// Decimal places kept for multipliers shown in a breakdown
const MULTIPLIER_DP: u32 = 4;

/// How a price was derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// `block_size × base_price_per_unit`, before multipliers
    pub base: Decimal,
    pub surge_multiplier: Decimal,
    pub niche_multiplier: Decimal,
    pub price_per_unit: Decimal,
    /// Velocity reading the quote was computed from
    pub velocity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub niche: String,
    pub block_size: u64,
    pub price: Decimal,
    pub breakdown: PriceBreakdown,
    pub currency: String,
}

/// Quotes engagement block prices. Holds no mutable state of its own.
pub struct PricingEngine {
    velocity: Arc<dyn VelocityCounter>,
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(velocity: Arc<dyn VelocityCounter>, config: PricingConfig) -> Self {
        Self { velocity, config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn velocity(&self) -> &Arc<dyn VelocityCounter> {
        &self.velocity
    }

    /// Quote a block at the current velocity
    pub async fn calculate_block_price(
        &self,
        niche: &str,
        block_size: u64,
    ) -> Result<PriceQuote, PricingError> {
        let reading = self.velocity.read().await?;
        let quote = self.quote(niche, block_size, reading.count)?;
        debug!(
            niche,
            block_size,
            velocity = reading.count,
            price = %quote.price,
            "block price quoted"
        );
        Ok(quote)
    }

    /// Quote a block at an explicit velocity
    pub fn quote(
        &self,
        niche: &str,
        block_size: u64,
        velocity: u64,
    ) -> Result<PriceQuote, PricingError> {
        if block_size == 0 {
            return Err(PricingError::InvalidBlockSize);
        }

        let units = Decimal::from(block_size);
        let base = units * self.config.base_price_per_unit;
        let surge = self.surge_multiplier(velocity);
        let niche_multiplier = self.config.niche_multiplier(niche);
        let price = round_currency(base * surge * niche_multiplier);

        Ok(PriceQuote {
            niche: niche.to_string(),
            block_size,
            price,
            breakdown: PriceBreakdown {
                base: round_currency(base),
                surge_multiplier: surge.round_dp(MULTIPLIER_DP),
                niche_multiplier,
                price_per_unit: (price / units).round_dp(MULTIPLIER_DP),
                velocity,
            },
            currency: self.config.currency.clone(),
        })
    }

    /// 1 at or below the threshold, then grows with log10 of the excess
    pub fn surge_multiplier(&self, velocity: u64) -> Decimal {
        if velocity <= self.config.surge_threshold {
            return Decimal::ONE;
        }
        let excess = Decimal::from(velocity - self.config.surge_threshold);
        Decimal::ONE + excess.log10() * self.config.surge_factor
    }
}
