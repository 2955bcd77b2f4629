//! Pricing errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("Block size must be greater than zero")]
    InvalidBlockSize,

    #[error("Engagement value must be greater than zero")]
    InvalidEngagementValue,

    #[error("Velocity counter unavailable: {0}")]
    Counter(String),
}
