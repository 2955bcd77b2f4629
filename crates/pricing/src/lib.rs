//! Growth Pricing - dynamic engagement block pricing
//!
//! Engagement events feed a shared velocity counter; the pricing engine reads
//! it to apply surge pricing on top of per-niche multipliers.

pub mod config;
pub mod engagement;
pub mod engine;
pub mod error;
pub mod velocity;

pub use config::{PricingConfig, VelocityMode, DEFAULT_NICHE};
pub use engagement::{
    EngagementEvent, EngagementKind, EngagementLog, EngagementMetadata, EngagementStore,
    MemoryEngagementStore,
};
pub use engine::{PriceBreakdown, PriceQuote, PricingEngine};
pub use error::PricingError;
pub use velocity::{
    memory_counter, CumulativeVelocity, VelocityCounter, VelocityReading, WindowedVelocity,
};
