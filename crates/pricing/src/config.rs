//! Pricing configuration
//!
//! Constants of the block price formula, tunable without recompilation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of the fallback entry in `niche_multipliers`
pub const DEFAULT_NICHE: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Price of one engagement unit before multipliers
    #[serde(default = "default_base_price_per_unit")]
    pub base_price_per_unit: Decimal,

    /// Velocity above which surge pricing kicks in
    #[serde(default = "default_surge_threshold")]
    pub surge_threshold: u64,

    /// Weight of `log10(velocity - threshold)` in the surge multiplier
    #[serde(default = "default_surge_factor")]
    pub surge_factor: Decimal,

    /// Per-niche multiplier; unknown niches use the `default` entry
    #[serde(default = "default_niche_multipliers")]
    pub niche_multipliers: BTreeMap<String, Decimal>,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Block size used when the caller does not give one
    #[serde(default = "default_block_size")]
    pub default_block_size: u64,

    #[serde(default)]
    pub velocity: VelocityMode,
}

/// How the velocity counter measures engagement volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VelocityMode {
    /// Never decays; every unit ever recorded counts
    #[default]
    Cumulative,

    /// Only units recorded in the trailing window count
    Windowed { window_minutes: u32 },
}

fn default_base_price_per_unit() -> Decimal {
    Decimal::new(1, 2) // $0.01
}

fn default_surge_threshold() -> u64 {
    500
}

fn default_surge_factor() -> Decimal {
    Decimal::new(5, 1)
}

fn default_niche_multipliers() -> BTreeMap<String, Decimal> {
    BTreeMap::from([
        ("music".to_string(), Decimal::from(2)),
        ("fashion".to_string(), Decimal::from(3)),
        ("crypto".to_string(), Decimal::from(5)),
        (DEFAULT_NICHE.to_string(), Decimal::ONE),
    ])
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_block_size() -> u64 {
    1000
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_price_per_unit: default_base_price_per_unit(),
            surge_threshold: default_surge_threshold(),
            surge_factor: default_surge_factor(),
            niche_multipliers: default_niche_multipliers(),
            currency: default_currency(),
            default_block_size: default_block_size(),
            velocity: VelocityMode::default(),
        }
    }
}

impl PricingConfig {
    /// Multiplier for `niche`, falling back to the `default` entry (or 1)
    pub fn niche_multiplier(&self, niche: &str) -> Decimal {
        let key = niche.trim().to_lowercase();
        self.niche_multipliers
            .get(&key)
            .or_else(|| self.niche_multipliers.get(DEFAULT_NICHE))
            .copied()
            .unwrap_or(Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = PricingConfig::default();
        assert_eq!(config.base_price_per_unit, dec!(0.01));
        assert_eq!(config.surge_threshold, 500);
        assert_eq!(config.surge_factor, dec!(0.5));
        assert_eq!(config.currency, "USD");
        assert_eq!(config.velocity, VelocityMode::Cumulative);
    }

    #[test]
    fn test_niche_lookup() {
        let config = PricingConfig::default();
        assert_eq!(config.niche_multiplier("crypto"), dec!(5));
        assert_eq!(config.niche_multiplier(" Music "), dec!(2));
        assert_eq!(config.niche_multiplier("tech"), dec!(1));
        assert_eq!(config.niche_multiplier("default"), dec!(1));
    }

    #[test]
    fn test_windowed_mode_from_json() {
        let json = r#"{ "velocity": { "mode": "windowed", "window_minutes": 15 }, "surge_threshold": 100 }"#;
        let config: PricingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.velocity, VelocityMode::Windowed { window_minutes: 15 });
        assert_eq!(config.surge_threshold, 100);
        assert_eq!(config.niche_multipliers.len(), 4);
    }
}
