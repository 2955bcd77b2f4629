//! Application configuration - one JSON file for every service

use growth_escrow::EscrowConfig;
use growth_ledger::LedgerConfig;
use growth_pricing::PricingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Database file created inside `data_dir`
pub const DB_FILE: &str = "growth.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the SQLite database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub escrow: EscrowConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ledger: LedgerConfig::default(),
            pricing: PricingConfig::default(),
            escrow: EscrowConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file; missing sections fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growth_pricing::VelocityMode;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.db_path(), PathBuf::from("./data").join("growth.db"));
        assert_eq!(config.ledger.max_attempts, 3);
        assert_eq!(config.pricing.velocity, VelocityMode::Cumulative);
        assert_eq!(config.escrow.protocol_fee_rate.value(), dec!(0.2));
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("growth.json");
        std::fs::write(
            &path,
            r#"{
                "data_dir": "/var/lib/growth",
                "ledger": { "retention_fee_rate": "0.05" },
                "pricing": { "velocity": { "mode": "windowed", "window_minutes": 60 } }
            }"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/growth"));
        assert_eq!(config.ledger.retention_fee_rate.value(), dec!(0.05));
        assert_eq!(config.ledger.max_attempts, 3);
        assert_eq!(
            config.pricing.velocity,
            VelocityMode::Windowed { window_minutes: 60 }
        );
        assert_eq!(config.escrow.external_timeout_ms, 2000);
    }

    #[test]
    fn test_from_file_invalid_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = AppConfig::from_file(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
