//! Application context - wires everything together

use growth_escrow::{
    BountyEscrow, ReachThresholdVerifier, SandboxPaymentGateway, SandboxPayoutProvider,
};
use growth_ledger::{CreditsLedger, LogNotifier};
use growth_pricing::{EngagementLog, PricingEngine, VelocityCounter};
use growth_storage::SqliteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;

/// Application context - one SQLite database behind every service
pub struct AppContext {
    pub ledger: Arc<CreditsLedger>,
    pub pricing: PricingEngine,
    pub engagement: EngagementLog,
    pub escrow: BountyEscrow,
    /// Card gateway used for bounty funding
    pub payments: Arc<SandboxPaymentGateway>,
    /// Provider used for creator cash-outs
    pub payouts: Arc<SandboxPayoutProvider>,
    store: SqliteStore,
    config: AppConfig,
}

impl AppContext {
    /// Open the data directory with default configuration
    pub async fn new(data_path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        Self::with_config(AppConfig::default().with_data_dir(data_path.as_ref())).await
    }

    pub async fn with_config(config: AppConfig) -> Result<Self, anyhow::Error> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = SqliteStore::open(config.db_path()).await?;
        let shared = Arc::new(store.clone());

        let ledger = Arc::new(CreditsLedger::new(
            shared.clone(),
            Arc::new(LogNotifier),
            config.ledger.clone(),
        ));

        let velocity: Arc<dyn VelocityCounter> = Arc::new(store.velocity(config.pricing.velocity));
        let pricing = PricingEngine::new(velocity, config.pricing.clone());
        let engagement = EngagementLog::new(Arc::new(store.velocity(config.pricing.velocity)));

        let payments = Arc::new(SandboxPaymentGateway::new());
        let payouts = Arc::new(SandboxPayoutProvider::new());
        let escrow = BountyEscrow::new(
            shared,
            ledger.clone(),
            payments.clone(),
            payouts.clone(),
            Arc::new(ReachThresholdVerifier::new(config.escrow.verification.clone())),
            config.escrow.clone(),
        );

        info!(data_dir = %config.data_dir.display(), "Growth context ready");

        Ok(Self {
            ledger,
            pricing,
            engagement,
            escrow,
            payments,
            payouts,
            store,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Path of the SQLite database
    pub fn db_path(&self) -> PathBuf {
        self.config.db_path()
    }
}
