//! Growth CLI - Main entry point

use clap::{Parser, Subcommand};
use growth_ledger::source;
use growth_pricing::{EngagementKind, EngagementMetadata};
use growth_rpc::{commands, AppConfig, AppContext};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "growth")]
#[command(about = "Growth - credits ledger, dynamic pricing and bounty escrow", long_about = None)]
struct Cli {
    /// Data directory path (overrides the config file)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Award growth credits to a user
    Award {
        /// User ID
        user: String,
        /// Amount of credits
        amount: Decimal,
        /// Provenance tag
        #[arg(long, default_value = source::ENGAGEMENT_REWARD)]
        source: String,
        /// Optional idempotency key
        #[arg(long)]
        key: Option<String>,
    },

    /// Redeem credits from a user's balance
    Redeem {
        /// User ID
        user: String,
        /// Amount of credits
        amount: Decimal,
        /// Optional idempotency key
        #[arg(long)]
        key: Option<String>,
    },

    /// Check balance for a user
    Balance {
        /// User ID
        user: String,
    },

    /// Show a user's ledger entries
    History {
        /// User ID
        user: String,
        /// Maximum number of entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Audit the ledger (replay entries against stored balances)
    Audit {
        /// Only verify one user
        #[arg(long)]
        user: Option<String>,
    },

    /// Record an engagement event
    Engage {
        /// Creator ID
        creator: String,
        /// Content ID
        content: String,
        /// like, share, click, watch_time or other
        #[arg(long, default_value = "like")]
        kind: EngagementKind,
        /// Weighted units
        #[arg(long, default_value = "1")]
        value: u64,
        /// Content niche
        #[arg(long)]
        niche: Option<String>,
        /// Sponsored content
        #[arg(long)]
        sponsored: bool,
        /// Sponsoring brand
        #[arg(long)]
        brand: Option<String>,
    },

    /// Show recent engagement events
    Engagements {
        /// Maximum number of events to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Quote an engagement block price
    Price {
        /// Content niche
        niche: String,
        /// Block size in units (config default if omitted)
        #[arg(long)]
        size: Option<u64>,
    },

    /// Fund a new bounty
    CreateBounty {
        /// Brand ID
        brand: String,
        /// Target niche
        niche: String,
        /// Total amount (protocol fee included)
        amount: Decimal,
        /// Payment method reference
        #[arg(long, default_value = "pm_card_sandbox")]
        payment_method: String,
    },

    /// Claim a payout from a bounty
    ClaimBounty {
        /// Promoter ID
        promoter: String,
        /// Bounty ID
        bounty: String,
        /// Reach metrics as JSON, e.g. '{"views": 12000}'
        #[arg(long)]
        proof: String,
        /// Optional idempotency key
        #[arg(long)]
        key: Option<String>,
    },

    /// Close a bounty (funder only)
    CloseBounty {
        /// Bounty ID
        bounty: String,
        /// Funding brand ID
        brand: String,
    },

    /// List bounties: a brand's portfolio or the active board
    Bounties {
        /// Show every bounty funded by this brand
        #[arg(long)]
        brand: Option<String>,
        /// Filter the active board by niche
        #[arg(long)]
        niche: Option<String>,
    },

    /// Purchase a legacy engagement block
    PurchaseBlock {
        /// Brand ID
        brand: String,
        /// Target niche
        niche: String,
        /// Block size in units
        size: u64,
        /// Payment method reference
        #[arg(long, default_value = "pm_card_sandbox")]
        payment_method: String,
    },

    /// Cash out credits through the payout provider
    RedeemCredits {
        /// Creator ID
        creator: String,
        /// Amount of credits
        amount: Decimal,
        /// Optional idempotency key
        #[arg(long)]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(data) = cli.data {
        config = config.with_data_dir(data);
    }

    let ctx = AppContext::with_config(config).await?;

    match cli.command {
        Commands::Award {
            user,
            amount,
            source,
            key,
        } => {
            commands::award(&ctx, &user, amount, &source, key.as_deref()).await?;
        }

        Commands::Redeem { user, amount, key } => {
            commands::redeem(&ctx, &user, amount, key.as_deref()).await?;
        }

        Commands::Balance { user } => {
            commands::balance(&ctx, &user).await?;
        }

        Commands::History { user, limit } => {
            commands::history(&ctx, &user, limit).await?;
        }

        Commands::Audit { user } => {
            commands::audit(&ctx, user.as_deref()).await?;
        }

        Commands::Engage {
            creator,
            content,
            kind,
            value,
            niche,
            sponsored,
            brand,
        } => {
            let metadata = EngagementMetadata {
                niche,
                is_sponsored: sponsored,
                brand,
            };
            commands::engage(&ctx, &creator, &content, kind, value, metadata).await?;
        }

        Commands::Engagements { limit } => {
            commands::engagements(&ctx, limit).await?;
        }

        Commands::Price { niche, size } => {
            commands::price(&ctx, &niche, size).await?;
        }

        Commands::CreateBounty {
            brand,
            niche,
            amount,
            payment_method,
        } => {
            commands::create_bounty(&ctx, &brand, &niche, amount, &payment_method).await?;
        }

        Commands::ClaimBounty {
            promoter,
            bounty,
            proof,
            key,
        } => {
            commands::claim_bounty(&ctx, &promoter, &bounty, &proof, key.as_deref()).await?;
        }

        Commands::CloseBounty { bounty, brand } => {
            commands::close_bounty(&ctx, &bounty, &brand).await?;
        }

        Commands::Bounties { brand, niche } => {
            commands::bounties(&ctx, brand.as_deref(), niche.as_deref()).await?;
        }

        Commands::PurchaseBlock {
            brand,
            niche,
            size,
            payment_method,
        } => {
            commands::purchase_block(&ctx, &brand, &niche, size, &payment_method).await?;
        }

        Commands::RedeemCredits {
            creator,
            amount,
            key,
        } => {
            commands::redeem_credits(&ctx, &creator, amount, key.as_deref()).await?;
        }
    }

    Ok(())
}
