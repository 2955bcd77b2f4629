//! Growth Escrow - viral bounty pools
//!
//! Brands fund a bounty (a protocol fee is taken up front); promoters claim
//! payouts from the net pool by proving reach; creators cash out credits.
//!
//! # Key Types
//! - `BountyEscrow`: create / claim / close bounties, redeem credits
//! - `Bounty`, `BountyClaim`: the escrow aggregates
//! - `BountyStore`: atomic pool reservation (`MemoryBountyStore` here, SQLite in growth-storage)
//! - `PaymentCapability`, `PayoutProvider`, `VerificationPolicy`: external collaborators

pub mod bounty;
pub mod claim;
pub mod config;
pub mod error;
pub mod manager;
pub mod payment;
pub mod store;
pub mod verification;

pub use bounty::{Bounty, BountyStatus};
pub use claim::{BountyClaim, ClaimStatus};
pub use config::EscrowConfig;
pub use error::EscrowError;
pub use manager::{BountyEscrow, ClaimResult, RedemptionResult};
pub use payment::{
    AccountStatus, CaptureReceipt, PaymentCapability, PaymentError, PayoutProvider, PayoutReceipt,
    SandboxPaymentGateway, SandboxPayoutProvider,
};
pub use store::{competes_with, is_reserved, settles, Approval, BountyStore, ClaimInsert, MemoryBountyStore};
pub use verification::{
    ReachThreshold, ReachThresholdVerifier, Verification, VerificationError, VerificationPolicy,
};
