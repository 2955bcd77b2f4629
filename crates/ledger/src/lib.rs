//! Growth Credits Ledger - per-user balances with an append-only entry log
//!
//! Every balance change goes through `CreditsLedger`. A balance never goes
//! negative and replaying a user's entries always reproduces the stored balance.
//!
//! # Key Types
//! - `CreditsLedger`: award / redeem with retries and idempotency keys
//! - `UserCreditBalance`: one record per user, created lazily on first award
//! - `LedgerEntry`: immutable credit or debit record
//! - `LedgerStore`: atomic per-user storage seam (`MemoryLedgerStore` here, SQLite in growth-storage)
//! - `Notifier`: best-effort award notifications

pub mod audit;
pub mod balance;
pub mod config;
pub mod entry;
pub mod error;
pub mod notifier;
pub mod service;
pub mod store;

pub use audit::{replay, AuditError, ReplayedBalance};
pub use balance::UserCreditBalance;
pub use config::LedgerConfig;
pub use entry::{source, EntryType, LedgerEntry};
pub use error::LedgerError;
pub use notifier::{LogNotifier, NoOpNotifier, Notifier, NotifyError};
pub use service::{AwardResult, CreditsLedger, RedeemResult};
pub use store::{Commit, LedgerStore, MemoryLedgerStore, Mutation, Planner};
