//! Growth Storage - SQLite persistence via sqlx
//!
//! # Key Types
//! - `SqliteStore`: one pool, implements `LedgerStore` and `BountyStore`
//! - `SqliteVelocity`: persistent `VelocityCounter` (cumulative or windowed) and
//!   `EngagementStore` writing each event with its velocity increment
//! - `StorageError`: database and decode failures, mapped into the domain errors

pub mod db;
pub mod engagement;
pub mod error;
pub mod escrow;
pub mod ledger;
pub mod velocity;

pub use db::SqliteStore;
pub use error::StorageError;
pub use velocity::SqliteVelocity;
