//! SQLite connection pool and schema
//!
//! One `SqliteStore` backs the ledger, the escrow, the velocity counter and the
//! engagement log.
//! Decimals are stored as TEXT and timestamps as fixed-width RFC 3339 TEXT so
//! that lexical order matches time order.

use chrono::{DateTime, SecondsFormat, Utc};
use growth_core::Credits;
use growth_pricing::VelocityMode;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::StorageError;
use crate::velocity::SqliteVelocity;

/// How long a connection waits on the write lock before reporting SQLITE_BUSY
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTIONS: u32 = 8;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS write_lock (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        holder INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    INSERT OR IGNORE INTO write_lock (id) VALUES (1)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS balances (
        user_id TEXT PRIMARY KEY,
        growth_credits TEXT NOT NULL DEFAULT '0',
        last_sequence INTEGER NOT NULL DEFAULT 0,
        last_awarded_at TEXT,
        last_redeemed_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        amount TEXT NOT NULL,
        entry_type TEXT NOT NULL,
        source TEXT NOT NULL,
        fee TEXT,
        net_value TEXT,
        balance_after TEXT NOT NULL,
        idempotency_key TEXT,
        timestamp TEXT NOT NULL,
        UNIQUE (user_id, sequence)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_ledger_entries_user_time
    ON ledger_entries(user_id, timestamp)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS idempotency_keys (
        key TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        entry_id TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bounties (
        id TEXT PRIMARY KEY,
        brand_id TEXT NOT NULL,
        niche TEXT NOT NULL,
        total_amount TEXT NOT NULL,
        protocol_fee TEXT NOT NULL,
        net_pool TEXT NOT NULL,
        status TEXT NOT NULL,
        claimed_amount TEXT NOT NULL DEFAULT '0',
        payment_method_ref TEXT NOT NULL,
        authorization_token TEXT,
        created_at TEXT NOT NULL,
        closed_at TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_bounties_brand
    ON bounties(brand_id, created_at)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_bounties_status_niche
    ON bounties(status, niche)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bounty_claims (
        id TEXT PRIMARY KEY,
        bounty_id TEXT NOT NULL,
        promoter_id TEXT NOT NULL,
        proof_metrics TEXT NOT NULL,
        payout_amount TEXT NOT NULL DEFAULT '0',
        status TEXT NOT NULL,
        rejection_reason TEXT,
        payment_reference TEXT,
        ledger_entry_id TEXT,
        idempotency_key TEXT UNIQUE,
        claimed_at TEXT NOT NULL,
        resolved_at TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_bounty_claims_bounty
    ON bounty_claims(bounty_id, promoter_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS velocity (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        count INTEGER NOT NULL DEFAULT 0,
        last_updated TEXT
    )
    "#,
    r#"
    INSERT OR IGNORE INTO velocity (id) VALUES (1)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS velocity_buckets (
        minute INTEGER PRIMARY KEY,
        count INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS engagement_events (
        id TEXT PRIMARY KEY,
        creator_id TEXT NOT NULL,
        content_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        value INTEGER NOT NULL,
        niche TEXT NOT NULL,
        is_sponsored INTEGER NOT NULL DEFAULT 0,
        brand TEXT,
        timestamp TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_engagement_events_time
    ON engagement_events(timestamp)
    "#,
];

/// SQLite-backed store for balances, ledger entries, bounties, claims and velocity
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        info!(path = %db_path.as_ref().display(), "Opened growth database");
        Ok(store)
    }

    /// Private in-memory database (for testing).
    ///
    /// Every SQLite connection to `:memory:` is a separate database, so the pool
    /// keeps exactly one connection alive forever.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Create tables and indexes if missing
    pub async fn init(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Velocity counter persisted in this database
    pub fn velocity(&self, mode: VelocityMode) -> SqliteVelocity {
        SqliteVelocity::new(self.clone(), mode)
    }

    /// Start a transaction that already holds the database write lock.
    ///
    /// Taking the lock with the first statement means a later read-then-write can
    /// never fail with a stale snapshot; waiting writers queue on `busy_timeout`.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE write_lock SET holder = holder WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn opt_ts(at: &Option<DateTime<Utc>>) -> Option<String> {
    at.as_ref().map(ts)
}

pub(crate) fn parse_ts(field: &'static str, value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

pub(crate) fn parse_opt_ts(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StorageError> {
    value.map(|v| parse_ts(field, &v)).transpose()
}

pub(crate) fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(value).map_err(|_| StorageError::invalid_decimal(field, value))
}

pub(crate) fn parse_credits(field: &'static str, value: &str) -> Result<Credits, StorageError> {
    let decimal = parse_decimal(field, value)?;
    Credits::new(decimal).map_err(|_| StorageError::invalid_decimal(field, value))
}

pub(crate) fn parse_opt_credits(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<Credits>, StorageError> {
    value.map(|v| parse_credits(field, &v)).transpose()
}
