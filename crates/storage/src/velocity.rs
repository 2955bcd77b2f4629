//! `VelocityCounter` on SQLite
//!
//! Every increment runs in a write transaction so it can share one with the
//! engagement event that caused it. Cumulative mode reports the lifetime total in
//! the counter row; windowed mode adds per-minute bucket rows and prunes those
//! older than the window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use growth_pricing::{PricingError, VelocityCounter, VelocityMode, VelocityReading};
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::db::{parse_opt_ts, ts, SqliteStore};
use crate::error::StorageError;

#[derive(Debug, Clone)]
pub struct SqliteVelocity {
    pub(crate) store: SqliteStore,
    mode: VelocityMode,
}

pub(crate) fn units_i64(units: u64) -> i64 {
    i64::try_from(units).unwrap_or(i64::MAX)
}

async fn window_sum(
    conn: &mut SqliteConnection,
    oldest: i64,
    current: i64,
) -> Result<u64, StorageError> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(count), 0) AS total FROM velocity_buckets WHERE minute >= ? AND minute <= ?",
    )
    .bind(oldest)
    .bind(current)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.try_get::<i64, _>("total")?.max(0) as u64)
}

impl SqliteVelocity {
    pub fn new(store: SqliteStore, mode: VelocityMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> VelocityMode {
        self.mode
    }

    /// First and current minute of the window ending at `now`
    fn window_bounds(window_minutes: u32, now: DateTime<Utc>) -> (i64, i64) {
        let current = now.timestamp().div_euclid(60);
        (current - i64::from(window_minutes.max(1)) + 1, current)
    }

    /// Record `units` at `now`; returns the count the mode reports afterwards
    pub async fn increment_at(&self, units: u64, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut tx = self.store.begin_write().await?;
        let count = self.apply(&mut tx, units, now).await?;
        tx.commit().await?;
        Ok(count)
    }

    /// Add `units` inside a write transaction the caller already holds
    pub(crate) async fn apply(
        &self,
        conn: &mut SqliteConnection,
        units: u64,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let row = sqlx::query(
            "UPDATE velocity SET count = count + ?, last_updated = ? WHERE id = 1 RETURNING count",
        )
        .bind(units_i64(units))
        .bind(ts(&now))
        .fetch_one(&mut *conn)
        .await?;
        let lifetime = row.try_get::<i64, _>("count")?.max(0) as u64;

        let VelocityMode::Windowed { window_minutes } = self.mode else {
            return Ok(lifetime);
        };
        let (oldest, current) = Self::window_bounds(window_minutes, now);

        sqlx::query(
            r#"
            INSERT INTO velocity_buckets (minute, count) VALUES (?, ?)
            ON CONFLICT(minute) DO UPDATE SET count = count + excluded.count
            "#,
        )
        .bind(current)
        .bind(units_i64(units))
        .execute(&mut *conn)
        .await?;

        let pruned = sqlx::query("DELETE FROM velocity_buckets WHERE minute < ?")
            .bind(oldest)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        if pruned > 0 {
            debug!(pruned, "Pruned expired velocity buckets");
        }

        window_sum(conn, oldest, current).await
    }

    /// Count the mode reports for a window ending at `now`
    pub async fn count_at(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        match self.mode {
            VelocityMode::Cumulative => {
                let row = sqlx::query("SELECT count FROM velocity WHERE id = 1")
                    .fetch_one(self.store.pool())
                    .await?;
                Ok(row.try_get::<i64, _>("count")?.max(0) as u64)
            }
            VelocityMode::Windowed { window_minutes } => {
                let (oldest, current) = Self::window_bounds(window_minutes, now);
                let mut conn = self.store.pool().acquire().await?;
                window_sum(&mut conn, oldest, current).await
            }
        }
    }

    async fn last_updated(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query("SELECT last_updated FROM velocity WHERE id = 1")
            .fetch_one(self.store.pool())
            .await?;
        parse_opt_ts("last_updated", row.try_get("last_updated")?)
    }
}

#[async_trait]
impl VelocityCounter for SqliteVelocity {
    async fn increment(&self, units: u64) -> Result<u64, PricingError> {
        Ok(self.increment_at(units, Utc::now()).await?)
    }

    async fn read(&self) -> Result<VelocityReading, PricingError> {
        let count = self.count_at(Utc::now()).await?;
        let last_updated = self.last_updated().await?;
        Ok(VelocityReading {
            count,
            last_updated,
        })
    }
}
