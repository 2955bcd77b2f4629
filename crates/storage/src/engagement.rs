//! `EngagementStore` on SQLite
//!
//! The event row and the velocity increment it drives commit together.

use async_trait::async_trait;
use growth_pricing::{EngagementEvent, EngagementKind, EngagementStore, PricingError};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::{parse_ts, ts};
use crate::error::StorageError;
use crate::velocity::{units_i64, SqliteVelocity};

fn event_from_row(row: &SqliteRow) -> Result<EngagementEvent, StorageError> {
    let kind: String = row.try_get("kind")?;
    let timestamp: String = row.try_get("timestamp")?;
    Ok(EngagementEvent {
        id: row.try_get("id")?,
        creator_id: row.try_get("creator_id")?,
        content_id: row.try_get("content_id")?,
        kind: kind
            .parse::<EngagementKind>()
            .map_err(|_| StorageError::invalid_enum("kind", kind.as_str()))?,
        value: row.try_get::<i64, _>("value")?.max(0) as u64,
        niche: row.try_get("niche")?,
        is_sponsored: row.try_get("is_sponsored")?,
        brand: row.try_get("brand")?,
        timestamp: parse_ts("timestamp", &timestamp)?,
    })
}

impl SqliteVelocity {
    /// Store `event` and add its value to velocity in one transaction
    pub async fn record_event(&self, event: &EngagementEvent) -> Result<u64, StorageError> {
        let mut tx = self.store.begin_write().await?;

        sqlx::query(
            r#"
            INSERT INTO engagement_events
                (id, creator_id, content_id, kind, value, niche, is_sponsored, brand, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.creator_id)
        .bind(&event.content_id)
        .bind(event.kind.to_string())
        .bind(units_i64(event.value))
        .bind(&event.niche)
        .bind(event.is_sponsored)
        .bind(&event.brand)
        .bind(ts(&event.timestamp))
        .execute(&mut *tx)
        .await?;

        let count = self.apply(&mut tx, event.value, event.timestamp).await?;
        tx.commit().await?;
        Ok(count)
    }

    /// Most recent events, newest first
    pub async fn recent_events(&self, limit: usize) -> Result<Vec<EngagementEvent>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, creator_id, content_id, kind, value, niche, is_sponsored, brand, timestamp
            FROM engagement_events
            ORDER BY timestamp DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.store.pool())
        .await?;

        rows.iter().map(event_from_row).collect()
    }
}

#[async_trait]
impl EngagementStore for SqliteVelocity {
    async fn append(&self, event: &EngagementEvent) -> Result<u64, PricingError> {
        Ok(self.record_event(event).await?)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<EngagementEvent>, PricingError> {
        Ok(self.recent_events(limit).await?)
    }
}
