//! Engagement log - raw engagement units feeding the velocity counter
//!
//! `EngagementStore` keeps the events; `MemoryEngagementStore` is the in-process
//! buffer, growth-storage persists them next to the velocity counter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use strum_macros::{Display, EnumString};
use tracing::debug;
use uuid::Uuid;

use crate::error::PricingError;
use crate::velocity::VelocityCounter;

/// Niche recorded when the caller gives none
pub const GENERAL_NICHE: &str = "general";

/// Events retained in memory by default
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EngagementKind {
    Like,
    Share,
    Click,
    WatchTime,
    Other,
}

/// Context attached to an engagement by the content card
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetadata {
    pub niche: Option<String>,
    #[serde(default)]
    pub is_sponsored: bool,
    pub brand: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub id: String,
    pub creator_id: String,
    pub content_id: String,
    pub kind: EngagementKind,
    /// Weighted units added to velocity
    pub value: u64,
    pub niche: String,
    pub is_sponsored: bool,
    pub brand: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Where engagement events are kept.
///
/// `append` must persist the event and add its value to velocity in one
/// atomic unit, returning the velocity count afterwards.
#[async_trait]
pub trait EngagementStore: Send + Sync {
    async fn append(&self, event: &EngagementEvent) -> Result<u64, PricingError>;

    /// Most recent events, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<EngagementEvent>, PricingError>;
}

/// Bounded in-memory event buffer in front of a velocity counter (for testing)
pub struct MemoryEngagementStore {
    velocity: Arc<dyn VelocityCounter>,
    events: Mutex<VecDeque<EngagementEvent>>,
    capacity: usize,
}

impl MemoryEngagementStore {
    pub fn new(velocity: Arc<dyn VelocityCounter>) -> Self {
        Self::with_capacity(velocity, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(velocity: Arc<dyn VelocityCounter>, capacity: usize) -> Self {
        Self {
            velocity,
            events: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl EngagementStore for MemoryEngagementStore {
    async fn append(&self, event: &EngagementEvent) -> Result<u64, PricingError> {
        let velocity = self.velocity.increment(event.value).await?;
        let mut events = self.events.lock().unwrap();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(velocity)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<EngagementEvent>, PricingError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Engagement log feeding the velocity counter.
///
/// Recording an event also increments the velocity counter by its value.
pub struct EngagementLog {
    store: Arc<dyn EngagementStore>,
}

impl EngagementLog {
    pub fn new(store: Arc<dyn EngagementStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        creator_id: &str,
        content_id: &str,
        kind: EngagementKind,
        value: u64,
        metadata: EngagementMetadata,
    ) -> Result<EngagementEvent, PricingError> {
        if value == 0 {
            return Err(PricingError::InvalidEngagementValue);
        }

        let niche = metadata
            .niche
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| GENERAL_NICHE.to_string());
        let event = EngagementEvent {
            id: Uuid::new_v4().to_string(),
            creator_id: creator_id.to_string(),
            content_id: content_id.to_string(),
            kind,
            value,
            niche,
            is_sponsored: metadata.is_sponsored,
            brand: metadata.brand,
            timestamp: Utc::now(),
        };

        let velocity = self.store.append(&event).await?;

        debug!(
            creator_id,
            content_id,
            kind = %kind,
            value,
            velocity,
            "engagement recorded"
        );
        Ok(event)
    }

    /// Most recent events, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<EngagementEvent>, PricingError> {
        self.store.recent(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::velocity::CumulativeVelocity;
    use std::str::FromStr;

    fn memory_log(velocity: Arc<CumulativeVelocity>, capacity: usize) -> EngagementLog {
        EngagementLog::new(Arc::new(MemoryEngagementStore::with_capacity(velocity, capacity)))
    }

    #[tokio::test]
    async fn test_record_increments_velocity() {
        let velocity = Arc::new(CumulativeVelocity::new());
        let log = memory_log(velocity.clone(), DEFAULT_CAPACITY);

        log.record("c1", "v1", EngagementKind::Like, 1, EngagementMetadata::default())
            .await
            .unwrap();
        log.record("c1", "v1", EngagementKind::WatchTime, 30, EngagementMetadata::default())
            .await
            .unwrap();

        assert_eq!(velocity.read().await.unwrap().count, 31);
        assert_eq!(log.recent(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_metadata_defaults() {
        let log = memory_log(Arc::new(CumulativeVelocity::new()), DEFAULT_CAPACITY);
        let event = log
            .record("c1", "v1", EngagementKind::Share, 1, EngagementMetadata::default())
            .await
            .unwrap();
        assert_eq!(event.niche, "general");
        assert!(!event.is_sponsored);
        assert!(event.brand.is_none());

        let sponsored = EngagementMetadata {
            niche: Some("crypto".to_string()),
            is_sponsored: true,
            brand: Some("brandA".to_string()),
        };
        let event = log
            .record("c1", "v2", EngagementKind::Click, 1, sponsored)
            .await
            .unwrap();
        assert_eq!(event.niche, "crypto");
        assert_eq!(event.brand.as_deref(), Some("brandA"));
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let log = memory_log(Arc::new(CumulativeVelocity::new()), 2);
        for content in ["a", "b", "c"] {
            log.record("c1", content, EngagementKind::Like, 1, EngagementMetadata::default())
                .await
                .unwrap();
        }
        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content_id, "c");
        assert_eq!(recent[1].content_id, "b");
    }

    #[tokio::test]
    async fn test_zero_value_rejected() {
        let velocity = Arc::new(CumulativeVelocity::new());
        let log = memory_log(velocity.clone(), DEFAULT_CAPACITY);
        let result = log
            .record("c1", "v1", EngagementKind::Like, 0, EngagementMetadata::default())
            .await;
        assert_eq!(result, Err(PricingError::InvalidEngagementValue));
        assert!(log.recent(10).await.unwrap().is_empty());
        assert_eq!(velocity.read().await.unwrap().count, 0);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(EngagementKind::from_str("watch_time").unwrap(), EngagementKind::WatchTime);
        assert_eq!(EngagementKind::Share.to_string(), "share");
        assert!(EngagementKind::from_str("poke").is_err());
    }
}
