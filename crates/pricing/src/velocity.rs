//! Velocity counter - system-wide engagement volume
//!
//! Written on every engagement event, read on every price quote. Increments
//! must commute so concurrent writers never lose updates; reads may lag.
//!
//! Two in-memory modes:
//! - `CumulativeVelocity`: one atomic counter, never decays
//! - `WindowedVelocity`: minute buckets over a trailing window

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::VelocityMode;
use crate::error::PricingError;

/// Latest counter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VelocityReading {
    pub count: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait VelocityCounter: Send + Sync {
    /// Add weighted engagement units; returns the count after the increment
    async fn increment(&self, units: u64) -> Result<u64, PricingError>;

    async fn read(&self) -> Result<VelocityReading, PricingError>;
}

/// Build the in-memory counter for a mode
pub fn memory_counter(mode: VelocityMode) -> Arc<dyn VelocityCounter> {
    match mode {
        VelocityMode::Cumulative => Arc::new(CumulativeVelocity::new()),
        VelocityMode::Windowed { window_minutes } => Arc::new(WindowedVelocity::new(window_minutes)),
    }
}

/// Lock-free running total
#[derive(Debug, Default)]
pub struct CumulativeVelocity {
    count: AtomicU64,
    /// Unix millis of the last increment, 0 = never
    last_updated_ms: AtomicI64,
}

impl CumulativeVelocity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known value (for testing)
    pub fn with_count(count: u64) -> Self {
        Self {
            count: AtomicU64::new(count),
            last_updated_ms: AtomicI64::new(0),
        }
    }
}

#[async_trait]
impl VelocityCounter for CumulativeVelocity {
    async fn increment(&self, units: u64) -> Result<u64, PricingError> {
        let previous = self.count.fetch_add(units, Ordering::Relaxed);
        self.last_updated_ms
            .fetch_max(Utc::now().timestamp_millis(), Ordering::Relaxed);
        Ok(previous.saturating_add(units))
    }

    async fn read(&self) -> Result<VelocityReading, PricingError> {
        let ms = self.last_updated_ms.load(Ordering::Relaxed);
        Ok(VelocityReading {
            count: self.count.load(Ordering::Relaxed),
            last_updated: (ms > 0).then(|| Utc.timestamp_millis_opt(ms).single()).flatten(),
        })
    }
}

/// One minute of engagement
#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    /// Minutes since the Unix epoch this bucket currently holds
    minute: i64,
    count: u64,
}

#[derive(Debug)]
struct Window {
    buckets: Vec<Bucket>,
    last_updated: Option<DateTime<Utc>>,
}

/// Trailing-window counter with minute granularity.
///
/// Bucket `minute % len` is reused once its minute falls out of the window.
#[derive(Debug)]
pub struct WindowedVelocity {
    window: Mutex<Window>,
}

impl WindowedVelocity {
    pub fn new(window_minutes: u32) -> Self {
        let len = window_minutes.max(1) as usize;
        Self {
            window: Mutex::new(Window {
                buckets: vec![Bucket { minute: i64::MIN, count: 0 }; len],
                last_updated: None,
            }),
        }
    }

    pub fn window_minutes(&self) -> usize {
        self.window.lock().unwrap().buckets.len()
    }

    /// Record `units` at `now`
    pub fn increment_at(&self, units: u64, now: DateTime<Utc>) -> u64 {
        let minute = now.timestamp().div_euclid(60);
        let mut window = self.window.lock().unwrap();
        let len = window.buckets.len() as i64;
        let bucket = &mut window.buckets[minute.rem_euclid(len) as usize];
        if bucket.minute != minute {
            *bucket = Bucket { minute, count: 0 };
        }
        bucket.count = bucket.count.saturating_add(units);
        window.last_updated = Some(now);
        Self::sum(&window.buckets, minute)
    }

    /// Units recorded in the window ending at `now`
    pub fn count_at(&self, now: DateTime<Utc>) -> u64 {
        let window = self.window.lock().unwrap();
        Self::sum(&window.buckets, now.timestamp().div_euclid(60))
    }

    fn sum(buckets: &[Bucket], current_minute: i64) -> u64 {
        let oldest = current_minute - buckets.len() as i64 + 1;
        buckets
            .iter()
            .filter(|b| b.minute >= oldest && b.minute <= current_minute)
            .fold(0u64, |acc, b| acc.saturating_add(b.count))
    }
}

#[async_trait]
impl VelocityCounter for WindowedVelocity {
    async fn increment(&self, units: u64) -> Result<u64, PricingError> {
        Ok(self.increment_at(units, Utc::now()))
    }

    async fn read(&self) -> Result<VelocityReading, PricingError> {
        let count = self.count_at(Utc::now());
        let last_updated = self.window.lock().unwrap().last_updated;
        Ok(VelocityReading { count, last_updated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_cumulative_increment_and_read() {
        let counter = CumulativeVelocity::new();
        assert_eq!(counter.read().await.unwrap().count, 0);
        assert!(counter.read().await.unwrap().last_updated.is_none());

        assert_eq!(counter.increment(3).await.unwrap(), 3);
        assert_eq!(counter.increment(2).await.unwrap(), 5);

        let reading = counter.read().await.unwrap();
        assert_eq!(reading.count, 5);
        assert!(reading.last_updated.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cumulative_concurrent_increments() {
        let counter = Arc::new(CumulativeVelocity::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    counter.increment(1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.read().await.unwrap().count, 5000);
    }

    #[test]
    fn test_window_expires_old_minutes() {
        let counter = WindowedVelocity::new(5);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        counter.increment_at(10, start);
        counter.increment_at(5, start + Duration::minutes(2));
        assert_eq!(counter.count_at(start + Duration::minutes(2)), 15);

        // Minute 0 leaves the window at minute 5
        assert_eq!(counter.count_at(start + Duration::minutes(4)), 15);
        assert_eq!(counter.count_at(start + Duration::minutes(5)), 5);
        assert_eq!(counter.count_at(start + Duration::minutes(7)), 0);
    }

    #[test]
    fn test_window_reuses_bucket_slot() {
        let counter = WindowedVelocity::new(3);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        counter.increment_at(7, start);
        // Same slot (minute 3 % 3 == 0), stale value must be dropped
        let total = counter.increment_at(1, start + Duration::minutes(3));
        assert_eq!(total, 1);
    }

    #[test]
    fn test_zero_window_clamped() {
        assert_eq!(WindowedVelocity::new(0).window_minutes(), 1);
    }

    #[tokio::test]
    async fn test_memory_counter_modes() {
        let cumulative = memory_counter(VelocityMode::Cumulative);
        cumulative.increment(4).await.unwrap();
        assert_eq!(cumulative.read().await.unwrap().count, 4);

        let windowed = memory_counter(VelocityMode::Windowed { window_minutes: 60 });
        windowed.increment(4).await.unwrap();
        assert_eq!(windowed.read().await.unwrap().count, 4);
    }
}
