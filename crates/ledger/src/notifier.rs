//! Notifier - best-effort side channel for balance changes
//!
//! Delivery (chat bots, push, email) lives outside this workspace. The ledger
//! only calls `notify` after a committed award and ignores any failure.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification to {user_id} failed: {reason}")]
pub struct NotifyError {
    pub user_id: String,
    pub reason: String,
}

impl NotifyError {
    pub fn new(user_id: &str, reason: impl Into<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hook name for logging
    fn name(&self) -> &str;

    async fn notify(&self, user_id: &str, message: &str) -> Result<(), NotifyError>;
}

/// Drops every notification
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    fn name(&self) -> &str {
        "NoOp"
    }

    async fn notify(&self, _user_id: &str, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Writes notifications to the tracing log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "Log"
    }

    async fn notify(&self, user_id: &str, message: &str) -> Result<(), NotifyError> {
        info!(user_id, message, "notification");
        Ok(())
    }
}
