//! Credits ledger service - award and redeem with balance invariants
//!
//! ```text
//! award / redeem
//!       │
//!       ▼
//! ┌──────────────┐
//! │ Validate     │──► InvalidAmount
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐   Contention
//! │ Store        │◄──────────────┐ backoff, bounded attempts
//! │ transact     │───────────────┘──► LedgerUnavailable
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ Notify       │──► failures logged, never returned
//! └──────────────┘
//! ```

use chrono::Utc;
use growth_core::{Credits, IdempotencyKey};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::{self, AuditError, ReplayedBalance};
use crate::balance::UserCreditBalance;
use crate::config::LedgerConfig;
use crate::entry::{EntryType, LedgerEntry};
use crate::error::LedgerError;
use crate::notifier::{NoOpNotifier, Notifier};
use crate::store::{Commit, LedgerStore, MemoryLedgerStore, Mutation};

/// Result of a successful award
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AwardResult {
    pub entry_id: String,
    pub amount: Credits,
    pub balance_after: Credits,
    /// True when an earlier call with the same idempotency key is being returned
    pub replayed: bool,
}

/// Result of a successful redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedeemResult {
    pub entry_id: String,
    pub redeemed: Credits,
    pub net_value: Credits,
    pub fee: Credits,
    pub balance_after: Credits,
    pub replayed: bool,
}

/// Owns the balance invariants. All balance mutations go through here.
pub struct CreditsLedger {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    config: LedgerConfig,
}

impl CreditsLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// In-memory ledger with default config and no notifications
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryLedgerStore::new()),
            Arc::new(NoOpNotifier),
            LedgerConfig::default(),
        )
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Credit `amount` to `user_id`, creating the balance record on first use.
    pub async fn award(
        &self,
        user_id: &str,
        amount: Decimal,
        source: &str,
        key: Option<IdempotencyKey>,
    ) -> Result<AwardResult, LedgerError> {
        let amount = Credits::positive(amount).map_err(|_| LedgerError::InvalidAmount(amount))?;
        if source.trim().is_empty() {
            return Err(LedgerError::EmptySource);
        }

        let plan = |current: Option<UserCreditBalance>| -> Result<Mutation, LedgerError> {
            let mut balance = UserCreditBalance::get_or_create(current, user_id);
            let new_balance = balance
                .growth_credits
                .checked_add(&amount)
                .ok_or(LedgerError::InvalidAmount(amount.value()))?;

            balance.growth_credits = new_balance;
            balance.last_sequence = balance.next_sequence();
            balance.last_awarded_at = Some(Utc::now());

            let entry = LedgerEntry::credit(user_id, balance.last_sequence, amount, source, new_balance)
                .with_idempotency_key(key.clone());
            Ok(Mutation { balance, entry })
        };

        let commit = self
            .with_retry("award", user_id, || {
                self.store.transact(user_id, key.as_ref(), &plan)
            })
            .await?;
        let replayed = commit.is_replay();
        let entry = expect_type(commit, EntryType::Credit, key.as_ref())?;

        if replayed {
            debug!(user_id, entry_id = %entry.id, "award replayed from idempotency key");
        } else {
            info!(
                user_id,
                amount = %amount,
                source,
                balance_after = %entry.balance_after,
                "growth credits awarded"
            );
            if amount.value() > self.config.notify_threshold {
                self.notify_award(user_id, amount, source).await;
            }
        }

        Ok(AwardResult {
            entry_id: entry.id.clone(),
            amount: entry.magnitude(),
            balance_after: entry.balance_after,
            replayed,
        })
    }

    /// Debit `amount` from `user_id`, taking the retention fee out of the payout.
    ///
    /// Fails with `InsufficientBalance` (and changes nothing) if the user has no record
    /// or less than `amount`.
    pub async fn redeem(
        &self,
        user_id: &str,
        amount: Decimal,
        key: Option<IdempotencyKey>,
    ) -> Result<RedeemResult, LedgerError> {
        let amount = Credits::positive(amount).map_err(|_| LedgerError::InvalidAmount(amount))?;
        let rate = self.config.retention_fee_rate;

        let plan = |current: Option<UserCreditBalance>| -> Result<Mutation, LedgerError> {
            let Some(mut balance) = current else {
                return Err(LedgerError::insufficient(user_id, Decimal::ZERO, amount.value()));
            };
            let new_balance = balance.growth_credits.checked_sub(&amount).ok_or_else(|| {
                LedgerError::insufficient(user_id, balance.growth_credits.value(), amount.value())
            })?;
            let (fee, net_value) = rate.split(amount);

            balance.growth_credits = new_balance;
            balance.last_sequence = balance.next_sequence();
            balance.last_redeemed_at = Some(Utc::now());

            let entry = LedgerEntry::debit(
                user_id,
                balance.last_sequence,
                amount,
                fee,
                net_value,
                new_balance,
            )
            .with_idempotency_key(key.clone());
            Ok(Mutation { balance, entry })
        };

        let commit = self
            .with_retry("redeem", user_id, || {
                self.store.transact(user_id, key.as_ref(), &plan)
            })
            .await?;
        let replayed = commit.is_replay();
        let entry = expect_type(commit, EntryType::Debit, key.as_ref())?;

        let fee = entry.fee.unwrap_or(Credits::ZERO);
        let net_value = entry.net_value.unwrap_or_else(|| entry.magnitude());
        if !replayed {
            info!(
                user_id,
                amount = %amount,
                fee = %fee,
                net_value = %net_value,
                balance_after = %entry.balance_after,
                "growth credits redeemed"
            );
        }

        Ok(RedeemResult {
            entry_id: entry.id.clone(),
            redeemed: entry.magnitude(),
            net_value,
            fee,
            balance_after: entry.balance_after,
            replayed,
        })
    }

    /// Current balance (zero if the user has never been awarded)
    pub async fn balance(&self, user_id: &str) -> Result<Credits, LedgerError> {
        Ok(self
            .store
            .balance(user_id)
            .await?
            .map(|b| b.growth_credits)
            .unwrap_or(Credits::ZERO))
    }

    /// Full balance record, if any
    pub async fn balance_record(
        &self,
        user_id: &str,
    ) -> Result<Option<UserCreditBalance>, LedgerError> {
        self.store.balance(user_id).await
    }

    /// Ledger entries of one user in application order
    pub async fn history(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.entries(user_id).await
    }

    /// Replay the user's entries and compare with the stored balance.
    ///
    /// Entries and balance are read separately; run on a quiescent user for a strict check.
    pub async fn verify_user(&self, user_id: &str) -> Result<ReplayedBalance, LedgerError> {
        let entries = self.store.entries(user_id).await?;
        let replayed = audit::replay(&entries)?
            .remove(user_id)
            .unwrap_or_default();

        let stored = self.balance(user_id).await?.value();
        if stored != replayed.balance {
            return Err(AuditError::StoredBalanceMismatch {
                user_id: user_id.to_string(),
                stored,
                replayed: replayed.balance,
            }
            .into());
        }
        Ok(replayed)
    }

    /// Replay every entry in the store
    pub async fn audit_all(&self) -> Result<BTreeMap<String, ReplayedBalance>, LedgerError> {
        let entries = self.store.all_entries().await?;
        let replayed = audit::replay(&entries)?;

        for (user_id, result) in &replayed {
            let stored = self.balance(user_id).await?.value();
            if stored != result.balance {
                return Err(AuditError::StoredBalanceMismatch {
                    user_id: user_id.clone(),
                    stored,
                    replayed: result.balance,
                }
                .into());
            }
        }
        Ok(replayed)
    }

    /// Run `op`, retrying transient storage failures with exponential backoff and jitter.
    async fn with_retry<T, F, Fut>(&self, op_name: &str, user_id: &str, op: F) -> Result<T, LedgerError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() => {
                    if attempt >= max_attempts {
                        warn!(op = op_name, user_id, attempt, error = %e, "ledger retries exhausted");
                        return Err(LedgerError::LedgerUnavailable {
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    let jitter = rand::thread_rng().gen_range(0..=self.config.backoff_base_ms);
                    let delay = self.config.backoff(attempt) + std::time::Duration::from_millis(jitter);
                    debug!(op = op_name, user_id, attempt, ?delay, error = %e, "retrying ledger operation");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn notify_award(&self, user_id: &str, amount: Credits, source: &str) {
        let message = format!(
            "You earned {} growth credits! (Source: {})",
            amount.value().round_dp(2),
            source
        );
        let notifier = self.notifier.name();

        match tokio::time::timeout(
            self.config.notify_timeout(),
            self.notifier.notify(user_id, &message),
        )
        .await
        {
            Ok(Ok(())) => debug!(user_id, notifier, "award notification sent"),
            Ok(Err(e)) => warn!(user_id, notifier, error = %e, "award notification failed"),
            Err(_) => warn!(user_id, notifier, "award notification timed out"),
        }
    }
}

/// A replayed idempotency key must belong to the same kind of operation.
fn expect_type(
    commit: Commit,
    expected: EntryType,
    key: Option<&IdempotencyKey>,
) -> Result<LedgerEntry, LedgerError> {
    let entry = commit.into_entry();
    if entry.entry_type != expected {
        if let Some(key) = key {
            return Err(LedgerError::IdempotencyConflict(key.clone()));
        }
    }
    Ok(entry)
}
