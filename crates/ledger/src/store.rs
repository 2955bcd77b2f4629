//! Ledger store - durable keyed storage for balances and the append-only log
//!
//! The store owns atomicity. The service owns the rules: it hands the store a
//! planner that turns the current balance into the next balance plus the entry
//! describing the change, and the store applies both in one indivisible unit.

use async_trait::async_trait;
use growth_core::IdempotencyKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::balance::UserCreditBalance;
use crate::entry::LedgerEntry;
use crate::error::LedgerError;

/// Result of a planner: the balance to persist and the entry to append
#[derive(Debug, Clone)]
pub struct Mutation {
    pub balance: UserCreditBalance,
    pub entry: LedgerEntry,
}

/// Computes a mutation from the current stored balance (`None` = no record yet).
///
/// May be called more than once when the store retries internally, so it must be pure.
pub type Planner<'a> =
    dyn Fn(Option<UserCreditBalance>) -> Result<Mutation, LedgerError> + Send + Sync + 'a;

/// Outcome of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    /// The mutation was applied now
    Applied(LedgerEntry),
    /// The idempotency key was already used; nothing changed
    Replayed(LedgerEntry),
}

impl Commit {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            Commit::Applied(entry) | Commit::Replayed(entry) => entry,
        }
    }

    pub fn into_entry(self) -> LedgerEntry {
        match self {
            Commit::Applied(entry) | Commit::Replayed(entry) => entry,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Commit::Replayed(_))
    }
}

/// Storage backend for balances and ledger entries
///
/// Implementations:
/// - `MemoryLedgerStore`: per-user locks, for tests and embedding
/// - `growth_storage::SqliteStore`: SQLite transactions via sqlx
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically read the user's balance, run `plan`, persist the new balance and
    /// append the entry. Serializable per `user_id`; different users never block each other.
    ///
    /// If `key` was already committed for this user, returns `Commit::Replayed` with the
    /// original entry without calling `plan`.
    async fn transact(
        &self,
        user_id: &str,
        key: Option<&IdempotencyKey>,
        plan: &Planner<'_>,
    ) -> Result<Commit, LedgerError>;

    /// Current balance record, if any
    async fn balance(&self, user_id: &str) -> Result<Option<UserCreditBalance>, LedgerError>;

    /// All entries of one user ordered by sequence
    async fn entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Every entry in the store, ordered by user then sequence
    async fn all_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError>;
}

#[derive(Debug, Default)]
struct UserSlot {
    balance: Option<UserCreditBalance>,
    entries: Vec<LedgerEntry>,
}

/// In-memory ledger store.
///
/// Each user has its own mutex; the outer map lock is only held long enough to
/// find or insert the slot.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    slots: RwLock<HashMap<String, Arc<Mutex<UserSlot>>>>,
    idempotency: Mutex<HashMap<IdempotencyKey, LedgerEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user_id: &str) -> Arc<Mutex<UserSlot>> {
        if let Some(slot) = self.slots.read().unwrap().get(user_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap();
        Arc::clone(slots.entry(user_id.to_string()).or_default())
    }

    fn existing_slot(&self, user_id: &str) -> Option<Arc<Mutex<UserSlot>>> {
        self.slots.read().unwrap().get(user_id).cloned()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn transact(
        &self,
        user_id: &str,
        key: Option<&IdempotencyKey>,
        plan: &Planner<'_>,
    ) -> Result<Commit, LedgerError> {
        let slot = self.slot(user_id);
        let mut slot = slot.lock().unwrap();

        if let Some(key) = key {
            if let Some(previous) = self.idempotency.lock().unwrap().get(key) {
                if previous.user_id != user_id {
                    return Err(LedgerError::IdempotencyConflict(key.clone()));
                }
                return Ok(Commit::Replayed(previous.clone()));
            }
        }

        let Mutation { balance, entry } = plan(slot.balance.clone())?;

        if let Some(key) = key {
            self.idempotency
                .lock()
                .unwrap()
                .insert(key.clone(), entry.clone());
        }
        slot.entries.push(entry.clone());
        slot.balance = Some(balance);

        Ok(Commit::Applied(entry))
    }

    async fn balance(&self, user_id: &str) -> Result<Option<UserCreditBalance>, LedgerError> {
        Ok(self
            .existing_slot(user_id)
            .and_then(|slot| slot.lock().unwrap().balance.clone()))
    }

    async fn entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .existing_slot(user_id)
            .map(|slot| slot.lock().unwrap().entries.clone())
            .unwrap_or_default())
    }

    async fn all_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut users: Vec<(String, Arc<Mutex<UserSlot>>)> = self
            .slots
            .read()
            .unwrap()
            .iter()
            .map(|(user, slot)| (user.clone(), Arc::clone(slot)))
            .collect();
        users.sort_by(|a, b| a.0.cmp(&b.0));

        let mut entries = Vec::new();
        for (_, slot) in users {
            entries.extend(slot.lock().unwrap().entries.iter().cloned());
        }
        Ok(entries)
    }
}
