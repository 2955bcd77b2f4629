//! `LedgerStore` on SQLite
//!
//! Each `transact` runs in one write transaction: idempotency lookup, balance
//! read, balance upsert, entry insert and key insert commit or roll back together.

use async_trait::async_trait;
use chrono::Utc;
use growth_core::IdempotencyKey;
use growth_ledger::{
    Commit, EntryType, LedgerEntry, LedgerError, LedgerStore, Mutation, Planner, UserCreditBalance,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::db::{
    opt_ts, parse_credits, parse_decimal, parse_opt_credits, parse_opt_ts, parse_ts, ts,
    SqliteStore,
};
use crate::error::StorageError;

const ENTRY_COLUMNS: &str = "id, user_id, sequence, amount, entry_type, source, fee, net_value, \
                             balance_after, idempotency_key, timestamp";

fn balance_from_row(row: &SqliteRow) -> Result<UserCreditBalance, StorageError> {
    let credits: String = row.try_get("growth_credits")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(UserCreditBalance {
        user_id: row.try_get("user_id")?,
        growth_credits: parse_credits("growth_credits", &credits)?,
        last_sequence: row.try_get::<i64, _>("last_sequence")? as u64,
        last_awarded_at: parse_opt_ts("last_awarded_at", row.try_get("last_awarded_at")?)?,
        last_redeemed_at: parse_opt_ts("last_redeemed_at", row.try_get("last_redeemed_at")?)?,
        created_at: parse_ts("created_at", &created_at)?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, StorageError> {
    let amount: String = row.try_get("amount")?;
    let entry_type: String = row.try_get("entry_type")?;
    let balance_after: String = row.try_get("balance_after")?;
    let timestamp: String = row.try_get("timestamp")?;
    let key: Option<String> = row.try_get("idempotency_key")?;

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        sequence: row.try_get::<i64, _>("sequence")? as u64,
        amount: parse_decimal("amount", &amount)?,
        entry_type: entry_type
            .parse::<EntryType>()
            .map_err(|_| StorageError::invalid_enum("entry_type", &entry_type))?,
        source: row.try_get("source")?,
        fee: parse_opt_credits("fee", row.try_get("fee")?)?,
        net_value: parse_opt_credits("net_value", row.try_get("net_value")?)?,
        balance_after: parse_credits("balance_after", &balance_after)?,
        idempotency_key: key.map(IdempotencyKey::new),
        timestamp: parse_ts("timestamp", &timestamp)?,
    })
}

async fn find_key(
    conn: &mut SqliteConnection,
    key: &IdempotencyKey,
) -> Result<Option<(String, String)>, StorageError> {
    let row = sqlx::query("SELECT user_id, entry_id FROM idempotency_keys WHERE key = ?")
        .bind(key.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| Ok::<_, StorageError>((r.try_get("user_id")?, r.try_get("entry_id")?)))
        .transpose()
}

async fn load_entry(conn: &mut SqliteConnection, entry_id: &str) -> Result<LedgerEntry, StorageError> {
    let row = sqlx::query(&format!("SELECT {} FROM ledger_entries WHERE id = ?", ENTRY_COLUMNS))
        .bind(entry_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StorageError::not_found(format!("ledger entry {}", entry_id)))?;
    entry_from_row(&row)
}

async fn load_balance(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<UserCreditBalance>, StorageError> {
    let row = sqlx::query("SELECT * FROM balances WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(balance_from_row).transpose()
}

async fn save_balance(conn: &mut SqliteConnection, balance: &UserCreditBalance) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO balances (user_id, growth_credits, last_sequence, last_awarded_at, last_redeemed_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            growth_credits = excluded.growth_credits,
            last_sequence = excluded.last_sequence,
            last_awarded_at = excluded.last_awarded_at,
            last_redeemed_at = excluded.last_redeemed_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&balance.user_id)
    .bind(balance.growth_credits.value().to_string())
    .bind(balance.last_sequence as i64)
    .bind(opt_ts(&balance.last_awarded_at))
    .bind(opt_ts(&balance.last_redeemed_at))
    .bind(ts(&balance.created_at))
    .bind(ts(&Utc::now()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_entry(conn: &mut SqliteConnection, entry: &LedgerEntry) -> Result<(), StorageError> {
    sqlx::query(&format!(
        "INSERT INTO ledger_entries ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        ENTRY_COLUMNS
    ))
    .bind(&entry.id)
    .bind(&entry.user_id)
    .bind(entry.sequence as i64)
    .bind(entry.amount.to_string())
    .bind(entry.entry_type.to_string())
    .bind(&entry.source)
    .bind(entry.fee.map(|f| f.value().to_string()))
    .bind(entry.net_value.map(|n| n.value().to_string()))
    .bind(entry.balance_after.value().to_string())
    .bind(entry.idempotency_key.as_ref().map(|k| k.as_str().to_string()))
    .bind(ts(&entry.timestamp))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_key(
    conn: &mut SqliteConnection,
    key: &IdempotencyKey,
    user_id: &str,
    entry_id: &str,
) -> Result<(), StorageError> {
    sqlx::query("INSERT INTO idempotency_keys (key, user_id, entry_id) VALUES (?, ?, ?)")
        .bind(key.as_str())
        .bind(user_id)
        .bind(entry_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// SQLite allows one writer per database: every `transact` takes the shared
/// write lock, so writes for different users queue behind each other here.
/// Use `MemoryLedgerStore` (or a multi-writer backend) for independent per-user writes.
#[async_trait]
impl LedgerStore for SqliteStore {
    async fn transact(
        &self,
        user_id: &str,
        key: Option<&IdempotencyKey>,
        plan: &Planner<'_>,
    ) -> Result<Commit, LedgerError> {
        let mut tx = self.begin_write().await?;

        if let Some(key) = key {
            if let Some((owner, entry_id)) = find_key(&mut tx, key).await? {
                if owner != user_id {
                    return Err(LedgerError::IdempotencyConflict(key.clone()));
                }
                let entry = load_entry(&mut tx, &entry_id).await?;
                debug!(user_id, key = %key, "Idempotency key replayed");
                return Ok(Commit::Replayed(entry));
            }
        }

        let current = load_balance(&mut tx, user_id).await?;
        let Mutation { balance, entry } = plan(current)?;

        save_balance(&mut tx, &balance).await?;
        insert_entry(&mut tx, &entry).await?;
        if let Some(key) = key {
            insert_key(&mut tx, key, user_id, &entry.id).await?;
        }
        tx.commit().await.map_err(StorageError::from)?;

        Ok(Commit::Applied(entry))
    }

    async fn balance(&self, user_id: &str) -> Result<Option<UserCreditBalance>, LedgerError> {
        let mut conn = self.pool().acquire().await.map_err(StorageError::from)?;
        Ok(load_balance(&mut conn, user_id).await?)
    }

    async fn entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries WHERE user_id = ? ORDER BY sequence",
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn all_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries ORDER BY user_id, sequence",
            ENTRY_COLUMNS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growth_ledger::{source, CreditsLedger, LedgerConfig, NoOpNotifier};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn ledger() -> (Arc<SqliteStore>, CreditsLedger) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let ledger = CreditsLedger::new(store.clone(), Arc::new(NoOpNotifier), LedgerConfig::default());
        (store, ledger)
    }

    #[tokio::test]
    async fn test_award_and_redeem_persist() {
        let (store, ledger) = ledger().await;
        ledger.award("u1", dec!(10), source::ENGAGEMENT_REWARD, None).await.unwrap();
        let redeemed = ledger.redeem("u1", dec!(4), None).await.unwrap();
        assert_eq!(redeemed.fee.value(), dec!(0.4));
        assert_eq!(redeemed.net_value.value(), dec!(3.6));

        let balance = store.balance("u1").await.unwrap().unwrap();
        assert_eq!(balance.growth_credits.value(), dec!(6));
        assert_eq!(balance.last_sequence, 2);
        assert!(balance.last_awarded_at.is_some());
        assert!(balance.last_redeemed_at.is_some());

        let entries = store.entries("u1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].entry_type, EntryType::Debit);
        assert_eq!(entries[1].amount, dec!(-4));
        assert_eq!(entries[1].fee.map(|f| f.value()), Some(dec!(0.4)));

        ledger.verify_user("u1").await.unwrap();
    }

    #[tokio::test]
    async fn test_insufficient_balance_rolls_back() {
        let (store, ledger) = ledger().await;
        ledger.award("u1", dec!(5), source::BONUS, None).await.unwrap();

        let result = ledger.redeem("u1", dec!(50), None).await;
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
        assert_eq!(store.entries("u1").await.unwrap().len(), 1);
        assert_eq!(ledger.balance("u1").await.unwrap().value(), dec!(5));
    }

    #[tokio::test]
    async fn test_missing_user_has_no_record() {
        let (store, ledger) = ledger().await;
        assert!(store.balance("ghost").await.unwrap().is_none());
        assert!(ledger.balance("ghost").await.unwrap().is_zero());
        assert!(store.entries("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idempotency_key_survives_in_table() {
        let (store, ledger) = ledger().await;
        let key = IdempotencyKey::new("award-42");

        let first = ledger.award("u1", dec!(3), source::BONUS, Some(key.clone())).await.unwrap();
        let second = ledger.award("u1", dec!(3), source::BONUS, Some(key.clone())).await.unwrap();
        assert!(second.replayed);
        assert_eq!(first.entry_id, second.entry_id);
        assert_eq!(ledger.balance("u1").await.unwrap().value(), dec!(3));

        let other = ledger.award("u2", dec!(3), source::BONUS, Some(key)).await;
        assert!(matches!(other, Err(LedgerError::IdempotencyConflict(_))));
        assert!(store.balance("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_entries_ordered_by_user() {
        let (store, ledger) = ledger().await;
        ledger.award("b", dec!(1), source::BONUS, None).await.unwrap();
        ledger.award("a", dec!(1), source::BONUS, None).await.unwrap();
        ledger.award("a", dec!(2), source::BONUS, None).await.unwrap();

        let entries = store.all_entries().await.unwrap();
        let order: Vec<(&str, u64)> = entries.iter().map(|e| (e.user_id.as_str(), e.sequence)).collect();
        assert_eq!(order, vec![("a", 1), ("a", 2), ("b", 1)]);

        let audit = ledger.audit_all().await.unwrap();
        assert_eq!(audit["a"].balance, dec!(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_awards_on_file_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("growth.db")).await.unwrap());
        let ledger = Arc::new(CreditsLedger::new(
            store.clone(),
            Arc::new(NoOpNotifier),
            LedgerConfig::default(),
        ));

        let mut handles = Vec::new();
        for i in 0..40 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                let user = if i % 2 == 0 { "even" } else { "odd" };
                ledger.award(user, dec!(1), source::BONUS, None).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.balance("even").await.unwrap().value(), dec!(20));
        assert_eq!(ledger.balance("odd").await.unwrap().value(), dec!(20));
        let sequences: Vec<u64> = store.entries("even").await.unwrap().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());
    }
}
