//! `BountyStore` on SQLite
//!
//! Mutations load the rows inside a write transaction, apply the same domain
//! methods the in-memory store uses and write the rows back before commit.

use async_trait::async_trait;
use growth_core::{Credits, IdempotencyKey};
use growth_escrow::{
    competes_with, is_reserved, settles, Approval, Bounty, BountyClaim, BountyStatus, BountyStore,
    ClaimInsert, ClaimStatus, EscrowError,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::db::{opt_ts, parse_credits, parse_opt_ts, parse_ts, ts, SqliteStore};
use crate::error::StorageError;

fn bounty_from_row(row: &SqliteRow) -> Result<Bounty, StorageError> {
    let status: String = row.try_get("status")?;
    let total: String = row.try_get("total_amount")?;
    let fee: String = row.try_get("protocol_fee")?;
    let net: String = row.try_get("net_pool")?;
    let claimed: String = row.try_get("claimed_amount")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Bounty {
        id: row.try_get("id")?,
        brand_id: row.try_get("brand_id")?,
        niche: row.try_get("niche")?,
        total_amount: parse_credits("total_amount", &total)?,
        protocol_fee: parse_credits("protocol_fee", &fee)?,
        net_pool: parse_credits("net_pool", &net)?,
        status: status
            .parse::<BountyStatus>()
            .map_err(|_| StorageError::invalid_enum("bounties.status", &status))?,
        claimed_amount: parse_credits("claimed_amount", &claimed)?,
        payment_method_ref: row.try_get("payment_method_ref")?,
        authorization_token: row.try_get("authorization_token")?,
        created_at: parse_ts("created_at", &created_at)?,
        closed_at: parse_opt_ts("closed_at", row.try_get("closed_at")?)?,
    })
}

fn claim_from_row(row: &SqliteRow) -> Result<BountyClaim, StorageError> {
    let status: String = row.try_get("status")?;
    let proof: String = row.try_get("proof_metrics")?;
    let payout: String = row.try_get("payout_amount")?;
    let claimed_at: String = row.try_get("claimed_at")?;
    let key: Option<String> = row.try_get("idempotency_key")?;

    Ok(BountyClaim {
        id: row.try_get("id")?,
        bounty_id: row.try_get("bounty_id")?,
        promoter_id: row.try_get("promoter_id")?,
        proof_metrics: serde_json::from_str(&proof)?,
        payout_amount: parse_credits("payout_amount", &payout)?,
        status: status
            .parse::<ClaimStatus>()
            .map_err(|_| StorageError::invalid_enum("bounty_claims.status", &status))?,
        rejection_reason: row.try_get("rejection_reason")?,
        payment_reference: row.try_get("payment_reference")?,
        ledger_entry_id: row.try_get("ledger_entry_id")?,
        idempotency_key: key.map(IdempotencyKey::new),
        claimed_at: parse_ts("claimed_at", &claimed_at)?,
        resolved_at: parse_opt_ts("resolved_at", row.try_get("resolved_at")?)?,
    })
}

async fn load_bounty(conn: &mut SqliteConnection, bounty_id: &str) -> Result<Bounty, EscrowError> {
    let row = sqlx::query("SELECT * FROM bounties WHERE id = ?")
        .bind(bounty_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StorageError::from)?
        .ok_or_else(|| EscrowError::BountyNotFound(bounty_id.to_string()))?;
    Ok(bounty_from_row(&row)?)
}

async fn load_claim(conn: &mut SqliteConnection, claim_id: &str) -> Result<BountyClaim, StorageError> {
    let row = sqlx::query("SELECT * FROM bounty_claims WHERE id = ?")
        .bind(claim_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StorageError::not_found(format!("claim {}", claim_id)))?;
    claim_from_row(&row)
}

async fn load_claims(conn: &mut SqliteConnection, bounty_id: &str) -> Result<Vec<BountyClaim>, StorageError> {
    let rows = sqlx::query("SELECT * FROM bounty_claims WHERE bounty_id = ? ORDER BY claimed_at, id")
        .bind(bounty_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(claim_from_row).collect()
}

async fn save_bounty(conn: &mut SqliteConnection, bounty: &Bounty) -> Result<(), StorageError> {
    sqlx::query("UPDATE bounties SET status = ?, claimed_amount = ?, closed_at = ? WHERE id = ?")
        .bind(bounty.status.to_string())
        .bind(bounty.claimed_amount.value().to_string())
        .bind(opt_ts(&bounty.closed_at))
        .bind(&bounty.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn save_claim(conn: &mut SqliteConnection, claim: &BountyClaim) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        UPDATE bounty_claims SET
            payout_amount = ?,
            status = ?,
            rejection_reason = ?,
            payment_reference = ?,
            ledger_entry_id = ?,
            resolved_at = ?
        WHERE id = ?
        "#,
    )
    .bind(claim.payout_amount.value().to_string())
    .bind(claim.status.to_string())
    .bind(&claim.rejection_reason)
    .bind(&claim.payment_reference)
    .bind(&claim.ledger_entry_id)
    .bind(opt_ts(&claim.resolved_at))
    .bind(&claim.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn bounties_from_rows(rows: Vec<SqliteRow>) -> Result<Vec<Bounty>, EscrowError> {
    Ok(rows
        .iter()
        .map(bounty_from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

#[async_trait]
impl BountyStore for SqliteStore {
    async fn insert_bounty(&self, bounty: &Bounty) -> Result<(), EscrowError> {
        sqlx::query(
            r#"
            INSERT INTO bounties (id, brand_id, niche, total_amount, protocol_fee, net_pool, status,
                                  claimed_amount, payment_method_ref, authorization_token, created_at, closed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&bounty.id)
        .bind(&bounty.brand_id)
        .bind(&bounty.niche)
        .bind(bounty.total_amount.value().to_string())
        .bind(bounty.protocol_fee.value().to_string())
        .bind(bounty.net_pool.value().to_string())
        .bind(bounty.status.to_string())
        .bind(bounty.claimed_amount.value().to_string())
        .bind(&bounty.payment_method_ref)
        .bind(&bounty.authorization_token)
        .bind(ts(&bounty.created_at))
        .bind(opt_ts(&bounty.closed_at))
        .execute(self.pool())
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    async fn get_bounty(&self, bounty_id: &str) -> Result<Option<Bounty>, EscrowError> {
        let row = sqlx::query("SELECT * FROM bounties WHERE id = ?")
            .bind(bounty_id)
            .fetch_optional(self.pool())
            .await
            .map_err(StorageError::from)?;
        Ok(row.as_ref().map(bounty_from_row).transpose()?)
    }

    async fn bounties_for_brand(&self, brand_id: &str) -> Result<Vec<Bounty>, EscrowError> {
        let rows = sqlx::query("SELECT * FROM bounties WHERE brand_id = ? ORDER BY created_at DESC, id")
            .bind(brand_id)
            .fetch_all(self.pool())
            .await
            .map_err(StorageError::from)?;
        bounties_from_rows(rows)
    }

    async fn active_bounties(&self, niche: Option<&str>) -> Result<Vec<Bounty>, EscrowError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM bounties
            WHERE status = ? AND (? IS NULL OR niche = ?)
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(BountyStatus::Active.to_string())
        .bind(niche)
        .bind(niche)
        .fetch_all(self.pool())
        .await
        .map_err(StorageError::from)?;
        bounties_from_rows(rows)
    }

    async fn close_bounty(&self, bounty_id: &str) -> Result<Bounty, EscrowError> {
        let mut tx = self.begin_write().await?;
        let mut bounty = load_bounty(&mut tx, bounty_id).await?;
        if !bounty.is_active() {
            return Err(EscrowError::BountyClosed(bounty_id.to_string()));
        }
        bounty.close();
        save_bounty(&mut tx, &bounty).await?;
        tx.commit().await.map_err(StorageError::from)?;
        Ok(bounty)
    }

    async fn insert_claim(&self, claim: &BountyClaim) -> Result<ClaimInsert, EscrowError> {
        let result = sqlx::query(
            r#"
            INSERT INTO bounty_claims (id, bounty_id, promoter_id, proof_metrics, payout_amount, status,
                                       rejection_reason, payment_reference, ledger_entry_id,
                                       idempotency_key, claimed_at, resolved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(idempotency_key) DO NOTHING
            "#,
        )
        .bind(&claim.id)
        .bind(&claim.bounty_id)
        .bind(&claim.promoter_id)
        .bind(serde_json::to_string(&claim.proof_metrics).map_err(StorageError::from)?)
        .bind(claim.payout_amount.value().to_string())
        .bind(claim.status.to_string())
        .bind(&claim.rejection_reason)
        .bind(&claim.payment_reference)
        .bind(&claim.ledger_entry_id)
        .bind(claim.idempotency_key.as_ref().map(|k| k.as_str().to_string()))
        .bind(ts(&claim.claimed_at))
        .bind(opt_ts(&claim.resolved_at))
        .execute(self.pool())
        .await
        .map_err(StorageError::from)?;

        if result.rows_affected() > 0 {
            return Ok(ClaimInsert::Inserted);
        }

        let key = claim
            .idempotency_key
            .as_ref()
            .ok_or_else(|| EscrowError::Storage(format!("claim {} was not inserted", claim.id)))?;
        let row = sqlx::query("SELECT * FROM bounty_claims WHERE idempotency_key = ?")
            .bind(key.as_str())
            .fetch_one(self.pool())
            .await
            .map_err(StorageError::from)?;
        Ok(ClaimInsert::Existing(claim_from_row(&row)?))
    }

    async fn get_claim(&self, claim_id: &str) -> Result<Option<BountyClaim>, EscrowError> {
        let row = sqlx::query("SELECT * FROM bounty_claims WHERE id = ?")
            .bind(claim_id)
            .fetch_optional(self.pool())
            .await
            .map_err(StorageError::from)?;
        Ok(row.as_ref().map(claim_from_row).transpose()?)
    }

    async fn claims_for_bounty(&self, bounty_id: &str) -> Result<Vec<BountyClaim>, EscrowError> {
        let mut conn = self.pool().acquire().await.map_err(StorageError::from)?;
        Ok(load_claims(&mut conn, bounty_id).await?)
    }

    async fn reserve(
        &self,
        claim_id: &str,
        amount: Credits,
        exclusive: bool,
    ) -> Result<Bounty, EscrowError> {
        let mut tx = self.begin_write().await?;
        let mut claim = load_claim(&mut tx, claim_id).await?;

        if exclusive {
            let others = load_claims(&mut tx, &claim.bounty_id).await?;
            if others.iter().any(|other| competes_with(&claim, other)) {
                return Err(EscrowError::DuplicateClaim {
                    bounty_id: claim.bounty_id.clone(),
                    promoter_id: claim.promoter_id.clone(),
                });
            }
        }

        let mut bounty = load_bounty(&mut tx, &claim.bounty_id).await?;
        bounty.reserve(amount)?;
        claim.payout_amount = amount;

        save_bounty(&mut tx, &bounty).await?;
        save_claim(&mut tx, &claim).await?;
        tx.commit().await.map_err(StorageError::from)?;
        Ok(bounty)
    }

    async fn release(&self, claim_id: &str, reason: &str) -> Result<Bounty, EscrowError> {
        let mut tx = self.begin_write().await?;
        let mut claim = load_claim(&mut tx, claim_id).await?;
        let mut bounty = load_bounty(&mut tx, &claim.bounty_id).await?;

        if is_reserved(&claim) {
            bounty.release(claim.payout_amount);
        }
        claim.reject(reason);

        save_bounty(&mut tx, &bounty).await?;
        save_claim(&mut tx, &claim).await?;
        tx.commit().await.map_err(StorageError::from)?;
        Ok(bounty)
    }

    async fn reject_claim(&self, claim_id: &str, reason: &str) -> Result<BountyClaim, EscrowError> {
        let mut tx = self.begin_write().await?;
        let mut claim = load_claim(&mut tx, claim_id).await?;
        claim.reject(reason);
        save_claim(&mut tx, &claim).await?;
        tx.commit().await.map_err(StorageError::from)?;
        Ok(claim)
    }

    async fn approve(
        &self,
        claim_id: &str,
        payment_reference: Option<String>,
        ledger_entry_id: &str,
    ) -> Result<Approval, EscrowError> {
        let mut tx = self.begin_write().await?;
        let mut claim = load_claim(&mut tx, claim_id).await?;
        claim.approve(payment_reference, ledger_entry_id.to_string());

        let others_reserved = load_claims(&mut tx, &claim.bounty_id)
            .await?
            .iter()
            .any(|c| c.id != claim.id && is_reserved(c));

        let mut bounty = load_bounty(&mut tx, &claim.bounty_id).await?;
        let closed_bounty = settles(&bounty, others_reserved);
        if closed_bounty {
            bounty.close();
        }

        save_claim(&mut tx, &claim).await?;
        save_bounty(&mut tx, &bounty).await?;
        tx.commit().await.map_err(StorageError::from)?;

        Ok(Approval {
            claim,
            bounty,
            closed_bounty,
        })
    }
}
