//! CLI commands
//!
//! Each command prints a human-readable summary and returns the typed result.

use growth_core::{Credits, IdempotencyKey};
use growth_escrow::{Bounty, ClaimResult, RedemptionResult};
use growth_ledger::{AwardResult, LedgerEntry, RedeemResult, ReplayedBalance};
use growth_pricing::{EngagementEvent, EngagementKind, EngagementMetadata, PriceQuote};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::context::AppContext;

fn key(raw: Option<&str>) -> Option<IdempotencyKey> {
    raw.map(IdempotencyKey::from)
}

/// Award growth credits to a user
pub async fn award(
    ctx: &AppContext,
    user_id: &str,
    amount: Decimal,
    source: &str,
    idempotency_key: Option<&str>,
) -> Result<AwardResult, anyhow::Error> {
    let result = ctx
        .ledger
        .award(user_id, amount, source, key(idempotency_key))
        .await?;

    let replay = if result.replayed { " (replayed)" } else { "" };
    println!(
        "✅ Awarded {} credits to {} from {}{} (balance: {})",
        result.amount, user_id, source, replay, result.balance_after
    );
    Ok(result)
}

/// Redeem credits from a user's balance (ledger only, no payout)
pub async fn redeem(
    ctx: &AppContext,
    user_id: &str,
    amount: Decimal,
    idempotency_key: Option<&str>,
) -> Result<RedeemResult, anyhow::Error> {
    let result = ctx
        .ledger
        .redeem(user_id, amount, key(idempotency_key))
        .await?;

    println!(
        "✅ Redeemed {} credits from {}: fee {}, net {} (balance: {})",
        result.redeemed, user_id, result.fee, result.net_value, result.balance_after
    );
    Ok(result)
}

/// Get balance for a user
pub async fn balance(ctx: &AppContext, user_id: &str) -> Result<Credits, anyhow::Error> {
    let balance = ctx.ledger.balance(user_id).await?;
    println!("Balance for {}: {} growth credits", user_id, balance);
    Ok(balance)
}

/// Show a user's most recent ledger entries
pub async fn history(
    ctx: &AppContext,
    user_id: &str,
    limit: usize,
) -> Result<Vec<LedgerEntry>, anyhow::Error> {
    let entries = ctx.ledger.history(user_id).await?;
    let skip = entries.len().saturating_sub(limit);
    let recent: Vec<LedgerEntry> = entries.into_iter().skip(skip).collect();

    if recent.is_empty() {
        println!("No ledger entries for {}", user_id);
        return Ok(recent);
    }

    println!("📜 Ledger for {} ({} entries)", user_id, recent.len());
    println!("{:-<90}", "");
    println!(
        "{:<5} {:<20} {:<8} {:<18} {:>12} {:>12}",
        "SEQ", "TIME", "TYPE", "SOURCE", "AMOUNT", "BALANCE"
    );
    println!("{:-<90}", "");
    for entry in &recent {
        println!(
            "{:<5} {:<20} {:<8} {:<18} {:>12} {:>12}",
            entry.sequence,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.entry_type,
            entry.source,
            entry.amount,
            entry.balance_after
        );
    }
    Ok(recent)
}

/// Replay the ledger and compare with stored balances
pub async fn audit(
    ctx: &AppContext,
    user_id: Option<&str>,
) -> Result<BTreeMap<String, ReplayedBalance>, anyhow::Error> {
    let replayed = match user_id {
        Some(user_id) => {
            let result = ctx.ledger.verify_user(user_id).await?;
            BTreeMap::from([(user_id.to_string(), result)])
        }
        None => ctx.ledger.audit_all().await?,
    };

    let entries: usize = replayed.values().map(|r| r.entries).sum();
    println!(
        "✅ Ledger verified ({} users, {} entries)",
        replayed.len(),
        entries
    );
    for (user, result) in &replayed {
        println!(
            "   {}: balance {}, credited {}, debited {}, fees {}",
            user, result.balance, result.total_credited, result.total_debited, result.total_fees
        );
    }
    Ok(replayed)
}

/// Record an engagement event and bump the velocity counter
pub async fn engage(
    ctx: &AppContext,
    creator_id: &str,
    content_id: &str,
    kind: EngagementKind,
    value: u64,
    metadata: EngagementMetadata,
) -> Result<EngagementEvent, anyhow::Error> {
    let event = ctx
        .engagement
        .record(creator_id, content_id, kind, value, metadata)
        .await?;
    let velocity = ctx.pricing.velocity().read().await?.count;

    println!(
        "✅ Recorded {} x{} on {} for {} [{}] (velocity: {})",
        event.kind, event.value, content_id, creator_id, event.niche, velocity
    );
    Ok(event)
}

/// Show the most recent engagement events
pub async fn engagements(
    ctx: &AppContext,
    limit: usize,
) -> Result<Vec<EngagementEvent>, anyhow::Error> {
    let events = ctx.engagement.recent(limit).await?;

    println!("📈 {} recent engagement event(s)", events.len());
    for event in &events {
        println!(
            "   {} {} x{} on {} by {} [{}]",
            event.timestamp, event.kind, event.value, event.content_id, event.creator_id, event.niche
        );
    }
    Ok(events)
}

/// Quote an engagement block at the current velocity
pub async fn price(
    ctx: &AppContext,
    niche: &str,
    block_size: Option<u64>,
) -> Result<PriceQuote, anyhow::Error> {
    let block_size = block_size.unwrap_or(ctx.pricing.config().default_block_size);
    let quote = ctx.pricing.calculate_block_price(niche, block_size).await?;

    println!(
        "💲 {} units of {}: {} {}",
        quote.block_size, quote.niche, quote.price, quote.currency
    );
    println!(
        "   base {} × surge {} × niche {} (velocity {})",
        quote.breakdown.base,
        quote.breakdown.surge_multiplier,
        quote.breakdown.niche_multiplier,
        quote.breakdown.velocity
    );
    Ok(quote)
}

fn print_bounty(bounty: &Bounty) {
    println!(
        "   {} [{}] {} by {}: pool {} / claimed {} / remaining {}",
        bounty.id,
        bounty.status,
        bounty.niche,
        bounty.brand_id,
        bounty.net_pool,
        bounty.claimed_amount,
        bounty.remaining()
    );
}

/// Fund a new bounty pool
pub async fn create_bounty(
    ctx: &AppContext,
    brand_id: &str,
    niche: &str,
    amount: Decimal,
    payment_method_ref: &str,
) -> Result<Bounty, anyhow::Error> {
    let bounty = ctx
        .escrow
        .create_bounty(brand_id, niche, amount, payment_method_ref)
        .await?;

    println!(
        "✅ Created bounty {} for {}: total {}, fee {}, pool {}",
        bounty.id, bounty.niche, bounty.total_amount, bounty.protocol_fee, bounty.net_pool
    );
    Ok(bounty)
}

/// Buy a legacy engagement block (converted into a bounty)
pub async fn purchase_block(
    ctx: &AppContext,
    brand_id: &str,
    niche: &str,
    block_size: u64,
    payment_method_ref: &str,
) -> Result<Bounty, anyhow::Error> {
    let bounty = ctx
        .escrow
        .purchase_block(brand_id, niche, block_size, payment_method_ref)
        .await?;

    println!(
        "✅ Purchased {} units of {} as bounty {} (total {})",
        block_size, bounty.niche, bounty.id, bounty.total_amount
    );
    Ok(bounty)
}

/// Claim a payout from a bounty; `proof` is a JSON object of reach metrics
pub async fn claim_bounty(
    ctx: &AppContext,
    promoter_id: &str,
    bounty_id: &str,
    proof: &str,
    idempotency_key: Option<&str>,
) -> Result<ClaimResult, anyhow::Error> {
    let proof_metrics: serde_json::Value = serde_json::from_str(proof)?;
    let result = ctx
        .escrow
        .claim_bounty(promoter_id, bounty_id, proof_metrics, key(idempotency_key))
        .await?;

    println!(
        "✅ Claim {} approved: {} credits to {}",
        result.claim_id, result.payout_amount, promoter_id
    );
    if result.bounty_closed {
        println!("   Bounty {} is now closed", bounty_id);
    }
    Ok(result)
}

/// Close a bounty on behalf of its funder
pub async fn close_bounty(
    ctx: &AppContext,
    bounty_id: &str,
    brand_id: &str,
) -> Result<Bounty, anyhow::Error> {
    let bounty = ctx.escrow.close_bounty(bounty_id, brand_id).await?;
    println!(
        "✅ Closed bounty {} ({} of {} paid out)",
        bounty.id, bounty.claimed_amount, bounty.net_pool
    );
    Ok(bounty)
}

/// List a brand's portfolio, or the active board (optionally for one niche)
pub async fn bounties(
    ctx: &AppContext,
    brand_id: Option<&str>,
    niche: Option<&str>,
) -> Result<Vec<Bounty>, anyhow::Error> {
    let bounties = match brand_id {
        Some(brand_id) => ctx.escrow.bounties_for_brand(brand_id).await?,
        None => ctx.escrow.active_bounties(niche).await?,
    };

    if bounties.is_empty() {
        println!("No bounties found");
        return Ok(bounties);
    }

    println!("🎯 {} bounties", bounties.len());
    for bounty in &bounties {
        print_bounty(bounty);
    }
    Ok(bounties)
}

/// Cash out credits through the payout provider
pub async fn redeem_credits(
    ctx: &AppContext,
    creator_id: &str,
    amount: Decimal,
    idempotency_key: Option<&str>,
) -> Result<RedemptionResult, anyhow::Error> {
    let result = ctx
        .escrow
        .redeem_credits(creator_id, amount, key(idempotency_key))
        .await?;

    println!(
        "✅ Redeemed {} credits: fee {}, payout {} {} (balance: {})",
        result.redeemed, result.fee, result.payout, result.currency, result.balance_after
    );
    match &result.payout_reference {
        Some(reference) => println!("   Payout reference: {}", reference),
        None if result.replayed => println!("   Replayed redemption, no new payout"),
        None => println!("⚠️  Payout was not sent; credits were debited"),
    }
    Ok(result)
}
