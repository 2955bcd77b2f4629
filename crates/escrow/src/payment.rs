//! Payment capabilities - external money movement
//!
//! Two seams, both treated as black boxes with bounded timeouts:
//! - `PaymentCapability`: brand-side funding (authorize the pool once, capture
//!   each claim's payout against that authorization)
//! - `PayoutProvider`: creator-side cash out of redeemed credits
//!
//! The sandbox implementations approve everything unless told to fail, and
//! record what they were asked to do.

use async_trait::async_trait;
use growth_core::Credits;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),
}

/// Result of capturing an authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureReceipt {
    pub success: bool,
    pub reference: Option<String>,
}

#[async_trait]
pub trait PaymentCapability: Send + Sync {
    fn name(&self) -> &str;

    /// Place a hold of `amount` on the funding reference; returns an authorization token
    async fn authorize(
        &self,
        payment_method_ref: &str,
        amount: Credits,
    ) -> Result<String, PaymentError>;

    /// Collect `amount` of the funds held by `token`.
    ///
    /// One authorization may be captured in several parts up to its total.
    async fn capture(&self, token: &str, amount: Credits) -> Result<CaptureReceipt, PaymentError>;
}

/// Payout account state at the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub connected: bool,
    pub payouts_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub reference: String,
    pub amount: Credits,
    pub currency: String,
}

#[async_trait]
pub trait PayoutProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn account_status(&self, user_id: &str) -> Result<AccountStatus, PaymentError>;

    async fn create_payout(
        &self,
        user_id: &str,
        amount: Credits,
        currency: &str,
    ) -> Result<PayoutReceipt, PaymentError>;
}

/// Sandbox funding gateway.
///
/// Captures beyond what a token authorized are declined. Tokens it did not
/// issue (for example, before a restart) are captured without that check.
#[derive(Debug, Default)]
pub struct SandboxPaymentGateway {
    fail_authorize: AtomicBool,
    fail_capture: AtomicBool,
    /// Artificial latency in millis, applied to every call
    delay_ms: AtomicU64,
    next_id: AtomicU64,
    authorized: Mutex<HashMap<String, Credits>>,
    captured: Mutex<Vec<(String, Credits)>>,
}

impl SandboxPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_authorize(&self, fail: bool) {
        self.fail_authorize.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_capture(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Captures so far, as (token, amount)
    pub fn captured(&self) -> Vec<(String, Credits)> {
        self.captured.lock().unwrap().clone()
    }

    /// Number of authorizations issued
    pub fn authorizations(&self) -> usize {
        self.authorized.lock().unwrap().len()
    }

    /// Amount already captured against `token`
    pub fn captured_total(&self, token: &str) -> Credits {
        captured_for(&self.captured.lock().unwrap(), token)
    }

    async fn simulate_latency(&self) {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

fn captured_for(captured: &[(String, Credits)], token: &str) -> Credits {
    captured
        .iter()
        .filter(|(t, _)| t == token)
        .map(|(_, amount)| *amount)
        .sum()
}

#[async_trait]
impl PaymentCapability for SandboxPaymentGateway {
    fn name(&self) -> &str {
        "Sandbox"
    }

    async fn authorize(
        &self,
        payment_method_ref: &str,
        amount: Credits,
    ) -> Result<String, PaymentError> {
        self.simulate_latency().await;
        if self.fail_authorize.load(Ordering::SeqCst) {
            return Err(PaymentError::Declined(format!(
                "{} declined for {}",
                payment_method_ref, amount
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("auth_{}_{}", payment_method_ref, id);
        self.authorized.lock().unwrap().insert(token.clone(), amount);
        Ok(token)
    }

    async fn capture(&self, token: &str, amount: Credits) -> Result<CaptureReceipt, PaymentError> {
        self.simulate_latency().await;
        let declined = CaptureReceipt {
            success: false,
            reference: None,
        };
        if self.fail_capture.load(Ordering::SeqCst) {
            return Ok(declined);
        }

        let limit = self.authorized.lock().unwrap().get(token).copied();
        let mut captured = self.captured.lock().unwrap();
        if let Some(limit) = limit {
            let within = captured_for(&captured, token)
                .checked_add(&amount)
                .is_some_and(|total| total <= limit);
            if !within {
                return Ok(declined);
            }
        }
        captured.push((token.to_string(), amount));
        Ok(CaptureReceipt {
            success: true,
            reference: Some(format!("cap_{}_{}", token, captured.len())),
        })
    }
}

/// Sandbox payout provider
#[derive(Debug, Default)]
pub struct SandboxPayoutProvider {
    fail_payouts: AtomicBool,
    next_id: AtomicU64,
    payouts: Mutex<Vec<PayoutReceipt>>,
}

impl SandboxPayoutProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_payouts(&self, fail: bool) {
        self.fail_payouts.store(fail, Ordering::SeqCst);
    }

    pub fn payouts(&self) -> Vec<PayoutReceipt> {
        self.payouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PayoutProvider for SandboxPayoutProvider {
    fn name(&self) -> &str {
        "Sandbox"
    }

    async fn account_status(&self, _user_id: &str) -> Result<AccountStatus, PaymentError> {
        Ok(AccountStatus {
            connected: true,
            payouts_enabled: !self.fail_payouts.load(Ordering::SeqCst),
        })
    }

    async fn create_payout(
        &self,
        user_id: &str,
        amount: Credits,
        currency: &str,
    ) -> Result<PayoutReceipt, PaymentError> {
        if self.fail_payouts.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable(format!("payouts disabled for {}", user_id)));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let receipt = PayoutReceipt {
            reference: format!("payout_{}_{}", user_id, id),
            amount,
            currency: currency.to_string(),
        };
        self.payouts.lock().unwrap().push(receipt.clone());
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn credits(v: rust_decimal::Decimal) -> Credits {
        Credits::new(v).unwrap()
    }

    #[tokio::test]
    async fn test_sandbox_partial_captures_up_to_authorization() {
        let gateway = SandboxPaymentGateway::new();
        let token = gateway.authorize("pm_1", credits(dec!(10))).await.unwrap();

        let first = gateway.capture(&token, credits(dec!(4))).await.unwrap();
        let second = gateway.capture(&token, credits(dec!(6))).await.unwrap();
        assert!(first.success && second.success);
        assert_ne!(first.reference, second.reference);
        assert_eq!(gateway.captured_total(&token).value(), dec!(10));

        let over = gateway.capture(&token, credits(dec!(0.01))).await.unwrap();
        assert!(!over.success);
        assert_eq!(gateway.captured().len(), 2);
    }

    #[tokio::test]
    async fn test_sandbox_failures() {
        let gateway = SandboxPaymentGateway::new();
        gateway.set_fail_authorize(true);
        assert!(gateway.authorize("pm_1", Credits::ZERO).await.is_err());

        gateway.set_fail_capture(true);
        let receipt = gateway.capture("auth_x", credits(dec!(1))).await.unwrap();
        assert!(!receipt.success);
        assert!(gateway.captured().is_empty());
    }

    #[tokio::test]
    async fn test_sandbox_payouts() {
        let provider = SandboxPayoutProvider::new();
        assert!(provider.account_status("u1").await.unwrap().payouts_enabled);

        let receipt = provider
            .create_payout("u1", Credits::new(dec!(9)).unwrap(), "USD")
            .await
            .unwrap();
        assert_eq!(receipt.amount.value(), dec!(9));
        assert_eq!(provider.payouts().len(), 1);

        provider.set_fail_payouts(true);
        assert!(!provider.account_status("u1").await.unwrap().payouts_enabled);
        assert!(provider
            .create_payout("u1", Credits::new(dec!(1)).unwrap(), "USD")
            .await
            .is_err());
    }
}
