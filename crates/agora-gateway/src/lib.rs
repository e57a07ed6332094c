//! Agora Gateway - Payment Provider Abstraction
//!
//! The marketplace core needs exactly four verbs from any payment provider:
//! authorize (hold), capture, refund, and transfer-to-seller. This crate
//! defines that interface, the wire-format conversions at the boundary
//! (minor-unit integers, lowercase ISO codes), a deadline/retry wrapper, and
//! an in-memory mock for tests.
//!
//! Amounts cross the boundary as scaled integers in the provider's minor
//! unit. Unknown inbound currency codes default to USD here - the core
//! itself rejects unknown currencies long before this point.

mod mock;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use agora_types::{Amount, AuthRef, Currency, MarketError, Result, TransactionId, TransferRef};

pub use mock::MockGateway;

// ============================================================================
// Wire conversions
// ============================================================================

/// Convert an amount to the gateway wire format: (minor units, lowercase code)
pub fn wire_amount(amount: Amount) -> (i64, String) {
    (amount.minor, amount.currency.wire_code().to_string())
}

/// Decode a wire currency code; unknown codes default to USD at this boundary
pub fn currency_from_wire(code: &str) -> Currency {
    Currency::parse_code(code).unwrap_or(Currency::USD)
}

// ============================================================================
// Requests
// ============================================================================

/// Request to hold funds for a transaction
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub transaction_id: TransactionId,
    /// Provider-side reference for the buyer
    pub buyer_ref: String,
    /// Provider-side reference for the seller
    pub seller_ref: String,
    /// Amount in minor units
    pub amount_minor: i64,
    /// Lowercase three-letter currency code
    pub currency: String,
}

/// Request to move captured funds to the seller
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub seller_ref: String,
    pub amount_minor: i64,
    pub currency: String,
    /// Capture this transfer draws from, when the provider supports linking
    pub source: Option<AuthRef>,
}

// ============================================================================
// Gateway interface
// ============================================================================

/// The four verbs the core requires from any payment provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Place a hold on the buyer's funds; returns the authorization reference
    async fn authorize(&self, request: AuthorizeRequest) -> Result<AuthRef>;

    /// Capture a held authorization
    async fn capture(&self, auth: &AuthRef) -> Result<()>;

    /// Refund against an authorization; `None` refunds the full hold
    async fn refund(&self, auth: &AuthRef, amount_minor: Option<i64>) -> Result<()>;

    /// Transfer funds to the seller's connected account
    async fn transfer(&self, request: TransferRequest) -> Result<TransferRef>;
}

// ============================================================================
// Deadline and retry wrapper
// ============================================================================

/// Wraps a gateway with a per-call deadline and a single internal retry for
/// the idempotent verbs (capture and refund, keyed by the auth reference)
///
/// Every external call must observe a bounded timeout: the transaction FSM
/// holds a per-transaction lock while talking to the provider.
pub struct DeadlineGateway {
    inner: Arc<dyn PaymentGateway>,
    deadline: Duration,
}

impl DeadlineGateway {
    pub fn new(inner: Arc<dyn PaymentGateway>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    async fn bounded<T, F>(&self, verb: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(verb, deadline_ms = self.deadline.as_millis() as u64, "gateway call timed out");
                Err(MarketError::gateway(verb, "deadline exceeded"))
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for DeadlineGateway {
    async fn authorize(&self, request: AuthorizeRequest) -> Result<AuthRef> {
        self.bounded("authorize", self.inner.authorize(request)).await
    }

    async fn capture(&self, auth: &AuthRef) -> Result<()> {
        match self.bounded("capture", self.inner.capture(auth)).await {
            Err(e) if e.is_retriable() => {
                tracing::warn!(auth = %auth, error = %e, "retrying capture once");
                self.bounded("capture", self.inner.capture(auth)).await
            }
            other => other,
        }
    }

    async fn refund(&self, auth: &AuthRef, amount_minor: Option<i64>) -> Result<()> {
        match self
            .bounded("refund", self.inner.refund(auth, amount_minor))
            .await
        {
            Err(e) if e.is_retriable() => {
                tracing::warn!(auth = %auth, error = %e, "retrying refund once");
                self.bounded("refund", self.inner.refund(auth, amount_minor))
                    .await
            }
            other => other,
        }
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TransferRef> {
        self.bounded("transfer", self.inner.transfer(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_amount() {
        let (minor, code) = wire_amount(Amount::new(10_050, Currency::GBP));
        assert_eq!(minor, 10_050);
        assert_eq!(code, "gbp");
    }

    #[test]
    fn test_unknown_wire_currency_defaults_to_usd() {
        assert_eq!(currency_from_wire("eur"), Currency::EUR);
        assert_eq!(currency_from_wire("jpy"), Currency::USD);
        assert_eq!(currency_from_wire(""), Currency::USD);
    }

    #[tokio::test]
    async fn test_deadline_times_out_slow_gateway() {
        let mock = Arc::new(MockGateway::new());
        mock.set_latency(Duration::from_millis(200));
        let gateway = DeadlineGateway::new(mock, Duration::from_millis(20));

        let result = gateway
            .authorize(AuthorizeRequest {
                transaction_id: TransactionId::new(),
                buyer_ref: "buyer".into(),
                seller_ref: "seller".into(),
                amount_minor: 1_000,
                currency: "usd".into(),
            })
            .await;

        assert!(matches!(result, Err(MarketError::Gateway { .. })));
    }

    #[tokio::test]
    async fn test_capture_retried_once_on_retriable_failure() {
        let mock = Arc::new(MockGateway::new());
        let auth = mock
            .authorize(AuthorizeRequest {
                transaction_id: TransactionId::new(),
                buyer_ref: "buyer".into(),
                seller_ref: "seller".into(),
                amount_minor: 1_000,
                currency: "usd".into(),
            })
            .await
            .unwrap();

        mock.fail_next_capture();
        let gateway = DeadlineGateway::new(mock.clone(), Duration::from_secs(1));

        gateway.capture(&auth).await.unwrap();
        // First attempt failed, the retry succeeded
        assert_eq!(mock.capture_attempts(), 2);
        assert_eq!(mock.captured(), vec![auth]);
    }
}
