//! In-memory gateway for tests and local development
//!
//! Records every call, supports scripted one-shot failures and artificial
//! latency, and treats capture as idempotent on the authorization reference
//! the way real providers do.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use agora_types::{AuthRef, MarketError, Result, TransferRef};

use crate::{AuthorizeRequest, PaymentGateway, TransferRequest};

#[derive(Debug, Clone)]
struct Authorization {
    request: AuthorizeRequest,
    captured: bool,
}

#[derive(Default)]
struct MockState {
    authorizations: Vec<(AuthRef, Authorization)>,
    capture_attempts: u32,
    refunds: Vec<(AuthRef, Option<i64>)>,
    transfers: Vec<TransferRequest>,
    fail_next_authorize: bool,
    fail_next_capture: bool,
    fail_next_refund: bool,
    fail_next_transfer: bool,
    latency: Option<Duration>,
}

/// Scriptable in-memory payment gateway
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next authorize call fail
    pub fn fail_next_authorize(&self) {
        self.state.lock().unwrap().fail_next_authorize = true;
    }

    /// Make the next capture call fail with a retriable error
    pub fn fail_next_capture(&self) {
        self.state.lock().unwrap().fail_next_capture = true;
    }

    /// Make the next refund call fail with a retriable error
    pub fn fail_next_refund(&self) {
        self.state.lock().unwrap().fail_next_refund = true;
    }

    /// Make the next transfer call fail
    pub fn fail_next_transfer(&self) {
        self.state.lock().unwrap().fail_next_transfer = true;
    }

    /// Delay every call by the given duration
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = Some(latency);
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().unwrap().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Authorization references issued so far
    pub fn authorizations(&self) -> Vec<AuthRef> {
        self.state
            .lock()
            .unwrap()
            .authorizations
            .iter()
            .map(|(auth, _)| auth.clone())
            .collect()
    }

    /// Authorizations that have been captured
    pub fn captured(&self) -> Vec<AuthRef> {
        self.state
            .lock()
            .unwrap()
            .authorizations
            .iter()
            .filter(|(_, a)| a.captured)
            .map(|(auth, _)| auth.clone())
            .collect()
    }

    /// Total capture calls, including failed and idempotent-repeat ones
    pub fn capture_attempts(&self) -> u32 {
        self.state.lock().unwrap().capture_attempts
    }

    /// Minor-unit amount held under an authorization
    pub fn authorized_amount(&self, auth: &AuthRef) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .authorizations
            .iter()
            .find(|(a, _)| a == auth)
            .map(|(_, a)| a.request.amount_minor)
    }

    /// Refund calls recorded, in order
    pub fn refunds(&self) -> Vec<(AuthRef, Option<i64>)> {
        self.state.lock().unwrap().refunds.clone()
    }

    /// Transfer requests recorded, in order
    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.state.lock().unwrap().transfers.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn authorize(&self, request: AuthorizeRequest) -> Result<AuthRef> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_authorize) {
            return Err(MarketError::gateway("authorize", "card declined"));
        }
        if request.amount_minor <= 0 {
            return Err(MarketError::gateway("authorize", "invalid amount"));
        }

        let auth = AuthRef::new(format!("auth_{}", Uuid::new_v4()));
        state.authorizations.push((
            auth.clone(),
            Authorization {
                request,
                captured: false,
            },
        ));
        Ok(auth)
    }

    async fn capture(&self, auth: &AuthRef) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        state.capture_attempts += 1;
        if std::mem::take(&mut state.fail_next_capture) {
            return Err(MarketError::gateway("capture", "provider unavailable"));
        }

        let authorization = state
            .authorizations
            .iter_mut()
            .find(|(a, _)| a == auth)
            .map(|(_, a)| a)
            .ok_or_else(|| MarketError::gateway("capture", "unknown authorization"))?;
        // Idempotent on the auth reference: a repeated capture is a no-op
        authorization.captured = true;
        Ok(())
    }

    async fn refund(&self, auth: &AuthRef, amount_minor: Option<i64>) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_refund) {
            return Err(MarketError::gateway("refund", "provider unavailable"));
        }

        if !state.authorizations.iter().any(|(a, _)| a == auth) {
            return Err(MarketError::gateway("refund", "unknown authorization"));
        }
        state.refunds.push((auth.clone(), amount_minor));
        Ok(())
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TransferRef> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_transfer) {
            return Err(MarketError::gateway("transfer", "provider unavailable"));
        }
        if request.amount_minor <= 0 {
            return Err(MarketError::gateway("transfer", "invalid amount"));
        }

        state.transfers.push(request);
        Ok(TransferRef::new(format!("transfer_{}", Uuid::new_v4())))
    }
}
