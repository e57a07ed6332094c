//! Transaction lifecycle service
//!
//! Drives transactions through the state machine:
//!
//! ```text
//! Pending   --buyer funds-->        EscrowFunded
//! Pending   --either cancels-->     Cancelled
//! EscrowFunded --seller delivers--> Delivered
//! EscrowFunded --either disputes--> Disputed
//! Delivered --buyer confirms-->     Completed
//! Delivered --either disputes-->    Disputed
//! Delivered --timeout elapses-->    Completed        (auto-confirm policy)
//! Disputed  --resolver refunds-->   Refunded
//! Disputed  --resolver releases-->  Completed
//! ```
//!
//! Every transition runs inside a per-transaction mutex. The funding
//! sequence holds that lock across the gateway call, so the gateway is
//! always wrapped in a bounded deadline; if escrow recording fails after an
//! authorization succeeded, the hold is voided with a compensating refund
//! and no partial outcome persists.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use agora_escrow::EscrowLedger;
use agora_events::EventBus;
use agora_gateway::{
    wire_amount, AuthorizeRequest, DeadlineGateway, PaymentGateway, TransferRequest,
};
use agora_guard::SpendingGuard;
use agora_types::{
    AgentId, Amount, DeliveryProof, DisputeRecord, MarketError, MarketEvent, OfferId, Rating,
    RatingId, RequestId, Resolution, ResolutionOutcome, Result, Trade, Transaction,
    TransactionFilter, TransactionId, TransactionOrigin, TransactionStatus,
};

use crate::store::TransactionStore;
use crate::{ResolverAuthority, TransactionConfig};

/// The escrow-backed transaction state machine
pub struct TransactionService {
    store: Arc<TransactionStore>,
    escrow: Arc<EscrowLedger>,
    guard: Arc<dyn SpendingGuard>,
    gateway: Arc<dyn PaymentGateway>,
    resolvers: Arc<dyn ResolverAuthority>,
    bus: Arc<dyn EventBus>,
    /// Per-transaction critical sections
    locks: Mutex<HashMap<TransactionId, Arc<Mutex<()>>>>,
    ratings: Mutex<HashMap<(TransactionId, AgentId), Rating>>,
    config: TransactionConfig,
}

impl TransactionService {
    /// Build the service; the gateway is wrapped with the configured deadline
    /// and retry policy here so no caller can forget it
    pub fn new(
        store: Arc<TransactionStore>,
        escrow: Arc<EscrowLedger>,
        guard: Arc<dyn SpendingGuard>,
        gateway: Arc<dyn PaymentGateway>,
        resolvers: Arc<dyn ResolverAuthority>,
        bus: Arc<dyn EventBus>,
        config: TransactionConfig,
    ) -> Self {
        let gateway: Arc<dyn PaymentGateway> =
            Arc::new(DeadlineGateway::new(gateway, config.gateway_deadline));
        Self {
            store,
            escrow,
            guard,
            gateway,
            resolvers,
            bus,
            locks: Mutex::new(HashMap::new()),
            ratings: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn store(&self) -> &Arc<TransactionStore> {
        &self.store
    }

    async fn lock_for(&self, id: TransactionId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Publishing is best-effort: the transition has already committed, and
    /// the bus contract is at-least-once with tolerant subscribers
    async fn publish(&self, event: MarketEvent) {
        if let Err(error) = self.bus.publish(event).await {
            warn!(%error, "event publish failed");
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Spawn a transaction from a matched trade
    ///
    /// Idempotent on the trade id: event delivery is at-least-once, so a
    /// redelivered trade returns the transaction it already spawned instead
    /// of creating (and announcing) a second one.
    pub async fn create_from_trade(&self, trade: &Trade) -> Result<Transaction> {
        if let Some(existing) = self.store.find_by_trade(&trade.id).await {
            return Ok(existing);
        }
        let amount = trade.notional()?;
        self.create(
            trade.buyer_id,
            trade.seller_id,
            amount,
            TransactionOrigin::Trade { trade_id: trade.id },
        )
        .await
    }

    /// Create a transaction from a negotiated request/offer agreement
    pub async fn create_negotiated(
        &self,
        buyer: AgentId,
        seller: AgentId,
        amount: Amount,
        request_id: Option<RequestId>,
        offer_id: Option<OfferId>,
    ) -> Result<Transaction> {
        self.create(
            buyer,
            seller,
            amount,
            TransactionOrigin::Negotiated {
                request_id,
                offer_id,
            },
        )
        .await
    }

    async fn create(
        &self,
        buyer: AgentId,
        seller: AgentId,
        amount: Amount,
        origin: TransactionOrigin,
    ) -> Result<Transaction> {
        if !amount.is_positive() {
            return Err(MarketError::validation("amount", "must be positive"));
        }

        let now = Utc::now();
        let transaction = Transaction {
            id: TransactionId::new(),
            buyer_id: buyer,
            seller_id: seller,
            origin,
            amount,
            status: TransactionStatus::Pending,
            auth_ref: None,
            delivery: None,
            dispute: None,
            resolution: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(transaction.clone()).await;
        info!(transaction = %transaction.id, amount = %amount, "transaction created");

        self.publish(MarketEvent::TransactionCreated {
            transaction: transaction.clone(),
        })
        .await;
        Ok(transaction)
    }

    // ========================================================================
    // Funding
    // ========================================================================

    /// Fund escrow: guard check, gateway authorization, escrow record,
    /// status advance - atomic from the observer's perspective
    pub async fn fund(&self, id: TransactionId, actor: AgentId) -> Result<Transaction> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut tx = self.store.get(&id).await?;
        if tx.status != TransactionStatus::Pending {
            return Err(MarketError::invalid_status("fund", tx.status));
        }
        if actor != tx.buyer_id {
            return Err(MarketError::unauthorized("only the buyer can fund escrow"));
        }

        // Spending limits are evaluated before any money is committed; a
        // refusal means no gateway call and no escrow record
        if let Err(error) = self.guard.check(&tx.buyer_id, tx.amount).await {
            self.publish(MarketEvent::FundingRejected {
                transaction_id: id,
                buyer_id: tx.buyer_id,
                amount: tx.amount,
                reason: error.to_string(),
            })
            .await;
            return Err(error);
        }

        let (amount_minor, currency) = wire_amount(tx.amount);
        let auth = self
            .gateway
            .authorize(AuthorizeRequest {
                transaction_id: id,
                buyer_ref: tx.buyer_id.to_string(),
                seller_ref: tx.seller_id.to_string(),
                amount_minor,
                currency,
            })
            .await?;

        if let Err(error) = self.escrow.fund(id, tx.amount, auth.clone()).await {
            // Compensate: the hold must not outlive a failed funding sequence
            warn!(transaction = %id, %error, "escrow record failed after authorization, voiding hold");
            if let Err(void_error) = self.gateway.refund(&auth, None).await {
                warn!(transaction = %id, error = %void_error, "compensating void failed");
            }
            return Err(error);
        }

        tx.auth_ref = Some(auth.clone());
        tx.status = TransactionStatus::EscrowFunded;
        tx.updated_at = Utc::now();
        self.store.put(tx.clone()).await;
        info!(transaction = %id, "escrow funded");

        self.publish(MarketEvent::EscrowFunded {
            transaction_id: id,
            amount: tx.amount,
            auth_ref: auth,
        })
        .await;
        Ok(tx)
    }

    // ========================================================================
    // Delivery and confirmation
    // ========================================================================

    /// Seller attaches delivery proof
    pub async fn deliver(
        &self,
        id: TransactionId,
        actor: AgentId,
        proof: String,
        message: Option<String>,
    ) -> Result<Transaction> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut tx = self.store.get(&id).await?;
        if tx.status != TransactionStatus::EscrowFunded {
            return Err(MarketError::invalid_status("deliver", tx.status));
        }
        if actor != tx.seller_id {
            return Err(MarketError::unauthorized("only the seller can deliver"));
        }

        tx.delivery = Some(DeliveryProof {
            proof,
            message,
            delivered_at: Utc::now(),
        });
        tx.status = TransactionStatus::Delivered;
        tx.updated_at = Utc::now();
        self.store.put(tx.clone()).await;

        self.publish(MarketEvent::Delivered {
            transaction_id: id,
            seller_id: tx.seller_id,
        })
        .await;
        Ok(tx)
    }

    /// Buyer confirms receipt; escrow settles to the seller
    pub async fn confirm(&self, id: TransactionId, actor: AgentId) -> Result<Transaction> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut tx = self.store.get(&id).await?;
        if tx.status != TransactionStatus::Delivered {
            return Err(MarketError::invalid_status("confirm", tx.status));
        }
        if actor != tx.buyer_id {
            return Err(MarketError::unauthorized("only the buyer can confirm"));
        }

        self.settle_completion(&mut tx).await?;
        Ok(tx)
    }

    /// Capture, fee split, seller transfer, escrow release, status advance
    ///
    /// Capture and refund are idempotent at the gateway (keyed by the auth
    /// reference), so a retry after a mid-sequence failure is safe.
    async fn settle_completion(&self, tx: &mut Transaction) -> Result<()> {
        let auth = tx
            .auth_ref
            .clone()
            .ok_or_else(|| MarketError::internal("funded transaction without auth_ref"))?;

        self.gateway.capture(&auth).await?;

        let (fee, seller_portion) = tx.amount.split_fee(self.config.platform_fee_bps)?;
        if seller_portion.is_positive() {
            let (amount_minor, currency) = wire_amount(seller_portion);
            self.gateway
                .transfer(TransferRequest {
                    seller_ref: tx.seller_id.to_string(),
                    amount_minor,
                    currency,
                    source: Some(auth.clone()),
                })
                .await?;
        }

        self.escrow.release(&tx.id).await?;

        tx.status = TransactionStatus::Completed;
        tx.updated_at = Utc::now();
        self.store.put(tx.clone()).await;
        info!(transaction = %tx.id, fee = %fee, seller_portion = %seller_portion, "transaction completed");

        self.publish(MarketEvent::Completed {
            transaction_id: tx.id,
            amount: tx.amount,
            platform_fee: fee,
            seller_portion,
        })
        .await;
        Ok(())
    }

    /// Auto-confirm sweep: Delivered transactions older than the configured
    /// window settle as completions. Returns how many settled.
    pub async fn run_auto_confirm(&self, now: DateTime<Utc>) -> Result<usize> {
        let window = match self.config.auto_confirm_after {
            Some(window) => window,
            None => return Ok(0),
        };

        let candidates: Vec<TransactionId> = self
            .store
            .all()
            .await
            .into_iter()
            .filter(|tx| {
                tx.status == TransactionStatus::Delivered
                    && tx
                        .delivery
                        .as_ref()
                        .is_some_and(|d| d.delivered_at + window <= now)
            })
            .map(|tx| tx.id)
            .collect();

        let mut settled = 0;
        for id in candidates {
            let lock = self.lock_for(id).await;
            let _guard = lock.lock().await;

            let mut tx = self.store.get(&id).await?;
            // Re-check under the lock; a confirm or dispute may have won
            if tx.status != TransactionStatus::Delivered {
                continue;
            }
            match self.settle_completion(&mut tx).await {
                Ok(()) => {
                    info!(transaction = %id, "auto-confirmed");
                    settled += 1;
                }
                Err(error) => {
                    // Leave it Delivered; the next sweep retries
                    warn!(transaction = %id, %error, "auto-confirm settlement failed");
                }
            }
        }
        Ok(settled)
    }

    // ========================================================================
    // Disputes
    // ========================================================================

    /// Either party freezes the transaction for resolution
    pub async fn dispute(
        &self,
        id: TransactionId,
        actor: AgentId,
        reason: String,
        description: String,
    ) -> Result<Transaction> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut tx = self.store.get(&id).await?;
        if !matches!(
            tx.status,
            TransactionStatus::EscrowFunded | TransactionStatus::Delivered
        ) {
            return Err(MarketError::invalid_status("dispute", tx.status));
        }
        if tx.role_of(&actor).is_none() {
            return Err(MarketError::unauthorized(
                "only the buyer or seller can dispute",
            ));
        }

        self.escrow.mark_disputed(&id).await?;

        tx.dispute = Some(DisputeRecord {
            opened_by: actor,
            reason: reason.clone(),
            description,
            opened_at: Utc::now(),
        });
        tx.status = TransactionStatus::Disputed;
        tx.updated_at = Utc::now();
        self.store.put(tx.clone()).await;

        self.publish(MarketEvent::Disputed {
            transaction_id: id,
            opened_by: actor,
            reason,
        })
        .await;
        Ok(tx)
    }

    /// Resolver refunds the buyer; `None` refunds the full amount, a partial
    /// amount refunds the slice and releases the remainder to the seller
    pub async fn resolve_refund(
        &self,
        id: TransactionId,
        resolver: AgentId,
        amount: Option<Amount>,
        rationale: String,
    ) -> Result<Transaction> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut tx = self.store.get(&id).await?;
        if tx.status != TransactionStatus::Disputed {
            return Err(MarketError::invalid_status("resolve", tx.status));
        }
        if !self.resolvers.is_resolver(&resolver) {
            return Err(MarketError::unauthorized("not an authorized resolver"));
        }

        let auth = tx
            .auth_ref
            .clone()
            .ok_or_else(|| MarketError::internal("disputed transaction without auth_ref"))?;

        let refunded = match amount {
            None => {
                // Full refund: void the hold without capturing
                self.gateway.refund(&auth, None).await?;
                tx.amount
            }
            Some(slice) => {
                if !slice.is_positive() {
                    return Err(MarketError::validation("amount", "refund must be positive"));
                }
                match slice.partial_cmp(&tx.amount) {
                    Some(ordering) if ordering.is_le() => {}
                    Some(_) => {
                        return Err(MarketError::validation(
                            "amount",
                            "refund exceeds the transaction amount",
                        ))
                    }
                    None => {
                        return Err(MarketError::CurrencyMismatch {
                            expected: tx.amount.currency.code().to_string(),
                            actual: slice.currency.code().to_string(),
                        })
                    }
                }
                // Partial refund follows the provider flow: capture first,
                // refund the slice, transfer the remainder to the seller
                self.gateway.capture(&auth).await?;
                self.gateway.refund(&auth, Some(slice.minor)).await?;
                let remainder = tx.amount.checked_sub(slice)?;
                if remainder.is_positive() {
                    let (amount_minor, currency) = wire_amount(remainder);
                    self.gateway
                        .transfer(TransferRequest {
                            seller_ref: tx.seller_id.to_string(),
                            amount_minor,
                            currency,
                            source: Some(auth.clone()),
                        })
                        .await?;
                }
                slice
            }
        };

        self.escrow.refund(&id, amount).await?;

        tx.resolution = Some(Resolution {
            resolver,
            outcome: ResolutionOutcome::Refund { amount },
            rationale,
            resolved_at: Utc::now(),
        });
        tx.status = TransactionStatus::Refunded;
        tx.updated_at = Utc::now();
        self.store.put(tx.clone()).await;
        info!(transaction = %id, refunded = %refunded, "dispute resolved with refund");

        self.publish(MarketEvent::Refunded {
            transaction_id: id,
            amount: refunded,
        })
        .await;
        Ok(tx)
    }

    /// Resolver releases to the seller; proceeds as a completion
    pub async fn resolve_release(
        &self,
        id: TransactionId,
        resolver: AgentId,
        rationale: String,
    ) -> Result<Transaction> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut tx = self.store.get(&id).await?;
        if tx.status != TransactionStatus::Disputed {
            return Err(MarketError::invalid_status("resolve", tx.status));
        }
        if !self.resolvers.is_resolver(&resolver) {
            return Err(MarketError::unauthorized("not an authorized resolver"));
        }

        tx.resolution = Some(Resolution {
            resolver,
            outcome: ResolutionOutcome::Release,
            rationale,
            resolved_at: Utc::now(),
        });
        self.settle_completion(&mut tx).await?;
        Ok(tx)
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Either party abandons a transaction before funding
    pub async fn cancel(&self, id: TransactionId, actor: AgentId) -> Result<Transaction> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut tx = self.store.get(&id).await?;
        if tx.status != TransactionStatus::Pending {
            return Err(MarketError::invalid_status("cancel", tx.status));
        }
        if tx.role_of(&actor).is_none() {
            return Err(MarketError::unauthorized(
                "only the buyer or seller can cancel",
            ));
        }

        tx.status = TransactionStatus::Cancelled;
        tx.updated_at = Utc::now();
        self.store.put(tx.clone()).await;

        self.publish(MarketEvent::Cancelled {
            transaction_id: id,
            cancelled_by: actor,
        })
        .await;
        Ok(tx)
    }

    // ========================================================================
    // Ratings
    // ========================================================================

    /// Rate the counterparty on a completed transaction; once per rater
    pub async fn rate(
        &self,
        id: TransactionId,
        rater: AgentId,
        score: u8,
        comment: Option<String>,
    ) -> Result<Rating> {
        Rating::validate_score(score)?;

        let tx = self.store.get(&id).await?;
        if tx.status != TransactionStatus::Completed {
            return Err(MarketError::invalid_status("rate", tx.status));
        }
        let rated = match tx.role_of(&rater) {
            Some(_) => tx
                .counterparty(&rater)
                .ok_or_else(|| MarketError::internal("party without counterparty"))?,
            None => {
                return Err(MarketError::unauthorized(
                    "only transaction parties can rate",
                ))
            }
        };
        if rated == rater {
            return Err(MarketError::validation("rater", "cannot rate yourself"));
        }

        let mut ratings = self.ratings.lock().await;
        if ratings.contains_key(&(id, rater)) {
            return Err(MarketError::conflict(format!(
                "rating already exists for {} by {}",
                id, rater
            )));
        }

        let rating = Rating {
            id: RatingId::new(),
            transaction_id: id,
            rater_id: rater,
            rated_id: rated,
            score,
            comment,
            created_at: Utc::now(),
        };
        ratings.insert((id, rater), rating.clone());
        drop(ratings);

        self.publish(MarketEvent::RatingSubmitted {
            rating: rating.clone(),
        })
        .await;
        Ok(rating)
    }

    /// Ratings recorded for a transaction
    pub async fn ratings_for(&self, id: &TransactionId) -> Vec<Rating> {
        self.ratings
            .lock()
            .await
            .iter()
            .filter(|((tx_id, _), _)| tx_id == id)
            .map(|(_, rating)| rating.clone())
            .collect()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get(&self, id: &TransactionId) -> Result<Transaction> {
        self.store.get(id).await
    }

    pub async fn list(&self, filter: &TransactionFilter) -> Vec<Transaction> {
        self.store.list(filter).await
    }
}
