//! Marketplace events
//!
//! Events are a closed sum. The bus accepts the sum and serializes at the
//! edge into an [`EventEnvelope`]; subscribers pattern-match on the variant
//! or on the envelope's `event_type`. Delivery is at-least-once - every
//! envelope carries a unique id so duplicates are detectable.

use crate::error::{MarketError, Result};
use crate::identity::{AgentId, AuthRef, EventId, TransactionId};
use crate::money::Amount;
use crate::rating::Rating;
use crate::trade::Trade;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything the marketplace core announces to the outside world
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketEvent {
    /// A trade executed on a product book
    TradeExecuted { trade: Trade },
    /// A transaction entered the lifecycle
    TransactionCreated { transaction: Transaction },
    /// The spending guard refused a funding attempt
    FundingRejected {
        transaction_id: TransactionId,
        buyer_id: AgentId,
        amount: Amount,
        reason: String,
    },
    /// Escrow was funded with a gateway authorization
    EscrowFunded {
        transaction_id: TransactionId,
        amount: Amount,
        auth_ref: AuthRef,
    },
    /// The seller delivered
    Delivered {
        transaction_id: TransactionId,
        seller_id: AgentId,
    },
    /// The transaction settled to the seller
    Completed {
        transaction_id: TransactionId,
        amount: Amount,
        platform_fee: Amount,
        seller_portion: Amount,
    },
    /// A party opened a dispute
    Disputed {
        transaction_id: TransactionId,
        opened_by: AgentId,
        reason: String,
    },
    /// A resolver refunded the buyer
    Refunded {
        transaction_id: TransactionId,
        amount: Amount,
    },
    /// The transaction was cancelled before funding
    Cancelled {
        transaction_id: TransactionId,
        cancelled_by: AgentId,
    },
    /// A party rated the other
    RatingSubmitted { rating: Rating },
}

impl MarketEvent {
    /// Stable dotted event name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TradeExecuted { .. } => "trade.executed",
            Self::TransactionCreated { .. } => "transaction.created",
            Self::FundingRejected { .. } => "transaction.funding_rejected",
            Self::EscrowFunded { .. } => "transaction.escrow_funded",
            Self::Delivered { .. } => "transaction.delivered",
            Self::Completed { .. } => "transaction.completed",
            Self::Disputed { .. } => "transaction.disputed",
            Self::Refunded { .. } => "transaction.refunded",
            Self::Cancelled { .. } => "transaction.cancelled",
            Self::RatingSubmitted { .. } => "rating.submitted",
        }
    }

    /// Serialize into the wire envelope (the only place events become JSON)
    pub fn into_envelope(self) -> Result<EventEnvelope> {
        let event_type = self.event_type().to_string();
        let payload = serde_json::to_value(&self)
            .map_err(|e| MarketError::internal(format!("event serialization failed: {}", e)))?;
        Ok(EventEnvelope {
            id: EventId::new(),
            event_type,
            created_at: Utc::now(),
            payload,
        })
    }
}

/// Wire envelope published on the bus and delivered to webhooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique per delivery; subscribers deduplicate on this
    pub id: EventId,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{OrderId, ProductId, TradeId};

    #[test]
    fn test_event_type_names() {
        let event = MarketEvent::FundingRejected {
            transaction_id: TransactionId::new(),
            buyer_id: AgentId::new(),
            amount: Amount::usd(100),
            reason: "daily limit".to_string(),
        };
        assert_eq!(event.event_type(), "transaction.funding_rejected");

        let event = MarketEvent::RatingSubmitted {
            rating: Rating {
                id: crate::identity::RatingId::new(),
                transaction_id: TransactionId::new(),
                rater_id: AgentId::new(),
                rated_id: AgentId::new(),
                score: 5,
                comment: None,
                created_at: Utc::now(),
            },
        };
        assert_eq!(event.event_type(), "rating.submitted");
    }

    #[test]
    fn test_envelope_carries_type_and_unique_id() {
        let trade = Trade {
            id: TradeId::new(),
            product_id: ProductId::new(),
            buy_order_id: OrderId::new(),
            sell_order_id: OrderId::new(),
            buyer_id: AgentId::new(),
            seller_id: AgentId::new(),
            price: Amount::usd(100),
            quantity: 1,
            executed_at: Utc::now(),
        };

        let a = MarketEvent::TradeExecuted {
            trade: trade.clone(),
        }
        .into_envelope()
        .unwrap();
        let b = MarketEvent::TradeExecuted { trade }.into_envelope().unwrap();

        assert_eq!(a.event_type, "trade.executed");
        assert_ne!(a.id, b.id);
        assert!(a.payload.get("TradeExecuted").is_some());
    }
}
