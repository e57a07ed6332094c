//! Transaction lifecycle types
//!
//! A transaction tracks one exchange of value between a buyer and a seller,
//! from agreement through escrow funding, delivery, and settlement. Status
//! transitions form a directed acyclic graph; once a transaction reaches
//! Completed, Refunded, or Cancelled the record is frozen.

use crate::identity::{AgentId, AuthRef, OfferId, RequestId, TradeId, TransactionId};
use crate::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a transaction in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Agreement exists; buyer has not funded escrow
    Pending,
    /// Buyer's funds are held in escrow
    EscrowFunded,
    /// Seller has delivered; awaiting buyer confirmation
    Delivered,
    /// Buyer confirmed (or auto-confirm elapsed); funds captured
    Completed,
    /// A party disputed; awaiting resolver decision
    Disputed,
    /// Resolver refunded the buyer
    Refunded,
    /// Cancelled before funding
    Cancelled,
}

impl TransactionStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded | Self::Cancelled)
    }

    /// Check if transactions in this state count toward spending-limit usage
    ///
    /// Pending transactions are excluded so the transaction currently being
    /// funded never double-counts; Cancelled and Refunded money came back.
    pub fn counts_toward_spend(&self) -> bool {
        matches!(
            self,
            Self::EscrowFunded | Self::Delivered | Self::Completed | Self::Disputed
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::EscrowFunded => "escrow_funded",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Where a transaction came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOrigin {
    /// Spawned by a matched trade on the order book
    Trade { trade_id: TradeId },
    /// Agreed through the request/offer negotiation flow
    Negotiated {
        request_id: Option<RequestId>,
        offer_id: Option<OfferId>,
    },
}

/// Proof of delivery attached by the seller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryProof {
    pub proof: String,
    pub message: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

/// Record of an open dispute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRecord {
    pub opened_by: AgentId,
    pub reason: String,
    pub description: String,
    pub opened_at: DateTime<Utc>,
}

/// Outcome chosen by the dispute resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionOutcome {
    /// Refund the buyer; `None` means the full held amount
    Refund { amount: Option<Amount> },
    /// Release to the seller, proceeding as a completion
    Release,
}

/// The resolver's recorded decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolver: AgentId,
    pub outcome: ResolutionOutcome,
    pub rationale: String,
    pub resolved_at: DateTime<Utc>,
}

/// A party's role within a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionRole {
    Buyer,
    Seller,
}

/// An escrow-backed transaction between two agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub buyer_id: AgentId,
    pub seller_id: AgentId,
    pub origin: TransactionOrigin,
    pub amount: Amount,
    pub status: TransactionStatus,
    /// Gateway authorization held while escrow is funded
    pub auth_ref: Option<AuthRef>,
    pub delivery: Option<DeliveryProof>,
    pub dispute: Option<DisputeRecord>,
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Check if the record is frozen (no further transitions)
    pub fn is_frozen(&self) -> bool {
        self.status.is_terminal()
    }

    /// The role an agent plays in this transaction, if any
    pub fn role_of(&self, agent: &AgentId) -> Option<TransactionRole> {
        if agent == &self.buyer_id {
            Some(TransactionRole::Buyer)
        } else if agent == &self.seller_id {
            Some(TransactionRole::Seller)
        } else {
            None
        }
    }

    /// The other party relative to an agent
    pub fn counterparty(&self, agent: &AgentId) -> Option<AgentId> {
        match self.role_of(agent)? {
            TransactionRole::Buyer => Some(self.seller_id),
            TransactionRole::Seller => Some(self.buyer_id),
        }
    }
}

/// Filter for listing transactions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    /// Restrict to transactions this agent participates in
    pub agent: Option<AgentId>,
    /// Further restrict the agent's role
    pub role: Option<TransactionRole>,
    pub status: Option<TransactionStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction(status: TransactionStatus) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: TransactionId::new(),
            buyer_id: AgentId::new(),
            seller_id: AgentId::new(),
            origin: TransactionOrigin::Negotiated {
                request_id: None,
                offer_id: None,
            },
            amount: Amount::usd(10_000),
            status,
            auth_ref: None,
            delivery: None,
            dispute: None,
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Refunded.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Disputed.is_terminal());
    }

    #[test]
    fn test_spend_counting_excludes_pending_and_returned() {
        assert!(!TransactionStatus::Pending.counts_toward_spend());
        assert!(!TransactionStatus::Cancelled.counts_toward_spend());
        assert!(!TransactionStatus::Refunded.counts_toward_spend());
        assert!(TransactionStatus::EscrowFunded.counts_toward_spend());
        assert!(TransactionStatus::Disputed.counts_toward_spend());
    }

    #[test]
    fn test_roles_and_counterparty() {
        let tx = transaction(TransactionStatus::Pending);
        assert_eq!(tx.role_of(&tx.buyer_id), Some(TransactionRole::Buyer));
        assert_eq!(tx.role_of(&tx.seller_id), Some(TransactionRole::Seller));
        assert_eq!(tx.role_of(&AgentId::new()), None);
        assert_eq!(tx.counterparty(&tx.buyer_id), Some(tx.seller_id));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TransactionStatus::EscrowFunded.to_string(), "escrow_funded");
        assert_eq!(TransactionStatus::Refunded.to_string(), "refunded");
    }
}
