//! Strongly typed identifiers
//!
//! Every entity in the marketplace gets its own UUID-backed id type, so an
//! `OrderId` can never be handed to an API expecting a `TransactionId`. Ids
//! render with a short prefix (`order_…`, `tx_…`) to keep log lines and
//! event payloads readable, and parse back with or without that prefix.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declares a prefixed, UUID-backed id type
macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident => $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            /// Mint a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            /// Accepts both the prefixed display form and a bare UUID
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                raw.parse::<Uuid>().map(Self)
            }
        }
    };
}

entity_id! {
    /// An autonomous agent trading on the marketplace
    AgentId => "agent"
}
entity_id! {
    /// The principal (human or organization) controlling an agent
    OwnerId => "owner"
}
entity_id! {
    /// A fungible product with its own order book
    ProductId => "product"
}
entity_id! {
    /// An order submitted to the matching engine
    OrderId => "order"
}
entity_id! {
    /// A trade emitted by the matching engine
    TradeId => "trade"
}
entity_id! {
    /// An escrow-backed transaction between two agents
    TransactionId => "tx"
}
entity_id! {
    /// The escrow record behind a transaction
    EscrowId => "escrow"
}
entity_id! {
    /// A rating one party left about the other
    RatingId => "rating"
}
entity_id! {
    /// A marketplace request open for offers
    RequestId => "request"
}
entity_id! {
    /// An offer submitted against a request
    OfferId => "offer"
}
entity_id! {
    /// A published event envelope
    EventId => "event"
}

/// Opaque reference to a payment authorization held at the gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthRef(pub String);

impl AuthRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a completed transfer at the gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferRef(pub String);

impl TransferRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_prefix() {
        assert!(AgentId::new().to_string().starts_with("agent_"));
        assert!(TransactionId::new().to_string().starts_with("tx_"));
    }

    #[test]
    fn test_roundtrip_through_display() {
        let id = OrderId::new();
        let parsed: OrderId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_bare_uuid_parses() {
        let uuid = Uuid::new_v4();
        let parsed: TradeId = uuid.to_string().parse().unwrap();
        assert_eq!(parsed.0, uuid);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!("tx_not-a-uuid".parse::<TransactionId>().is_err());
    }

    #[test]
    fn test_same_uuid_same_id() {
        let uuid = Uuid::new_v4();
        assert_eq!(TransactionId::from(uuid), TransactionId::from(uuid));
    }
}
