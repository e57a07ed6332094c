//! Agora Events - Event Bus and Webhook Signing
//!
//! The marketplace core publishes a closed sum of events
//! ([`agora_types::MarketEvent`]). This crate provides the bus the core
//! publishes into, the envelope fan-out subscribers consume, and the
//! HMAC-SHA256 signing used by webhook deliveries.
//!
//! Delivery semantics are at-least-once from the core's perspective;
//! every envelope carries a unique id so subscribers can tolerate
//! duplicates.
//!
//! # Example
//!
//! ```ignore
//! use agora_events::{EventBus, InMemoryBus};
//!
//! let bus = InMemoryBus::new();
//! let rx = bus.subscribe();
//!
//! bus.publish(event).await?;
//!
//! let envelope = rx.recv()?;
//! println!("{} at {}", envelope.event_type, envelope.created_at);
//! ```

pub mod webhook;

use async_trait::async_trait;
use parking_lot::Mutex;

use agora_types::{EventEnvelope, MarketEvent, Result};

/// Interface the marketplace core publishes through
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one event; the envelope is built at this edge
    async fn publish(&self, event: MarketEvent) -> Result<()>;
}

/// Fan-out bus delivering envelopes to in-process subscribers
///
/// Subscribers receive over unbounded flume channels; a dropped receiver is
/// pruned on the next publish.
pub struct InMemoryBus {
    subscribers: Mutex<Vec<flume::Sender<EventEnvelope>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> flume::Receiver<EventEnvelope> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, event: MarketEvent) -> Result<()> {
        let envelope = event.into_envelope()?;
        tracing::debug!(event_type = %envelope.event_type, id = %envelope.id, "publishing event");

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
        Ok(())
    }
}

/// Bus that drops everything; for hosts that do not consume events
pub struct NullBus;

#[async_trait]
impl EventBus for NullBus {
    async fn publish(&self, _event: MarketEvent) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::{AgentId, Amount, TransactionId};

    fn rejection_event() -> MarketEvent {
        MarketEvent::FundingRejected {
            transaction_id: TransactionId::new(),
            buyer_id: AgentId::new(),
            amount: Amount::usd(100),
            reason: "daily limit".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = InMemoryBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.publish(rejection_event()).await.unwrap();

        let a = rx1.recv().unwrap();
        let b = rx2.recv().unwrap();
        assert_eq!(a.event_type, "transaction.funding_rejected");
        // Same publish, same envelope id on every subscriber
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let bus = InMemoryBus::new();
        let rx = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(rejection_event()).await.unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        assert!(rx.recv().is_ok());
    }

    #[tokio::test]
    async fn test_null_bus_accepts_everything() {
        let bus = NullBus;
        assert!(bus.publish(rejection_event()).await.is_ok());
    }
}
