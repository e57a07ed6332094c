//! Bounded trade-event outbox
//!
//! Book workers enqueue events under the same critical section that emits
//! the trade; a single drain task forwards them to the bus. The queue is
//! bounded with a drop-oldest overflow policy so a slow bus can never stall
//! the match path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use agora_events::EventBus;
use agora_types::MarketEvent;

pub(crate) struct EventOutbox {
    queue: Mutex<VecDeque<MarketEvent>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl EventOutbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue an event; on overflow the oldest queued event is dropped
    pub(crate) fn push(&self, event: MarketEvent) {
        {
            let mut queue = self.queue.lock();
            if queue.len() == self.capacity {
                queue.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "event outbox full, dropping oldest event");
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
    }

    /// Events dropped to overflow since startup
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wake the drain task so it can observe shutdown
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<MarketEvent> {
        self.queue.lock().pop_front()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Drain loop: forwards queued events to the bus until closed and empty
pub(crate) async fn run_drain(outbox: Arc<EventOutbox>, bus: Arc<dyn EventBus>) {
    loop {
        while let Some(event) = outbox.pop() {
            if let Err(error) = bus.publish(event).await {
                // At-least-once is the contract upstream; a failed publish is
                // logged and the stream continues
                warn!(%error, "event publish failed");
            }
        }
        if outbox.is_closed() {
            break;
        }
        outbox.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::{AgentId, Amount, TransactionId};

    fn event(n: i64) -> MarketEvent {
        MarketEvent::FundingRejected {
            transaction_id: TransactionId::new(),
            buyer_id: AgentId::new(),
            amount: Amount::usd(n),
            reason: "test".to_string(),
        }
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let outbox = EventOutbox::new(2);
        outbox.push(event(1));
        outbox.push(event(2));
        outbox.push(event(3));

        assert_eq!(outbox.dropped(), 1);
        // The oldest event (1) was dropped
        match outbox.pop() {
            Some(MarketEvent::FundingRejected { amount, .. }) => {
                assert_eq!(amount, Amount::usd(2))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drain_forwards_to_bus() {
        let outbox = Arc::new(EventOutbox::new(16));
        let bus = Arc::new(agora_events::InMemoryBus::new());
        let rx = bus.subscribe();

        let drain = tokio::spawn(run_drain(outbox.clone(), bus.clone()));

        outbox.push(event(1));
        outbox.push(event(2));

        let first = rx.recv_async().await.unwrap();
        let second = rx.recv_async().await.unwrap();
        assert_eq!(first.event_type, "transaction.funding_rejected");
        assert_ne!(first.id, second.id);

        outbox.close();
        drain.await.unwrap();
    }
}
