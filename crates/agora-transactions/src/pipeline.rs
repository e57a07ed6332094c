//! Trade-to-transaction pipeline
//!
//! Every trade the matching engine emits spawns a Pending transaction whose
//! buyer must then clear the spending guard to fund escrow. The pipeline
//! subscribes to the bus and performs that spawn. Deduplication lives in the
//! store's trade index (`create_from_trade` is idempotent on the trade id),
//! so redelivered envelopes cost a lookup, not unbounded memory.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use agora_types::{EventEnvelope, MarketEvent};

use crate::TransactionService;

/// Consume `trade.executed` envelopes and create transactions for them
///
/// Runs until the sending side of the subscription is dropped.
pub fn spawn_trade_pipeline(
    service: Arc<TransactionService>,
    events: flume::Receiver<EventEnvelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(envelope) = events.recv_async().await {
            if envelope.event_type != "trade.executed" {
                continue;
            }
            let trade = match serde_json::from_value::<MarketEvent>(envelope.payload) {
                Ok(MarketEvent::TradeExecuted { trade }) => trade,
                Ok(_) => continue,
                Err(error) => {
                    warn!(%error, "malformed trade envelope");
                    continue;
                }
            };
            if let Err(error) = service.create_from_trade(&trade).await {
                warn!(trade = %trade.id, %error, "failed to spawn transaction from trade");
            }
        }
    })
}
