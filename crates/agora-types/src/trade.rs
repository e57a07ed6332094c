//! Trade types
//!
//! A trade is immutable once emitted. Its price is always the resting order's
//! limit price at the instant of the match.

use crate::error::Result;
use crate::identity::{AgentId, OrderId, ProductId, TradeId};
use crate::money::Amount;
use crate::order::{Order, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An executed trade between two orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub product_id: ProductId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: AgentId,
    pub seller_id: AgentId,
    /// Execution price (the resting order's price)
    pub price: Amount,
    /// Traded quantity in whole product units
    pub quantity: u64,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    /// Build a trade from an aggressor order matched against a resting order
    pub fn from_match(
        aggressor: &Order,
        resting: &Order,
        price: Amount,
        quantity: u64,
        executed_at: DateTime<Utc>,
    ) -> Self {
        let (buy, sell) = match aggressor.side {
            Side::Buy => (aggressor, resting),
            Side::Sell => (resting, aggressor),
        };
        Self {
            id: TradeId::new(),
            product_id: aggressor.product_id,
            buy_order_id: buy.id,
            sell_order_id: sell.id,
            buyer_id: buy.agent_id,
            seller_id: sell.agent_id,
            price,
            quantity,
            executed_at,
        }
    }

    /// Total value of the trade (price x quantity), checked
    pub fn notional(&self) -> Result<Amount> {
        self.price.checked_mul(self.quantity)
    }
}
