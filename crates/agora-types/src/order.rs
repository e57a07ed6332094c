//! Order types for the matching engine

use crate::error::{MarketError, Result};
use crate::identity::{AgentId, OrderId, ProductId};
use crate::money::{Amount, Currency};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type with parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    /// Execute at the limit price or better; residual rests on the book
    Limit { price: Amount },
    /// Execute at the best available prices; residual is discarded
    Market,
}

impl OrderType {
    pub fn limit(price: Amount) -> Self {
        Self::Limit { price }
    }

    /// Get the limit price, if any
    pub fn price(&self) -> Option<Amount> {
        match self {
            OrderType::Limit { price } => Some(*price),
            OrderType::Market => None,
        }
    }

    pub fn is_limit(&self) -> bool {
        matches!(self, OrderType::Limit { .. })
    }
}

/// Order status, a function of (filled, cancelled)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// On the book with no fills
    Open,
    /// On the book, partially filled
    Partial,
    /// Completely filled
    Filled,
    /// Cancelled by the owning agent
    Cancelled,
}

impl OrderStatus {
    /// Check if the order can still trade
    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::Partial)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::Partial => write!(f, "partial"),
            OrderStatus::Filled => write!(f, "filled"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// An order submission, before the engine has assigned identity and priority
///
/// The engine assigns the `OrderId` and the time-priority sequence under the
/// book's critical section, so duplicate submissions always produce distinct
/// orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub agent_id: AgentId,
    pub product_id: ProductId,
    pub side: Side,
    pub order_type: OrderType,
    /// Quantity in whole product units
    pub quantity: u64,
}

impl NewOrder {
    /// Validate the submission against the product's quote currency
    pub fn validate(&self, quote: Currency) -> Result<()> {
        if self.quantity == 0 {
            return Err(MarketError::validation("quantity", "must be positive"));
        }
        if let OrderType::Limit { price } = &self.order_type {
            if !price.is_positive() {
                return Err(MarketError::validation("price", "must be positive"));
            }
            if price.currency != quote {
                return Err(MarketError::CurrencyMismatch {
                    expected: quote.code().to_string(),
                    actual: price.currency.code().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Materialize the order with engine-assigned identity and priority
    pub fn into_order(self, id: OrderId, seq: u64, now: DateTime<Utc>) -> Order {
        Order {
            id,
            agent_id: self.agent_id,
            product_id: self.product_id,
            side: self.side,
            order_type: self.order_type,
            quantity: self.quantity,
            filled: 0,
            status: OrderStatus::Open,
            seq,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An order known to the matching engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub agent_id: AgentId,
    pub product_id: ProductId,
    pub side: Side,
    pub order_type: OrderType,
    /// Original quantity in whole product units
    pub quantity: u64,
    /// Quantity filled so far (monotonically non-decreasing)
    pub filled: u64,
    pub status: OrderStatus,
    /// Engine-assigned monotonic sequence; total time-priority order within a
    /// product even when wall clocks collide
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Quantity still unfilled
    pub fn remaining(&self) -> u64 {
        self.quantity - self.filled
    }

    /// Record a fill and recompute the status
    pub fn record_fill(&mut self, quantity: u64, now: DateTime<Utc>) {
        debug_assert!(quantity <= self.remaining());
        self.filled += quantity;
        self.status = if self.remaining() == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
        self.updated_at = now;
    }

    /// Limit price, if this is a limit order
    pub fn price(&self) -> Option<Amount> {
        self.order_type.price()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(side: Side, order_type: OrderType, quantity: u64) -> NewOrder {
        NewOrder {
            agent_id: AgentId::new(),
            product_id: ProductId::new(),
            side,
            order_type,
            quantity,
        }
    }

    #[test]
    fn test_validation_rejects_zero_quantity() {
        let order = submission(Side::Buy, OrderType::Market, 0);
        assert!(matches!(
            order.validate(Currency::USD),
            Err(MarketError::Validation { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_non_positive_price() {
        let order = submission(Side::Sell, OrderType::limit(Amount::usd(0)), 5);
        assert!(order.validate(Currency::USD).is_err());
    }

    #[test]
    fn test_validation_rejects_wrong_currency() {
        let order = submission(
            Side::Buy,
            OrderType::limit(Amount::new(100, Currency::EUR)),
            5,
        );
        assert!(matches!(
            order.validate(Currency::USD),
            Err(MarketError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_record_fill_updates_status() {
        let now = Utc::now();
        let mut order =
            submission(Side::Buy, OrderType::limit(Amount::usd(100)), 10).into_order(
                OrderId::new(),
                1,
                now,
            );

        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.remaining(), 10);

        order.record_fill(3, now);
        assert_eq!(order.status, OrderStatus::Partial);
        assert_eq!(order.filled, 3);
        assert_eq!(order.remaining(), 7);

        order.record_fill(7, now);
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.remaining(), 0);
    }
}
