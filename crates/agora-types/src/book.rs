//! Order book view types
//!
//! Aggregated price levels are a read-only projection of the live book; the
//! resting orders themselves remain the source of truth.

use crate::identity::ProductId;
use crate::money::{Amount, Currency};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration for a tradeable product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub id: ProductId,
    /// Currency all limit prices for this product are quoted in
    pub quote: Currency,
}

impl ProductConfig {
    pub fn new(id: ProductId, quote: Currency) -> Self {
        Self { id, quote }
    }
}

/// Aggregate quantity resting at one price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Amount,
    pub quantity: u64,
    /// Number of orders at this level
    pub orders: u32,
}

/// Point-in-time view of one product's book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub product_id: ProductId,
    /// Buy levels, best (highest) price first
    pub bids: Vec<PriceLevel>,
    /// Sell levels, best (lowest) price first
    pub asks: Vec<PriceLevel>,
    /// Last traded price
    pub last_price: Option<Amount>,
    /// Quantity traded in the last 24 hours
    pub volume_24h: u64,
    pub high_24h: Option<Amount>,
    pub low_24h: Option<Amount>,
    pub timestamp: DateTime<Utc>,
}

impl BookSnapshot {
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            bids: Vec::new(),
            asks: Vec::new(),
            last_price: None,
            volume_24h: 0,
            high_24h: None,
            low_24h: None,
            timestamp: Utc::now(),
        }
    }

    /// Best (highest) bid price
    pub fn best_bid(&self) -> Option<Amount> {
        self.bids.first().map(|l| l.price)
    }

    /// Best (lowest) ask price
    pub fn best_ask(&self) -> Option<Amount> {
        self.asks.first().map(|l| l.price)
    }

    /// Spread between the best quotes
    pub fn spread(&self) -> Option<Amount> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask.checked_sub(bid).ok(),
            _ => None,
        }
    }

    /// Truncate to the requested depth per side
    pub fn truncated(mut self, depth: usize) -> Self {
        self.bids.truncate(depth);
        self.asks.truncate(depth);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_quotes() {
        let mut snapshot = BookSnapshot::empty(ProductId::new());
        snapshot.bids.push(PriceLevel {
            price: Amount::usd(99),
            quantity: 10,
            orders: 2,
        });
        snapshot.bids.push(PriceLevel {
            price: Amount::usd(98),
            quantity: 5,
            orders: 1,
        });
        snapshot.asks.push(PriceLevel {
            price: Amount::usd(101),
            quantity: 3,
            orders: 1,
        });

        assert_eq!(snapshot.best_bid(), Some(Amount::usd(99)));
        assert_eq!(snapshot.best_ask(), Some(Amount::usd(101)));
        assert_eq!(snapshot.spread(), Some(Amount::usd(2)));
    }

    #[test]
    fn test_truncation() {
        let mut snapshot = BookSnapshot::empty(ProductId::new());
        for i in 0..5 {
            snapshot.bids.push(PriceLevel {
                price: Amount::usd(100 - i),
                quantity: 1,
                orders: 1,
            });
        }
        let truncated = snapshot.truncated(2);
        assert_eq!(truncated.bids.len(), 2);
        assert_eq!(truncated.best_bid(), Some(Amount::usd(100)));
    }
}
