//! Rolling trade statistics for one product
//!
//! Tracks the last traded price and a 24-hour window of executions for the
//! book snapshot. The window is pruned on write; reads filter by timestamp so
//! stale entries can never inflate the numbers.

use std::collections::VecDeque;

use agora_types::Amount;
use chrono::{DateTime, Duration, Utc};

/// Length of the rolling window
const WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone)]
struct TradePoint {
    at: DateTime<Utc>,
    price: Amount,
    quantity: u64,
}

/// Last price and 24h aggregates for a product
#[derive(Debug, Default)]
pub struct ProductStats {
    last_price: Option<Amount>,
    window: VecDeque<TradePoint>,
}

impl ProductStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an execution
    pub fn record_trade(&mut self, price: Amount, quantity: u64, now: DateTime<Utc>) {
        self.last_price = Some(price);
        self.window.push_back(TradePoint {
            at: now,
            price,
            quantity,
        });
        let cutoff = now - Duration::hours(WINDOW_HOURS);
        while self.window.front().is_some_and(|p| p.at < cutoff) {
            self.window.pop_front();
        }
    }

    pub fn last_price(&self) -> Option<Amount> {
        self.last_price
    }

    fn in_window(&self, now: DateTime<Utc>) -> impl Iterator<Item = &TradePoint> {
        let cutoff = now - Duration::hours(WINDOW_HOURS);
        self.window.iter().filter(move |p| p.at >= cutoff)
    }

    /// Quantity traded over the last 24 hours
    pub fn volume_24h(&self, now: DateTime<Utc>) -> u64 {
        self.in_window(now).map(|p| p.quantity).sum()
    }

    /// Highest execution price over the last 24 hours
    pub fn high_24h(&self, now: DateTime<Utc>) -> Option<Amount> {
        self.in_window(now).map(|p| p.price).max_by_key(|p| p.minor)
    }

    /// Lowest execution price over the last 24 hours
    pub fn low_24h(&self, now: DateTime<Utc>) -> Option<Amount> {
        self.in_window(now).map(|p| p.price).min_by_key(|p| p.minor)
    }
}
