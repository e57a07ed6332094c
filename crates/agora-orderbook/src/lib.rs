//! Agora Orderbook - Per-Product Price-Time Priority Book
//!
//! This crate implements an in-memory order book using BTreeMap for
//! price-time priority matching. Designed for single-owner operation: the
//! matching engine gives each product's book to exactly one task, so the book
//! itself needs no locking.
//!
//! # Matching rules
//!
//! - **Price-time priority**: best price first; ties broken by the
//!   engine-assigned arrival sequence
//! - **Maker pricing**: trades execute at the resting order's limit price -
//!   the aggressor accepts the book
//! - **Limit residuals rest**: an unfilled limit remainder joins its side
//!   preserving (price, time) order
//! - **Market residuals are discarded**: market orders never rest
//!
//! # Example
//!
//! ```ignore
//! use agora_orderbook::OrderBook;
//!
//! let mut book = OrderBook::new(product_config);
//!
//! let result = book.place(new_order, Utc::now())?;
//! for trade in &result.trades {
//!     println!("{} @ {}", trade.quantity, trade.price);
//! }
//!
//! let snapshot = book.snapshot(20, Utc::now());
//! ```

mod stats;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use agora_types::{
    AgentId, Amount, BookSnapshot, MarketError, NewOrder, Order, OrderId, OrderStatus, PriceLevel,
    ProductConfig, ProductId, Result, Side, Trade,
};

pub use stats::ProductStats;

// ============================================================================
// Book key
// ============================================================================

/// Sort key for resting orders: (price, arrival sequence, id)
///
/// Bid prices are negated so that both sides iterate best-first in the
/// BTreeMap's natural ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BookKey {
    price_minor: i64,
    seq: u64,
    order_id: OrderId,
}

impl BookKey {
    fn bid(price_minor: i64, seq: u64, order_id: OrderId) -> Self {
        Self {
            price_minor: -price_minor,
            seq,
            order_id,
        }
    }

    fn ask(price_minor: i64, seq: u64, order_id: OrderId) -> Self {
        Self {
            price_minor,
            seq,
            order_id,
        }
    }

    fn for_order(order: &Order, price_minor: i64) -> Self {
        match order.side {
            Side::Buy => Self::bid(price_minor, order.seq, order.id),
            Side::Sell => Self::ask(price_minor, order.seq, order.id),
        }
    }
}

// ============================================================================
// Match result
// ============================================================================

/// Result of placing an order into the book
#[derive(Debug, Clone)]
pub struct BookMatch {
    /// The aggressor order after matching
    pub order: Order,
    /// Trades produced, in execution order
    pub trades: Vec<Trade>,
    /// The resting remainder, if a limit residual joined the book
    pub residual: Option<Order>,
}

// ============================================================================
// OrderBook
// ============================================================================

/// In-memory order book for a single product
pub struct OrderBook {
    config: ProductConfig,
    /// Buy side; keys carry negated prices so iteration is best-first
    bids: BTreeMap<BookKey, Order>,
    /// Sell side; ascending price, best-first
    asks: BTreeMap<BookKey, Order>,
    /// Live-order lookup for cancellation
    index: HashMap<OrderId, (Side, BookKey)>,
    /// Orders that left the book (filled, cancelled, or discarded residuals)
    closed: HashMap<OrderId, Order>,
    /// Arrival sequence, monotonic within this book
    seq: u64,
    stats: ProductStats,
}

impl OrderBook {
    pub fn new(config: ProductConfig) -> Self {
        Self {
            config,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            closed: HashMap::new(),
            seq: 0,
            stats: ProductStats::new(),
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.config.id
    }

    pub fn config(&self) -> &ProductConfig {
        &self.config
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Rebuild a book from the persisted open-order log after a restart
    ///
    /// Orders keep their original sequence numbers, so time priority
    /// survives the rebuild. Non-active orders are retained for id lookups
    /// but never re-enter the book.
    pub fn restore(config: ProductConfig, orders: Vec<Order>) -> Result<Self> {
        let mut book = Self::new(config);
        for order in orders {
            if order.product_id != book.config.id {
                return Err(MarketError::validation(
                    "product_id",
                    "order from a different product in restore log",
                ));
            }
            book.seq = book.seq.max(order.seq);
            if !order.status.is_active() {
                book.closed.insert(order.id, order);
                continue;
            }
            let price = order
                .price()
                .ok_or_else(|| MarketError::validation("order_type", "market orders never rest"))?;
            let key = BookKey::for_order(&order, price.minor);
            book.index.insert(order.id, (order.side, key));
            book.bids_or_asks(order.side).insert(key, order);
        }
        Ok(book)
    }

    // ========================================================================
    // Placement
    // ========================================================================

    /// Validate, match, and book an incoming order
    ///
    /// The order id and time-priority sequence are assigned here, under the
    /// book's single-owner critical section. Book mutation and trade emission
    /// happen in the same call: an invalid order leaves no trace.
    pub fn place(&mut self, submission: NewOrder, now: DateTime<Utc>) -> Result<BookMatch> {
        if submission.product_id != self.config.id {
            return Err(MarketError::validation("product_id", "order routed to wrong book"));
        }
        submission.validate(self.config.quote)?;

        let seq = self.next_seq();
        let mut order = submission.into_order(OrderId::new(), seq, now);

        let limit_price = order.price();
        let trades = self.match_incoming(&mut order, limit_price, now);

        let mut residual = None;
        if order.remaining() > 0 && order.order_type.is_limit() {
            // Limit residual rests, preserving (price, seq) priority
            let price_minor = limit_price
                .map(|p| p.minor)
                .ok_or_else(|| MarketError::internal("limit order without price"))?;
            let key = BookKey::for_order(&order, price_minor);
            self.index.insert(order.id, (order.side, key));
            self.bids_or_asks(order.side).insert(key, order.clone());
            residual = Some(order.clone());
        } else {
            // Fully filled, or a discarded market residual
            self.closed.insert(order.id, order.clone());
        }

        Ok(BookMatch {
            order,
            trades,
            residual,
        })
    }

    fn bids_or_asks(&mut self, side: Side) -> &mut BTreeMap<BookKey, Order> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Walk the opposite side best-first and emit trades
    fn match_incoming(
        &mut self,
        order: &mut Order,
        limit_price: Option<Amount>,
        now: DateTime<Utc>,
    ) -> Vec<Trade> {
        let mut trades = Vec::new();
        let mut filled_keys = Vec::new();

        let opposite = match order.side {
            Side::Buy => &mut self.asks,
            Side::Sell => &mut self.bids,
        };

        for (key, resting) in opposite.iter_mut() {
            if order.remaining() == 0 {
                break;
            }

            // Resting orders are always limits
            let resting_price = match resting.price() {
                Some(p) => p,
                None => continue,
            };

            // The opposite side is price-sorted: once prices stop crossing,
            // no further matches are possible
            if let Some(limit) = limit_price {
                let crosses = match order.side {
                    Side::Buy => resting_price.minor <= limit.minor,
                    Side::Sell => resting_price.minor >= limit.minor,
                };
                if !crosses {
                    break;
                }
            }

            let quantity = order.remaining().min(resting.remaining());
            let trade = Trade::from_match(order, resting, resting_price, quantity, now);

            order.record_fill(quantity, now);
            resting.record_fill(quantity, now);

            self.stats.record_trade(resting_price, quantity, now);

            if resting.remaining() == 0 {
                filled_keys.push((*key, resting.clone()));
            }

            trades.push(trade);
        }

        for (key, filled) in filled_keys {
            opposite.remove(&key);
            self.index.remove(&filled.id);
            self.closed.insert(filled.id, filled);
        }

        trades
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Cancel a resting order
    ///
    /// Only the owning agent may cancel. Cancelling a filled order fails;
    /// cancelling an already-cancelled order returns the same cancelled
    /// order, so a repeated cancel is indistinguishable from the first.
    pub fn cancel(&mut self, order_id: OrderId, agent: &AgentId, now: DateTime<Utc>) -> Result<Order> {
        if let Some((side, key)) = self.index.get(&order_id).copied() {
            let book = self.bids_or_asks(side);
            let owner = book
                .get(&key)
                .map(|o| o.agent_id)
                .ok_or_else(|| MarketError::internal("book index desync"))?;
            if &owner != agent {
                return Err(MarketError::unauthorized("not the owner of this order"));
            }

            let mut order = book
                .remove(&key)
                .ok_or_else(|| MarketError::internal("book index desync"))?;
            self.index.remove(&order_id);
            order.status = OrderStatus::Cancelled;
            order.updated_at = now;
            self.closed.insert(order_id, order.clone());
            tracing::debug!(order = %order_id, "order cancelled");
            return Ok(order);
        }

        match self.closed.get(&order_id) {
            Some(order) if order.status == OrderStatus::Cancelled => {
                if &order.agent_id != agent {
                    return Err(MarketError::unauthorized("not the owner of this order"));
                }
                Ok(order.clone())
            }
            Some(order) => Err(MarketError::invalid_status("cancel", order.status)),
            None => Err(MarketError::not_found(format!("order {}", order_id))),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Look up any order this book has seen
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.index
            .get(order_id)
            .and_then(|(side, key)| match side {
                Side::Buy => self.bids.get(key),
                Side::Sell => self.asks.get(key),
            })
            .or_else(|| self.closed.get(order_id))
    }

    /// Best (highest) bid price
    pub fn best_bid(&self) -> Option<Amount> {
        self.bids.values().next().and_then(|o| o.price())
    }

    /// Best (lowest) ask price
    pub fn best_ask(&self) -> Option<Amount> {
        self.asks.values().next().and_then(|o| o.price())
    }

    /// Number of resting orders per side
    pub fn order_count(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Aggregated view of the whole book; never mutates it
    pub fn snapshot(&self, depth: usize, now: DateTime<Utc>) -> BookSnapshot {
        let mut snapshot = BookSnapshot::empty(self.config.id);
        snapshot.bids = Self::aggregate_levels(self.bids.values());
        snapshot.asks = Self::aggregate_levels(self.asks.values());
        snapshot.last_price = self.stats.last_price();
        snapshot.volume_24h = self.stats.volume_24h(now);
        snapshot.high_24h = self.stats.high_24h(now);
        snapshot.low_24h = self.stats.low_24h(now);
        snapshot.timestamp = now;
        snapshot.truncated(depth)
    }

    /// Collapse best-first ordered resting orders into price levels
    fn aggregate_levels<'a>(orders: impl Iterator<Item = &'a Order>) -> Vec<PriceLevel> {
        let mut levels: Vec<PriceLevel> = Vec::new();
        for order in orders {
            let price = match order.price() {
                Some(p) => p,
                None => continue,
            };
            match levels.last_mut() {
                Some(level) if level.price == price => {
                    level.quantity += order.remaining();
                    level.orders += 1;
                }
                _ => levels.push(PriceLevel {
                    price,
                    quantity: order.remaining(),
                    orders: 1,
                }),
            }
        }
        levels
    }
}

// ============================================================================
// Tests
// ============================================================================
