//! Agora Engine - Continuous-Limit-Order Matching Engine
//!
//! The engine owns one [`agora_orderbook::OrderBook`] per registered product.
//! Each book lives inside its own task, fed by a command queue, so `place`
//! and `cancel` are mutually exclusive and totally ordered within a product
//! while different products never contend. Snapshots are served from a
//! copy-on-write view the owner task refreshes after every mutation, so
//! reads proceed concurrently with writes.
//!
//! Trades are enqueued onto a bounded outbox inside the same critical
//! section that emits them; a separate drain task publishes `trade.executed`
//! events to the bus. No order becomes visible in the book before its trades
//! have been handed to the outbox.
//!
//! # Example
//!
//! ```ignore
//! use agora_engine::{EngineConfig, MatchingEngine};
//!
//! let engine = MatchingEngine::new(EngineConfig::default(), bus);
//! engine.register_product(product_config)?;
//!
//! let result = engine.place(new_order).await?;
//! for trade in &result.trades {
//!     println!("{} @ {}", trade.quantity, trade.price);
//! }
//! ```

mod outbox;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use agora_events::EventBus;
use agora_orderbook::OrderBook;
use agora_types::{
    AgentId, BookSnapshot, MarketError, MarketEvent, NewOrder, Order, OrderId, ProductConfig,
    ProductId, Result, Trade,
};

use outbox::EventOutbox;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Command queue depth per product
    pub command_buffer: usize,
    /// Bounded outbox capacity shared by all products
    pub outbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_buffer: 256,
            outbox_capacity: 4096,
        }
    }
}

/// Result of placing an order
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The aggressor order after matching
    pub order: Order,
    /// Trades emitted, in execution order
    pub trades: Vec<Trade>,
    /// The resting remainder, when a limit residual joined the book
    pub residual: Option<Order>,
}

enum BookCommand {
    Place {
        submission: NewOrder,
        reply: oneshot::Sender<Result<MatchResult>>,
    },
    Cancel {
        order_id: OrderId,
        agent: AgentId,
        reply: oneshot::Sender<Result<Order>>,
    },
}

struct ProductHandle {
    commands: mpsc::Sender<BookCommand>,
    view: Arc<RwLock<BookSnapshot>>,
}

/// The matching engine: one authoritative book task per product
pub struct MatchingEngine {
    config: EngineConfig,
    products: RwLock<HashMap<ProductId, ProductHandle>>,
    /// Maps every order the engine has accepted to its product
    order_index: RwLock<HashMap<OrderId, ProductId>>,
    outbox: Arc<EventOutbox>,
}

impl MatchingEngine {
    /// Create the engine and start the event drain task
    pub fn new(config: EngineConfig, bus: Arc<dyn EventBus>) -> Self {
        let outbox = Arc::new(EventOutbox::new(config.outbox_capacity));
        tokio::spawn(outbox::run_drain(outbox.clone(), bus));
        Self {
            config,
            products: RwLock::new(HashMap::new()),
            order_index: RwLock::new(HashMap::new()),
            outbox,
        }
    }

    /// Register a product and spawn its owner task
    pub fn register_product(&self, product: ProductConfig) -> Result<()> {
        let book = OrderBook::new(product);
        self.adopt_book(book, &[])
    }

    /// Register a product whose book is rebuilt from the open-order log
    ///
    /// Used after a restart: the in-memory book is authoritative while
    /// running, and reconstructible from persisted open orders.
    pub fn restore_product(&self, product: ProductConfig, orders: Vec<Order>) -> Result<()> {
        let index: Vec<(OrderId, ProductId)> =
            orders.iter().map(|o| (o.id, o.product_id)).collect();
        let book = OrderBook::restore(product, orders)?;
        self.adopt_book(book, &index)
    }

    fn adopt_book(&self, book: OrderBook, known_orders: &[(OrderId, ProductId)]) -> Result<()> {
        let mut products = self.products.write();
        let product_id = book.product_id();
        if products.contains_key(&product_id) {
            return Err(MarketError::conflict(format!("product {}", product_id)));
        }

        let view = Arc::new(RwLock::new(book.snapshot(usize::MAX, Utc::now())));
        let (tx, rx) = mpsc::channel(self.config.command_buffer);
        tokio::spawn(run_book(book, rx, view.clone(), self.outbox.clone()));

        products.insert(
            product_id,
            ProductHandle {
                commands: tx,
                view,
            },
        );
        self.order_index.write().extend(known_orders.iter().copied());
        info!(product = %product_id, "product registered");
        Ok(())
    }

    /// Registered products
    pub fn products(&self) -> Vec<ProductId> {
        self.products.read().keys().copied().collect()
    }

    fn handle_for(&self, product_id: &ProductId) -> Result<(mpsc::Sender<BookCommand>, Arc<RwLock<BookSnapshot>>)> {
        self.products
            .read()
            .get(product_id)
            .map(|h| (h.commands.clone(), h.view.clone()))
            .ok_or_else(|| MarketError::validation("product_id", "unknown product"))
    }

    /// Place an order; returns the trades it produced and any resting residual
    pub async fn place(&self, submission: NewOrder) -> Result<MatchResult> {
        let (commands, _) = self.handle_for(&submission.product_id)?;
        let product_id = submission.product_id;

        let (reply, response) = oneshot::channel();
        commands
            .send(BookCommand::Place { submission, reply })
            .await
            .map_err(|_| MarketError::internal("book task unavailable"))?;
        let result = response
            .await
            .map_err(|_| MarketError::internal("book task dropped reply"))?;

        if let Ok(matched) = &result {
            self.order_index.write().insert(matched.order.id, product_id);
        }
        result
    }

    /// Cancel an order on behalf of its owner
    pub async fn cancel(&self, order_id: OrderId, agent: AgentId) -> Result<Order> {
        let product_id = self
            .order_index
            .read()
            .get(&order_id)
            .copied()
            .ok_or_else(|| MarketError::not_found(format!("order {}", order_id)))?;
        let (commands, _) = self.handle_for(&product_id)?;

        let (reply, response) = oneshot::channel();
        commands
            .send(BookCommand::Cancel {
                order_id,
                agent,
                reply,
            })
            .await
            .map_err(|_| MarketError::internal("book task unavailable"))?;
        response
            .await
            .map_err(|_| MarketError::internal("book task dropped reply"))?
    }

    /// Aggregated book view truncated to `depth` levels; never blocks matching
    pub fn snapshot(&self, product_id: &ProductId, depth: usize) -> Result<BookSnapshot> {
        let (_, view) = self.handle_for(product_id)?;
        let snapshot = view.read().clone();
        Ok(snapshot.truncated(depth))
    }

    /// Events dropped by the outbox since startup
    pub fn dropped_events(&self) -> u64 {
        self.outbox.dropped()
    }
}

impl Drop for MatchingEngine {
    fn drop(&mut self) {
        self.outbox.close();
    }
}

/// Owner task: the only code that touches this product's book
async fn run_book(
    mut book: OrderBook,
    mut commands: mpsc::Receiver<BookCommand>,
    view: Arc<RwLock<BookSnapshot>>,
    outbox: Arc<EventOutbox>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            BookCommand::Place { submission, reply } => {
                let now = Utc::now();
                let result = book.place(submission, now).map(|matched| {
                    // Trades enter the outbox before the mutated book becomes
                    // visible through the view
                    for trade in &matched.trades {
                        outbox.push(MarketEvent::TradeExecuted {
                            trade: trade.clone(),
                        });
                    }
                    *view.write() = book.snapshot(usize::MAX, now);
                    MatchResult {
                        order: matched.order,
                        trades: matched.trades,
                        residual: matched.residual,
                    }
                });
                let _ = reply.send(result);
            }
            BookCommand::Cancel {
                order_id,
                agent,
                reply,
            } => {
                let now = Utc::now();
                let result = book.cancel(order_id, &agent, now);
                if result.is_ok() {
                    *view.write() = book.snapshot(usize::MAX, now);
                }
                let _ = reply.send(result);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
