//! Randomized invariant sweeps over the matching engine
//!
//! Drives a seeded stream of mixed limit/market orders and cancellations
//! through one product and checks, after every operation, that:
//!
//! - the book is never crossed (top bid < top ask)
//! - fills stay within 0 <= filled <= quantity, and status tracks fills
//! - emitted trade quantity never exceeds the aggressor's quantity
//! - every trade executed at the resting order's price

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use agora_engine::{EngineConfig, MatchingEngine};
use agora_events::NullBus;
use agora_types::{
    AgentId, Amount, Currency, NewOrder, OrderStatus, OrderType, ProductConfig, ProductId, Side,
};

fn assert_not_crossed(engine: &MatchingEngine, product: &ProductId) {
    let snapshot = engine.snapshot(product, 1).unwrap();
    if let (Some(bid), Some(ask)) = (snapshot.best_bid(), snapshot.best_ask()) {
        assert!(
            bid.minor < ask.minor,
            "book crossed: top bid {} >= top ask {}",
            bid,
            ask
        );
    }
}

#[tokio::test]
async fn random_order_stream_preserves_book_invariants() {
    let engine = MatchingEngine::new(EngineConfig::default(), Arc::new(NullBus));
    let product = ProductId::new();
    engine
        .register_product(ProductConfig::new(product, Currency::USD))
        .unwrap();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let agents: Vec<AgentId> = (0..8).map(|_| AgentId::new()).collect();
    let mut resting: Vec<(agora_types::OrderId, AgentId)> = Vec::new();
    let mut resting_prices: HashMap<agora_types::OrderId, i64> = HashMap::new();

    for step in 0..500 {
        let cancel_turn = !resting.is_empty() && rng.gen_ratio(1, 5);

        if cancel_turn {
            let idx = rng.gen_range(0..resting.len());
            let (order_id, owner) = resting.swap_remove(idx);
            // The order may have filled since it rested; both outcomes are fine
            match engine.cancel(order_id, owner).await {
                Ok(order) => assert_eq!(order.status, OrderStatus::Cancelled),
                Err(e) => assert!(
                    matches!(e, agora_types::MarketError::InvalidStatus { .. }),
                    "unexpected cancel error at step {}: {:?}",
                    step,
                    e
                ),
            }
            resting_prices.remove(&order_id);
        } else {
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let quantity = rng.gen_range(1..=20u64);
            let order_type = if rng.gen_ratio(1, 4) {
                OrderType::Market
            } else {
                OrderType::limit(Amount::usd(rng.gen_range(90..=110)))
            };

            let submission = NewOrder {
                agent_id: agents[rng.gen_range(0..agents.len())],
                product_id: product,
                side,
                order_type,
                quantity,
            };
            let result = engine.place(submission).await.unwrap();

            // Fill bookkeeping
            let order = &result.order;
            assert!(order.filled <= order.quantity);
            let emitted: u64 = result.trades.iter().map(|t| t.quantity).sum();
            assert_eq!(emitted, order.filled);
            assert!(emitted <= order.quantity);
            match order.status {
                OrderStatus::Filled => assert_eq!(order.filled, order.quantity),
                OrderStatus::Open => assert_eq!(order.filled, 0),
                OrderStatus::Partial => {
                    assert!(order.filled > 0 && order.filled < order.quantity)
                }
                OrderStatus::Cancelled => panic!("fresh order cannot be cancelled"),
            }

            // Every trade executed at a price some resting order was quoting
            for trade in &result.trades {
                let resting_id = match side {
                    Side::Buy => trade.sell_order_id,
                    Side::Sell => trade.buy_order_id,
                };
                if let Some(price) = resting_prices.get(&resting_id) {
                    assert_eq!(trade.price.minor, *price, "trade away from resting price");
                }
            }

            if let Some(residual) = result.residual {
                if let Some(price) = residual.price() {
                    resting_prices.insert(residual.id, price.minor);
                }
                resting.push((residual.id, residual.agent_id));
            }
        }

        assert_not_crossed(&engine, &product);
    }
}

#[tokio::test]
async fn trade_order_respects_place_order() {
    // Within a product, trades come out in the order the placements went in
    let engine = MatchingEngine::new(EngineConfig::default(), Arc::new(NullBus));
    let product = ProductId::new();
    engine
        .register_product(ProductConfig::new(product, Currency::USD))
        .unwrap();

    let seller = AgentId::new();
    for price in [100, 101, 102] {
        engine
            .place(NewOrder {
                agent_id: seller,
                product_id: product,
                side: Side::Sell,
                order_type: OrderType::limit(Amount::usd(price)),
                quantity: 1,
            })
            .await
            .unwrap();
    }

    let result = engine
        .place(NewOrder {
            agent_id: AgentId::new(),
            product_id: product,
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: 3,
        })
        .await
        .unwrap();

    let prices: Vec<i64> = result.trades.iter().map(|t| t.price.minor).collect();
    assert_eq!(prices, vec![100, 101, 102]);
}

#[tokio::test]
async fn concurrent_products_do_not_interfere() {
    let engine = Arc::new(MatchingEngine::new(
        EngineConfig::default(),
        Arc::new(NullBus),
    ));

    let products: Vec<ProductId> = (0..4).map(|_| ProductId::new()).collect();
    for product in &products {
        engine
            .register_product(ProductConfig::new(*product, Currency::USD))
            .unwrap();
    }

    let mut tasks = Vec::new();
    for product in products.clone() {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(product.0.as_u128() as u64);
            for _ in 0..100 {
                let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                engine
                    .place(NewOrder {
                        agent_id: AgentId::new(),
                        product_id: product,
                        side,
                        order_type: OrderType::limit(Amount::usd(rng.gen_range(95..=105))),
                        quantity: rng.gen_range(1..=10),
                    })
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for product in &products {
        let snapshot = engine.snapshot(product, 1).unwrap();
        if let (Some(bid), Some(ask)) = (snapshot.best_bid(), snapshot.best_ask()) {
            assert!(bid.minor < ask.minor);
        }
    }
}
