//! Walks a transaction through the full escrow lifecycle
//!
//! This example shows that:
//! 1. Funding is blocked by the spending guard before any money moves
//! 2. The happy path settles the seller net of the platform fee
//! 3. A dispute freezes the funds until a resolver decides
//!
//! Run with: cargo run --example escrow_lifecycle

use std::sync::Arc;

use agora_escrow::EscrowLedger;
use agora_events::InMemoryBus;
use agora_gateway::MockGateway;
use agora_guard::LimitGuard;
use agora_transactions::{
    StaticResolvers, TransactionConfig, TransactionService, TransactionStore,
};
use agora_types::{AgentId, Amount, OwnerId, SetSpendingLimits};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let store = Arc::new(TransactionStore::new());
    let guard = Arc::new(LimitGuard::new(store.clone()));
    let escrow = Arc::new(EscrowLedger::new());
    let gateway = Arc::new(MockGateway::new());
    let bus = Arc::new(InMemoryBus::new());
    let events = bus.subscribe();
    let resolver = AgentId::new();

    let service = TransactionService::new(
        store,
        escrow.clone(),
        guard.clone(),
        gateway.clone(),
        Arc::new(StaticResolvers::new([resolver])),
        bus,
        TransactionConfig::default(),
    );

    let buyer = AgentId::new();
    let seller = AgentId::new();

    println!("=== Agora escrow lifecycle ===\n");

    // ------------------------------------------------------------------
    // 1. The guard refuses over-cap funding before the gateway is touched
    // ------------------------------------------------------------------
    guard
        .set_limits(
            OwnerId::new(),
            buyer,
            SetSpendingLimits {
                per_transaction: Some(Amount::usd(50_00)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let too_big = service
        .create_negotiated(buyer, seller, Amount::usd(120_00), None, None)
        .await
        .unwrap();
    match service.fund(too_big.id, buyer).await {
        Ok(_) => println!("UNEXPECTED: over-cap funding succeeded"),
        Err(e) => println!("funding rejected as expected: {}", e),
    }
    println!("gateway authorizations so far: {}\n", gateway.authorizations().len());

    // ------------------------------------------------------------------
    // 2. Happy path: fund, deliver, confirm
    // ------------------------------------------------------------------
    let tx = service
        .create_negotiated(buyer, seller, Amount::usd(40_00), None, None)
        .await
        .unwrap();
    service.fund(tx.id, buyer).await.unwrap();
    service
        .deliver(tx.id, seller, "sha256:artifact".into(), Some("dataset delivered".into()))
        .await
        .unwrap();
    let completed = service.confirm(tx.id, buyer).await.unwrap();

    println!("transaction {} -> {}", completed.id, completed.status);
    for transfer in gateway.transfers() {
        println!(
            "seller payout: {} minor units {} (fee retained by platform)",
            transfer.amount_minor, transfer.currency
        );
    }
    let record = escrow.get(&tx.id).await.unwrap();
    println!("escrow: held {} released {}\n", record.held, record.released);

    // ------------------------------------------------------------------
    // 3. Dispute and full refund
    // ------------------------------------------------------------------
    let disputed = service
        .create_negotiated(buyer, seller, Amount::usd(25_00), None, None)
        .await
        .unwrap();
    service.fund(disputed.id, buyer).await.unwrap();
    service
        .deliver(disputed.id, seller, "sha256:other".into(), None)
        .await
        .unwrap();
    service
        .dispute(disputed.id, buyer, "not as described".into(), "missing rows".into())
        .await
        .unwrap();
    let refunded = service
        .resolve_refund(disputed.id, resolver, None, "seller at fault".into())
        .await
        .unwrap();
    println!("transaction {} -> {}", refunded.id, refunded.status);

    println!("\nevents published:");
    for envelope in events.try_iter() {
        println!("  {} {}", envelope.created_at.to_rfc3339(), envelope.event_type);
    }
}
