//! In-memory transaction store
//!
//! The store holds the authoritative transaction records and doubles as the
//! guard's spend-history source: committed spend is aggregated straight from
//! the records, so there is no separate counter to drift out of sync. It
//! also indexes trade-spawned transactions by trade id, which is what keeps
//! the trade pipeline idempotent under at-least-once event delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use agora_guard::SpendHistory;
use agora_types::{
    AgentId, Amount, Currency, MarketError, Result, TradeId, Transaction, TransactionFilter,
    TransactionId, TransactionOrigin, TransactionRole,
};

#[derive(Default)]
struct StoreInner {
    transactions: HashMap<TransactionId, Transaction>,
    /// Trade-spawned transactions, keyed by originating trade
    by_trade: HashMap<TradeId, TransactionId>,
}

impl StoreInner {
    fn index(&mut self, transaction: &Transaction) {
        if let TransactionOrigin::Trade { trade_id } = transaction.origin {
            self.by_trade.insert(trade_id, transaction.id);
        }
    }
}

/// Authoritative store of transaction records
pub struct TransactionStore {
    inner: RwLock<StoreInner>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    pub async fn insert(&self, transaction: Transaction) {
        let mut inner = self.inner.write().await;
        inner.index(&transaction);
        inner.transactions.insert(transaction.id, transaction);
    }

    /// Overwrite a record after a mutation made under its transaction lock
    pub async fn put(&self, transaction: Transaction) {
        self.insert(transaction).await;
    }

    pub async fn get(&self, id: &TransactionId) -> Result<Transaction> {
        self.inner
            .read()
            .await
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| MarketError::not_found(format!("transaction {}", id)))
    }

    /// The transaction a trade already spawned, if any
    pub async fn find_by_trade(&self, trade_id: &TradeId) -> Option<Transaction> {
        let inner = self.inner.read().await;
        inner
            .by_trade
            .get(trade_id)
            .and_then(|id| inner.transactions.get(id))
            .cloned()
    }

    /// List transactions matching a filter, newest first
    pub async fn list(&self, filter: &TransactionFilter) -> Vec<Transaction> {
        let inner = self.inner.read().await;
        let mut matched: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|tx| {
                if let Some(agent) = &filter.agent {
                    match (tx.role_of(agent), filter.role) {
                        (None, _) => return false,
                        (Some(_), None) => {}
                        (Some(role), Some(wanted)) if role == wanted => {}
                        _ => return false,
                    }
                } else if filter.role.is_some() {
                    // A role filter without an agent is meaningless
                    return false;
                }
                if let Some(status) = filter.status {
                    if tx.status != status {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);
        matched.into_iter().skip(offset).take(limit).collect()
    }

    /// Snapshot of every record; used by background sweeps
    pub async fn all(&self) -> Vec<Transaction> {
        self.inner
            .read()
            .await
            .transactions
            .values()
            .cloned()
            .collect()
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpendHistory for TransactionStore {
    async fn spent_since(
        &self,
        agent: &AgentId,
        currency: Currency,
        since: DateTime<Utc>,
    ) -> Result<Amount> {
        let inner = self.inner.read().await;
        let mut total = Amount::zero(currency);
        for tx in inner.transactions.values() {
            if tx.role_of(agent) != Some(TransactionRole::Buyer) {
                continue;
            }
            if tx.amount.currency != currency {
                continue;
            }
            if !tx.status.counts_toward_spend() {
                continue;
            }
            if tx.created_at < since {
                continue;
            }
            total = total.checked_add(tx.amount)?;
        }
        Ok(total)
    }
}
