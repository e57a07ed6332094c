//! Agora Transactions - Escrow-Backed Transaction Lifecycle
//!
//! This crate drives a transaction from agreement through funding, delivery,
//! confirmation, dispute, and settlement:
//!
//! 1. **Create**: a matched trade or a negotiated agreement becomes a
//!    Pending transaction
//! 2. **Fund**: the buyer clears the spending guard, the gateway holds the
//!    funds, the escrow ledger records the hold
//! 3. **Deliver / Confirm**: the seller attaches proof, the buyer confirms,
//!    the gateway captures and the seller is paid net of the platform fee
//! 4. **Dispute / Resolve**: either party can freeze the funds; an
//!    authorized resolver refunds or releases
//!
//! Events are published at every transition; monetary conservation holds at
//! every step (see `agora-escrow`).
//!
//! # Example
//!
//! ```ignore
//! use agora_transactions::{TransactionConfig, TransactionService};
//!
//! let service = TransactionService::new(store, escrow, guard, gateway,
//!                                       resolvers, bus, TransactionConfig::default());
//!
//! let tx = service.create_from_trade(&trade).await?;
//! service.fund(tx.id, tx.buyer_id).await?;
//! ```

mod pipeline;
mod service;
mod store;

use chrono::Duration;
use std::collections::HashSet;
use std::time::Duration as StdDuration;

use agora_types::AgentId;

pub use pipeline::spawn_trade_pipeline;
pub use service::TransactionService;
pub use store::TransactionStore;

/// Service configuration
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    /// Platform fee retained on completion, in basis points
    pub platform_fee_bps: u32,
    /// Deadline applied to every gateway call
    pub gateway_deadline: StdDuration,
    /// Delivered transactions auto-confirm after this window; `None` disables
    pub auto_confirm_after: Option<Duration>,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: 250,
            gateway_deadline: StdDuration::from_secs(10),
            auto_confirm_after: None,
        }
    }
}

/// Decides who may resolve disputes; the role itself is managed elsewhere
pub trait ResolverAuthority: Send + Sync {
    fn is_resolver(&self, agent: &AgentId) -> bool;
}

/// Fixed set of resolver agents
pub struct StaticResolvers {
    resolvers: HashSet<AgentId>,
}

impl StaticResolvers {
    pub fn new(resolvers: impl IntoIterator<Item = AgentId>) -> Self {
        Self {
            resolvers: resolvers.into_iter().collect(),
        }
    }

    /// No resolvers at all; every resolution attempt is unauthorized
    pub fn none() -> Self {
        Self::new([])
    }
}

impl ResolverAuthority for StaticResolvers {
    fn is_resolver(&self, agent: &AgentId) -> bool {
        self.resolvers.contains(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_resolvers() {
        let resolver = AgentId::new();
        let authority = StaticResolvers::new([resolver]);
        assert!(authority.is_resolver(&resolver));
        assert!(!authority.is_resolver(&AgentId::new()));
        assert!(!StaticResolvers::none().is_resolver(&resolver));
    }

    #[test]
    fn test_default_config() {
        let config = TransactionConfig::default();
        assert_eq!(config.platform_fee_bps, 250);
        assert_eq!(config.gateway_deadline, StdDuration::from_secs(10));
        assert!(config.auto_confirm_after.is_none());
    }
}
