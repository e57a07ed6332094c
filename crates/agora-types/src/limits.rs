//! Spending limit types
//!
//! Per-agent caps evaluated by the spending guard before money is committed.
//! Daily windows are UTC days; monthly windows are UTC calendar months.

use crate::identity::{AgentId, OwnerId};
use crate::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Spending caps configured for one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingLimit {
    pub agent_id: AgentId,
    /// The principal who configured the limits
    pub owner_id: OwnerId,
    /// Maximum for any single transaction
    pub per_transaction: Option<Amount>,
    /// Maximum total over the current UTC day
    pub daily: Option<Amount>,
    /// Maximum total over the current UTC calendar month
    pub monthly: Option<Amount>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create or replace an agent's spending limits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetSpendingLimits {
    pub per_transaction: Option<Amount>,
    pub daily: Option<Amount>,
    pub monthly: Option<Amount>,
    /// Defaults to enabled when omitted
    pub enabled: Option<bool>,
}

impl SetSpendingLimits {
    /// Materialize into a limit record
    pub fn into_limit(self, owner_id: OwnerId, agent_id: AgentId, now: DateTime<Utc>) -> SpendingLimit {
        SpendingLimit {
            agent_id,
            owner_id,
            per_transaction: self.per_transaction,
            daily: self.daily,
            monthly: self.monthly,
            enabled: self.enabled.unwrap_or(true),
            created_at: now,
            updated_at: now,
        }
    }
}
