//! Agora Guard - Spending Limit Enforcement
//!
//! The guard is evaluated for the buyer before any money is committed:
//! the transaction FSM calls [`SpendingGuard::check`] at the top of the
//! funding sequence, before the gateway is touched.
//!
//! # Key principle
//!
//! Agents may AGREE to trades freely; money only moves within the owner's
//! configured caps.
//!
//! The guard is a required interface. When an agent has no limits (or the
//! host disables enforcement) the [`AllowAllGuard`] stands in - the core
//! never branches on whether the collaborator is present.
//!
//! Checks run in order: per-transaction, then daily (UTC day), then monthly
//! (UTC calendar month). Aggregation counts only transactions whose status
//! holds committed money ({EscrowFunded, Delivered, Completed, Disputed}),
//! so the still-Pending transaction being funded never double-counts.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use agora_types::{
    AgentId, Amount, Currency, MarketError, OwnerId, Result, SetSpendingLimits, SpendingLimit,
};

// ============================================================================
// Window helpers
// ============================================================================

/// Start of the UTC day containing `now`
pub fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now - Duration::hours(24))
}

/// Start of the UTC calendar month containing `now`
pub fn start_of_utc_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(now - Duration::days(31))
}

// ============================================================================
// Interfaces
// ============================================================================

/// Source of committed-spend aggregates, implemented by the transaction store
#[async_trait]
pub trait SpendHistory: Send + Sync {
    /// Total committed spend for `agent` in `currency` since `since`
    async fn spent_since(
        &self,
        agent: &AgentId,
        currency: Currency,
        since: DateTime<Utc>,
    ) -> Result<Amount>;
}

/// Evaluated before a buyer's money is committed
#[async_trait]
pub trait SpendingGuard: Send + Sync {
    /// Ok to proceed, or `MarketError::LimitExceeded` naming the cap hit
    async fn check(&self, buyer: &AgentId, amount: Amount) -> Result<()>;
}

/// Guard used when enforcement is disabled; always allows
pub struct AllowAllGuard;

#[async_trait]
impl SpendingGuard for AllowAllGuard {
    async fn check(&self, _buyer: &AgentId, _amount: Amount) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Limit guard
// ============================================================================

/// The real guard: per-agent caps over UTC windows
pub struct LimitGuard {
    limits: RwLock<HashMap<AgentId, SpendingLimit>>,
    history: Arc<dyn SpendHistory>,
}

impl LimitGuard {
    pub fn new(history: Arc<dyn SpendHistory>) -> Self {
        Self {
            limits: RwLock::new(HashMap::new()),
            history,
        }
    }

    /// Create or replace an agent's limits
    pub async fn set_limits(
        &self,
        owner: OwnerId,
        agent: AgentId,
        request: SetSpendingLimits,
    ) -> Result<SpendingLimit> {
        for cap in [&request.per_transaction, &request.daily, &request.monthly]
            .into_iter()
            .flatten()
        {
            if !cap.is_positive() {
                return Err(MarketError::validation("limit", "caps must be positive"));
            }
        }

        let limit = request.into_limit(owner, agent, Utc::now());
        self.limits.write().await.insert(agent, limit.clone());
        tracing::info!(agent = %agent, "spending limits updated");
        Ok(limit)
    }

    /// Current limits for an agent, if configured
    pub async fn get_limits(&self, agent: &AgentId) -> Option<SpendingLimit> {
        self.limits.read().await.get(agent).cloned()
    }

    /// Remove an agent's limits entirely
    pub async fn clear_limits(&self, agent: &AgentId) {
        self.limits.write().await.remove(agent);
    }

    fn cap_in_currency(cap: Amount, amount: Amount) -> Result<Amount> {
        if cap.currency != amount.currency {
            return Err(MarketError::CurrencyMismatch {
                expected: cap.currency.code().to_string(),
                actual: amount.currency.code().to_string(),
            });
        }
        Ok(cap)
    }

    async fn check_window(
        &self,
        buyer: &AgentId,
        amount: Amount,
        cap: Amount,
        since: DateTime<Utc>,
        window: &str,
    ) -> Result<()> {
        let cap = Self::cap_in_currency(cap, amount)?;
        let spent = self.history.spent_since(buyer, amount.currency, since).await?;
        let projected = spent.checked_add(amount)?;
        if projected > cap {
            return Err(MarketError::LimitExceeded {
                limit: window.to_string(),
                cap,
                spent,
                requested: amount,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SpendingGuard for LimitGuard {
    async fn check(&self, buyer: &AgentId, amount: Amount) -> Result<()> {
        if !amount.is_positive() {
            return Err(MarketError::validation("amount", "must be positive"));
        }

        let limit = match self.limits.read().await.get(buyer).cloned() {
            Some(limit) if limit.enabled => limit,
            // No limits configured, or enforcement disabled: allowed
            _ => return Ok(()),
        };

        if let Some(cap) = limit.per_transaction {
            let cap = Self::cap_in_currency(cap, amount)?;
            if amount > cap {
                return Err(MarketError::LimitExceeded {
                    limit: "per_transaction".to_string(),
                    cap,
                    spent: Amount::zero(amount.currency),
                    requested: amount,
                });
            }
        }

        let now = Utc::now();
        if let Some(cap) = limit.daily {
            self.check_window(buyer, amount, cap, start_of_utc_day(now), "daily")
                .await?;
        }
        if let Some(cap) = limit.monthly {
            self.check_window(buyer, amount, cap, start_of_utc_month(now), "monthly")
                .await?;
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Spend history returning a fixed amount regardless of window
    struct FixedHistory(Amount);

    #[async_trait]
    impl SpendHistory for FixedHistory {
        async fn spent_since(
            &self,
            _agent: &AgentId,
            _currency: Currency,
            _since: DateTime<Utc>,
        ) -> Result<Amount> {
            Ok(self.0)
        }
    }

    fn guard_with_spend(spent_minor: i64) -> LimitGuard {
        LimitGuard::new(Arc::new(FixedHistory(Amount::usd(spent_minor))))
    }

    #[tokio::test]
    async fn test_no_limits_allows() {
        let guard = guard_with_spend(1_000_000);
        assert!(guard.check(&AgentId::new(), Amount::usd(100)).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_limits_allow() {
        let guard = guard_with_spend(1_000_000);
        let agent = AgentId::new();
        guard
            .set_limits(
                OwnerId::new(),
                agent,
                SetSpendingLimits {
                    daily: Some(Amount::usd(1)),
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(guard.check(&agent, Amount::usd(100)).await.is_ok());
    }

    #[tokio::test]
    async fn test_per_transaction_cap() {
        let guard = guard_with_spend(0);
        let agent = AgentId::new();
        guard
            .set_limits(
                OwnerId::new(),
                agent,
                SetSpendingLimits {
                    per_transaction: Some(Amount::usd(50_00)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(guard.check(&agent, Amount::usd(50_00)).await.is_ok());
        let err = guard.check(&agent, Amount::usd(50_01)).await.unwrap_err();
        match err {
            MarketError::LimitExceeded { limit, .. } => assert_eq!(limit, "per_transaction"),
            other => panic!("expected LimitExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_daily_cap_counts_committed_spend() {
        // Daily cap 50.00, already spent 40.00; a 20.00 funding must fail
        let guard = guard_with_spend(40_00);
        let agent = AgentId::new();
        guard
            .set_limits(
                OwnerId::new(),
                agent,
                SetSpendingLimits {
                    daily: Some(Amount::usd(50_00)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = guard.check(&agent, Amount::usd(20_00)).await.unwrap_err();
        match err {
            MarketError::LimitExceeded {
                limit,
                cap,
                spent,
                requested,
            } => {
                assert_eq!(limit, "daily");
                assert_eq!(cap, Amount::usd(50_00));
                assert_eq!(spent, Amount::usd(40_00));
                assert_eq!(requested, Amount::usd(20_00));
            }
            other => panic!("expected LimitExceeded, got {:?}", other),
        }

        // Exactly reaching the cap is allowed
        assert!(guard.check(&agent, Amount::usd(10_00)).await.is_ok());
    }

    #[tokio::test]
    async fn test_monthly_cap() {
        let guard = guard_with_spend(90_00);
        let agent = AgentId::new();
        guard
            .set_limits(
                OwnerId::new(),
                agent,
                SetSpendingLimits {
                    monthly: Some(Amount::usd(100_00)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(guard.check(&agent, Amount::usd(10_00)).await.is_ok());
        assert!(guard.check(&agent, Amount::usd(10_01)).await.is_err());
    }

    #[tokio::test]
    async fn test_currency_mismatch_rejected() {
        let guard = guard_with_spend(0);
        let agent = AgentId::new();
        guard
            .set_limits(
                OwnerId::new(),
                agent,
                SetSpendingLimits {
                    per_transaction: Some(Amount::usd(50_00)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let eur = Amount::new(10_00, Currency::EUR);
        assert!(matches!(
            guard.check(&agent, eur).await,
            Err(MarketError::CurrencyMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_positive_caps_rejected() {
        let guard = guard_with_spend(0);
        let result = guard
            .set_limits(
                OwnerId::new(),
                AgentId::new(),
                SetSpendingLimits {
                    daily: Some(Amount::usd(0)),
                    ..Default::default()
                },
            )
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_window_boundaries() {
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 17, 45, 12).unwrap();
        assert_eq!(
            start_of_utc_day(now),
            Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(
            start_of_utc_month(now),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_allow_all_guard() {
        let guard = AllowAllGuard;
        assert!(guard
            .check(&AgentId::new(), Amount::usd(i64::MAX))
            .await
            .is_ok());
    }
}
