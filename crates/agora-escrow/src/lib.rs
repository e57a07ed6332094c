//! Agora Escrow - Per-Transaction Escrow Ledger
//!
//! Escrow is the default for all value movements in Agora: buyer money is
//! held by the platform between authorization and settlement. One record
//! exists per transaction, and only the transaction FSM mutates it, through
//! the narrow verbs here.
//!
//! # Invariant
//!
//! For every record, `held - released - refunded >= 0` at all times, and
//! exactly 0 once the record reaches a terminal state. Every mutation
//! re-checks the invariant before persisting.

use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use agora_types::{
    Amount, AuthRef, EscrowId, EscrowRecord, EscrowStatus, MarketError, Result, TransactionId,
};

/// Ledger of escrow records, keyed by transaction
pub struct EscrowLedger {
    records: RwLock<HashMap<TransactionId, EscrowRecord>>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Record a funded hold for a transaction
    ///
    /// Fails with Conflict if the transaction already has an escrow record:
    /// funding the same transaction twice is a double-spend.
    pub async fn fund(
        &self,
        transaction_id: TransactionId,
        amount: Amount,
        auth_ref: AuthRef,
    ) -> Result<EscrowRecord> {
        if !amount.is_positive() {
            return Err(MarketError::validation("amount", "must be positive"));
        }

        let mut records = self.records.write().await;
        if records.contains_key(&transaction_id) {
            return Err(MarketError::conflict(format!(
                "escrow already exists for {}",
                transaction_id
            )));
        }

        let now = Utc::now();
        let record = EscrowRecord {
            id: EscrowId::new(),
            transaction_id,
            auth_ref,
            held: amount,
            released: Amount::zero(amount.currency),
            refunded: Amount::zero(amount.currency),
            status: EscrowStatus::Funded,
            created_at: now,
            updated_at: now,
        };
        Self::check_conservation(&record)?;

        records.insert(transaction_id, record.clone());
        info!(transaction = %transaction_id, amount = %amount, "escrow funded");
        Ok(record)
    }

    /// Release the full outstanding amount to the seller
    pub async fn release(&self, transaction_id: &TransactionId) -> Result<EscrowRecord> {
        self.close(transaction_id, EscrowStatus::Released, None).await
    }

    /// Refund the buyer; `None` refunds the full outstanding amount
    ///
    /// A partial refund releases the remainder to the seller in the same
    /// mutation, so the record still closes at zero outstanding.
    pub async fn refund(
        &self,
        transaction_id: &TransactionId,
        amount: Option<Amount>,
    ) -> Result<EscrowRecord> {
        self.close(transaction_id, EscrowStatus::Refunded, amount).await
    }

    async fn close(
        &self,
        transaction_id: &TransactionId,
        terminal: EscrowStatus,
        refund_amount: Option<Amount>,
    ) -> Result<EscrowRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(transaction_id)
            .ok_or_else(|| MarketError::not_found(format!("escrow for {}", transaction_id)))?;

        if !matches!(record.status, EscrowStatus::Funded | EscrowStatus::Disputed) {
            return Err(MarketError::invalid_status("escrow close", record.status));
        }

        let outstanding = record.outstanding()?;
        match terminal {
            EscrowStatus::Released => {
                record.released = record.released.checked_add(outstanding)?;
            }
            EscrowStatus::Refunded => {
                let refunded = match refund_amount {
                    Some(amount) => {
                        if amount.is_negative() {
                            return Err(MarketError::validation("amount", "cannot be negative"));
                        }
                        match amount.partial_cmp(&outstanding) {
                            Some(ordering) if ordering.is_le() => amount,
                            Some(_) => {
                                return Err(MarketError::validation(
                                    "amount",
                                    "refund exceeds outstanding escrow",
                                ))
                            }
                            None => {
                                return Err(MarketError::CurrencyMismatch {
                                    expected: outstanding.currency.code().to_string(),
                                    actual: amount.currency.code().to_string(),
                                })
                            }
                        }
                    }
                    None => outstanding,
                };
                record.refunded = record.refunded.checked_add(refunded)?;
                // Remainder of a partial refund goes to the seller
                record.released = record
                    .released
                    .checked_add(outstanding.checked_sub(refunded)?)?;
            }
            _ => return Err(MarketError::internal("close called with non-terminal status")),
        }

        record.status = terminal;
        record.updated_at = Utc::now();
        Self::check_conservation(record)?;
        info!(transaction = %transaction_id, status = %record.status, "escrow closed");
        Ok(record.clone())
    }

    /// Freeze the record while a dispute is resolved
    pub async fn mark_disputed(&self, transaction_id: &TransactionId) -> Result<EscrowRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(transaction_id)
            .ok_or_else(|| MarketError::not_found(format!("escrow for {}", transaction_id)))?;

        if record.status != EscrowStatus::Funded {
            return Err(MarketError::invalid_status("escrow dispute", record.status));
        }

        record.status = EscrowStatus::Disputed;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Fetch the record for a transaction
    pub async fn get(&self, transaction_id: &TransactionId) -> Result<EscrowRecord> {
        self.records
            .read()
            .await
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| MarketError::not_found(format!("escrow for {}", transaction_id)))
    }

    /// Amount still held for a transaction
    pub async fn outstanding(&self, transaction_id: &TransactionId) -> Result<Amount> {
        self.get(transaction_id).await?.outstanding()
    }

    fn check_conservation(record: &EscrowRecord) -> Result<()> {
        if record.is_conserved() {
            Ok(())
        } else {
            Err(MarketError::internal(format!(
                "escrow conservation violated for {}",
                record.transaction_id
            )))
        }
    }
}

impl Default for EscrowLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AuthRef {
        AuthRef::new("auth_test")
    }

    #[tokio::test]
    async fn test_fund_and_release() {
        let ledger = EscrowLedger::new();
        let tx = TransactionId::new();

        let record = ledger.fund(tx, Amount::usd(10_000), auth()).await.unwrap();
        assert_eq!(record.status, EscrowStatus::Funded);
        assert_eq!(ledger.outstanding(&tx).await.unwrap(), Amount::usd(10_000));

        let record = ledger.release(&tx).await.unwrap();
        assert_eq!(record.status, EscrowStatus::Released);
        assert_eq!(record.released, Amount::usd(10_000));
        assert_eq!(ledger.outstanding(&tx).await.unwrap(), Amount::usd(0));
    }

    #[tokio::test]
    async fn test_double_fund_is_conflict() {
        let ledger = EscrowLedger::new();
        let tx = TransactionId::new();

        ledger.fund(tx, Amount::usd(10_000), auth()).await.unwrap();
        assert!(matches!(
            ledger.fund(tx, Amount::usd(10_000), auth()).await,
            Err(MarketError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_full_refund() {
        let ledger = EscrowLedger::new();
        let tx = TransactionId::new();

        ledger.fund(tx, Amount::usd(10_000), auth()).await.unwrap();
        let record = ledger.refund(&tx, None).await.unwrap();

        assert_eq!(record.status, EscrowStatus::Refunded);
        assert_eq!(record.refunded, Amount::usd(10_000));
        assert_eq!(record.released, Amount::usd(0));
        assert!(record.is_conserved());
    }

    #[tokio::test]
    async fn test_partial_refund_releases_remainder() {
        let ledger = EscrowLedger::new();
        let tx = TransactionId::new();

        ledger.fund(tx, Amount::usd(10_000), auth()).await.unwrap();
        let record = ledger.refund(&tx, Some(Amount::usd(3_000))).await.unwrap();

        assert_eq!(record.status, EscrowStatus::Refunded);
        assert_eq!(record.refunded, Amount::usd(3_000));
        assert_eq!(record.released, Amount::usd(7_000));
        assert_eq!(record.outstanding().unwrap(), Amount::usd(0));
    }

    #[tokio::test]
    async fn test_refund_cannot_exceed_outstanding() {
        let ledger = EscrowLedger::new();
        let tx = TransactionId::new();

        ledger.fund(tx, Amount::usd(10_000), auth()).await.unwrap();
        assert!(ledger
            .refund(&tx, Some(Amount::usd(10_001)))
            .await
            .is_err());
        // Record untouched
        assert_eq!(
            ledger.get(&tx).await.unwrap().status,
            EscrowStatus::Funded
        );
    }

    #[tokio::test]
    async fn test_terminal_records_are_frozen() {
        let ledger = EscrowLedger::new();
        let tx = TransactionId::new();

        ledger.fund(tx, Amount::usd(10_000), auth()).await.unwrap();
        ledger.release(&tx).await.unwrap();

        assert!(ledger.release(&tx).await.is_err());
        assert!(ledger.refund(&tx, None).await.is_err());
        assert!(ledger.mark_disputed(&tx).await.is_err());
    }

    #[tokio::test]
    async fn test_dispute_then_resolve() {
        let ledger = EscrowLedger::new();
        let tx = TransactionId::new();

        ledger.fund(tx, Amount::usd(5_000), auth()).await.unwrap();
        let record = ledger.mark_disputed(&tx).await.unwrap();
        assert_eq!(record.status, EscrowStatus::Disputed);

        // Disputed escrow can still be refunded or released by the resolver
        let record = ledger.refund(&tx, None).await.unwrap();
        assert_eq!(record.status, EscrowStatus::Refunded);
    }

    #[tokio::test]
    async fn test_verbs_require_existing_record() {
        let ledger = EscrowLedger::new();
        let tx = TransactionId::new();

        assert!(matches!(
            ledger.release(&tx).await,
            Err(MarketError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.get(&tx).await,
            Err(MarketError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_positive_fund_rejected() {
        let ledger = EscrowLedger::new();
        assert!(ledger
            .fund(TransactionId::new(), Amount::usd(0), auth())
            .await
            .is_err());
    }
}
