//! Escrow record types
//!
//! One escrow record per transaction. The record's status moves in lockstep
//! with the transaction status, and the held amount is conserved:
//! held - released - refunded >= 0 at all times, exactly 0 once terminal.

use crate::error::Result;
use crate::identity::{AuthRef, EscrowId, TransactionId};
use crate::money::Amount;
use crate::transaction::TransactionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an escrow record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Created but not yet funded
    Pending,
    /// Gateway authorization held
    Funded,
    /// Released to the seller
    Released,
    /// Refunded to the buyer (possibly partially, remainder released)
    Refunded,
    /// Frozen pending dispute resolution
    Disputed,
}

impl EscrowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Funded => "funded",
            Self::Released => "released",
            Self::Refunded => "refunded",
            Self::Disputed => "disputed",
        };
        write!(f, "{}", s)
    }
}

/// Funds held by the platform between buyer authorization and settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub id: EscrowId,
    pub transaction_id: TransactionId,
    /// Gateway authorization backing the hold
    pub auth_ref: AuthRef,
    /// Amount held when the escrow was funded
    pub held: Amount,
    /// Portion released to the seller
    pub released: Amount,
    /// Portion refunded to the buyer
    pub refunded: Amount,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscrowRecord {
    /// Amount still held: held - released - refunded
    pub fn outstanding(&self) -> Result<Amount> {
        self.held
            .checked_sub(self.released)?
            .checked_sub(self.refunded)
    }

    /// Check the conservation invariant for the current status
    pub fn is_conserved(&self) -> bool {
        match self.outstanding() {
            Ok(outstanding) => {
                if self.status.is_terminal() {
                    outstanding.is_zero()
                } else {
                    !outstanding.is_negative()
                }
            }
            Err(_) => false,
        }
    }

    /// The transaction status this escrow status must pair with
    pub fn pairs_with(&self, status: TransactionStatus) -> bool {
        matches!(
            (self.status, status),
            (EscrowStatus::Funded, TransactionStatus::EscrowFunded)
                | (EscrowStatus::Funded, TransactionStatus::Delivered)
                | (EscrowStatus::Released, TransactionStatus::Completed)
                | (EscrowStatus::Refunded, TransactionStatus::Refunded)
                | (EscrowStatus::Disputed, TransactionStatus::Disputed)
        )
    }
}
