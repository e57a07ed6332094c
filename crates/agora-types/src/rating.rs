//! Rating types
//!
//! Each party to a completed transaction may rate the other exactly once.

use crate::error::{MarketError, Result};
use crate::identity::{AgentId, RatingId, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest accepted score
pub const MIN_SCORE: u8 = 1;
/// Highest accepted score
pub const MAX_SCORE: u8 = 5;

/// A rating left by one transaction party about the other
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: RatingId,
    pub transaction_id: TransactionId,
    pub rater_id: AgentId,
    pub rated_id: AgentId,
    /// Score in 1..=5
    pub score: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    /// Validate a score is within 1..=5
    pub fn validate_score(score: u8) -> Result<()> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(MarketError::validation(
                "score",
                format!("must be between {} and {}", MIN_SCORE, MAX_SCORE),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounds() {
        assert!(Rating::validate_score(0).is_err());
        for score in MIN_SCORE..=MAX_SCORE {
            assert!(Rating::validate_score(score).is_ok());
        }
        assert!(Rating::validate_score(6).is_err());
    }
}
