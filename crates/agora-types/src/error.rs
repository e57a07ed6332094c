//! Error taxonomy for Agora
//!
//! One error type spans the workspace so the failure classes stay closed:
//! validation, authorization, state, limit, gateway, conflict, internal.
//! Validation / Unauthorized / InvalidStatus / LimitExceeded surface verbatim
//! to callers; Gateway errors are retryable; Internal errors are opaque.

use crate::money::Amount;
use thiserror::Error;

/// Result type for Agora operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Agora error types
#[derive(Debug, Clone, Error)]
pub enum MarketError {
    // ========================================================================
    // Validation
    // ========================================================================

    /// Malformed input; rejected before any side effect
    #[error("Invalid input: {field} - {reason}")]
    Validation { field: String, reason: String },

    /// Arithmetic across two currencies
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    /// Currency code outside the closed set
    #[error("Unknown currency: {code}")]
    UnknownCurrency { code: String },

    /// Amount arithmetic overflowed
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    // ========================================================================
    // Authorization
    // ========================================================================

    /// Actor lacks the role or relationship for this operation
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    // ========================================================================
    // State
    // ========================================================================

    /// Operation is valid but not at this lifecycle state
    #[error("Invalid status for {operation}: {status}")]
    InvalidStatus { operation: String, status: String },

    // ========================================================================
    // Spending limits
    // ========================================================================

    /// The spending guard refused the amount
    #[error("Spending limit exceeded ({limit}): spent {spent} + {requested} would exceed {cap}")]
    LimitExceeded {
        limit: String,
        cap: Amount,
        spent: Amount,
        requested: Amount,
    },

    // ========================================================================
    // Gateway
    // ========================================================================

    /// External payment call failed or timed out; compensations have run
    #[error("Gateway {verb} failed: {reason}")]
    Gateway { verb: String, reason: String },

    // ========================================================================
    // Concurrency
    // ========================================================================

    /// Concurrent modification lost a race; the caller may retry
    #[error("Conflict: {resource}")]
    Conflict { resource: String },

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Referenced entity does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    // ========================================================================
    // Internal
    // ========================================================================

    /// Invariant violation or unreachable branch; detail never leaks upward
    #[error("Internal error")]
    Internal { message: String },
}

impl MarketError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn invalid_status(operation: impl Into<String>, status: impl ToString) -> Self {
        Self::InvalidStatus {
            operation: operation.into(),
            status: status.to_string(),
        }
    }

    pub fn gateway(verb: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Gateway {
            verb: verb.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if the caller may retry this error
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Gateway { .. } | Self::Conflict { .. })
    }

    /// Get a stable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "INVALID_INPUT",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::UnknownCurrency { .. } => "UNKNOWN_CURRENCY",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::InvalidStatus { .. } => "INVALID_STATUS",
            Self::LimitExceeded { .. } => "SPENDING_LIMIT_EXCEEDED",
            Self::Gateway { .. } => "GATEWAY_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MarketError::unauthorized("not the order owner");
        assert_eq!(err.error_code(), "UNAUTHORIZED");

        let err = MarketError::invalid_status("confirm", "pending");
        assert_eq!(err.error_code(), "INVALID_STATUS");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(MarketError::gateway("capture", "timed out").is_retriable());
        assert!(MarketError::conflict("transaction tx_1").is_retriable());
        assert!(!MarketError::validation("quantity", "must be positive").is_retriable());
    }

    #[test]
    fn test_internal_error_is_opaque() {
        let err = MarketError::internal("escrow ledger desync for tx_42");
        assert_eq!(err.to_string(), "Internal error");
    }
}
