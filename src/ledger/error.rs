//! Ledger Error Types
//!
//! One error type for every store and executor operation. Store driver
//! errors are classified on conversion so callers can decide on retries
//! without inspecting SQLSTATE codes themselves.

use std::time::Duration;

use thiserror::Error;

/// SQLSTATE for `serialization_failure`
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for `deadlock_detected`
const DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE for `foreign_key_violation`
const FOREIGN_KEY_VIOLATION: &str = "23503";
/// SQLSTATE for `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for `check_violation`
const CHECK_VIOLATION: &str = "23514";

/// Ledger error types
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    // === Lookup Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Row is still referenced: {0}")]
    StillReferenced(String),

    // === Input Errors ===
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid page: limit={limit} offset={offset}")]
    InvalidPage { limit: i64, offset: i64 },

    #[error("Balance overflow on account {account_id}")]
    BalanceOverflow { account_id: i64 },

    // === Unit of Work Errors ===
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Transaction failure: {0}")]
    TransactionFailure(String),

    #[error("tx err: {error}, rb err: {rollback}")]
    RollbackFailed {
        error: Box<LedgerError>,
        rollback: String,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),

    // === Caller Signals ===
    #[error("Transfer timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transfer cancelled by caller")]
    Cancelled,
}

impl LedgerError {
    /// Stable error code for logs and upstream error mapping
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::StillReferenced(_) => "STILL_REFERENCED",
            LedgerError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            LedgerError::InvalidPage { .. } => "INVALID_PAGE",
            LedgerError::BalanceOverflow { .. } => "BALANCE_OVERFLOW",
            LedgerError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            LedgerError::TransactionFailure(_) => "TRANSACTION_FAILURE",
            LedgerError::RollbackFailed { .. } => "ROLLBACK_FAILED",
            LedgerError::DatabaseError(_) => "DATABASE_ERROR",
            LedgerError::Timeout(_) => "TIMEOUT",
            LedgerError::Cancelled => "CANCELLED",
        }
    }

    /// Whether the whole transfer may be retried from scratch.
    ///
    /// Only store-reported serialization/deadlock failures qualify. A failed
    /// rollback is never retryable even if the original error was.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound(_))
    }

    /// The failure that caused the unit of work to abort.
    ///
    /// For `RollbackFailed` this is the original error, otherwise `self`.
    pub fn source_error(&self) -> &LedgerError {
        match self {
            LedgerError::RollbackFailed { error, .. } => error,
            other => other,
        }
    }

    pub(crate) fn not_found(entity: &str, id: i64) -> Self {
        LedgerError::NotFound(format!("{} {}", entity, id))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => LedgerError::NotFound(e.to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    LedgerError::ConcurrencyConflict(db_err.message().to_string())
                }
                Some(FOREIGN_KEY_VIOLATION) => LedgerError::NotFound(db_err.message().to_string()),
                Some(UNIQUE_VIOLATION) | Some(CHECK_VIOLATION) => {
                    LedgerError::ConstraintViolation(db_err.message().to_string())
                }
                _ => LedgerError::DatabaseError(e.to_string()),
            },
            _ => LedgerError::DatabaseError(e.to_string()),
        }
    }
}
