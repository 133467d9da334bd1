//! Database error types.

use thiserror::Error;

use pulse_models::{Coins, MoneyError, TransitionError};

/// Result type for repository operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in repository operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: Coins, available: Coins },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Retry limit exceeded after {attempts} attempts")]
    RetryLimitExceeded { attempts: u32 },
}

impl DbError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// SQLSTATE of the underlying database error, if any.
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            Self::Query(e) => e
                .as_database_error()
                .and_then(|db| db.code())
                .map(|code| code.into_owned()),
            _ => None,
        }
    }

    /// Serialization failures, deadlocks, and pool timeouts are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Query(sqlx::Error::PoolTimedOut) => true,
            Self::Query(_) => matches!(
                self.sqlstate().as_deref(),
                Some("40001") | // serialization_failure
                Some("40P01") // deadlock_detected
            ),
            _ => false,
        }
    }

    /// True for `unique_violation` (23505).
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate().as_deref() == Some("23505")
    }

    /// True for `foreign_key_violation` (23503).
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate().as_deref() == Some("23503")
    }
}

impl From<TransitionError> for DbError {
    fn from(e: TransitionError) -> Self {
        Self::InvalidState(e.to_string())
    }
}

impl From<MoneyError> for DbError {
    fn from(e: MoneyError) -> Self {
        Self::Invalid(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_are_not_retryable() {
        assert!(!DbError::not_found("wallet").is_retryable());
        assert!(!DbError::InsufficientFunds { needed: 10, available: 2 }.is_retryable());
        assert!(!DbError::Query(sqlx::Error::RowNotFound).is_retryable());
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        assert!(DbError::Query(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn test_transition_error_maps_to_invalid_state() {
        let err: DbError = TransitionError::new("deposit", "completed", "failed").into();
        assert!(matches!(err, DbError::InvalidState(ref msg) if msg.contains("completed")));
    }

    #[test]
    fn test_money_error_maps_to_invalid() {
        let err: DbError = MoneyError::Overflow.into();
        assert!(matches!(err, DbError::Invalid(_)));
        assert!(err.sqlstate().is_none());
    }
}
