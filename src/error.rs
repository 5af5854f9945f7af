//! Engine error taxonomy (§7).
//!
//! Four kinds only: the adapter maps these to HTTP status codes
//! (400/404/409/500). The engine never retries; every write happens inside
//! one transaction that commits or aborts as a unit.

/// Errors surfaced by [`crate::engine::Engine`].
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// A precondition was violated: non-positive price/quantity, unknown
    /// side, or similar caller error.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced commodity, order, or customer does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (duplicate email/api_key/symbol/name).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence failed; the transaction was aborted and no partial state
    /// is observable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        EngineError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                EngineError::Conflict(db_err.message().to_string())
            }
            sqlx::Error::RowNotFound => EngineError::NotFound("row not found".to_string()),
            other => EngineError::Internal(other.to_string()),
        }
    }
}
