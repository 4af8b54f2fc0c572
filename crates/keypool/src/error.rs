//! Error types for credential pool operations

use uuid::Uuid;

/// Errors from ledger and rotator operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("credential not found: {0}")]
    NotFound(Uuid),

    #[error("ledger error: {0}")]
    Ledger(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
