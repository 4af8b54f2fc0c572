//! Error types for ad catalog operations

use uuid::Uuid;

/// Errors from ad configuration and storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid advertisement configuration: {0}")]
    InvalidAdConfig(String),

    #[error("advertisement not found: {0}")]
    NotFound(Uuid),

    #[error("ad store error: {0}")]
    Store(String),
}

/// Result alias for ad operations.
pub type Result<T> = std::result::Result<T, Error>;
