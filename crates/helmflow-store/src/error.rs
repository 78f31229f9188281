//! Error types for store operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested transition is not valid for the record's current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No record or template under that name
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Vault error: {0}")]
    VaultError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
