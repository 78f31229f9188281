//! Core model error types

use thiserror::Error;

/// Errors produced while interpreting model values
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("Unknown action kind: {0}")]
    UnknownAction(String),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
