//! Error types for provisioner operations

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The external tool exited non-zero
    #[error("Command failed: {program} (exit {code:?})\n{stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The per-action deadline elapsed; the child process was killed
    #[error("Command timed out after {after:?}: {program}")]
    Timeout { program: String, after: Duration },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
