//! Error types for the reconciliation engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcilerError {
    #[error("Store error: {0}")]
    Store(#[from] helmflow_store::StoreError),

    #[error("Render error: {0}")]
    Render(#[from] helmflow_render::RenderError),

    #[error("Provisioner error: {0}")]
    Provision(#[from] helmflow_provision::ProvisionError),

    /// A record reached an executor without a template binding
    #[error("No template bound: {0}")]
    MissingTemplate(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;
