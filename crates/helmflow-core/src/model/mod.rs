//! Persistent resource model

mod credentials;
mod limits;
mod resource;

pub use credentials::{ApiCredentials, GitCredentials};
pub use limits::ResourceLimits;
pub use resource::{validate_name, ResourceKind, ResourceRecord};
