//! Provisioner client for the HelmFlow control plane
//!
//! Drives the external provisioning tool (kubectl by default) against a
//! directory of materialized manifests. Everything behind the [`Provisioner`]
//! trait so executors can be tested without any external tool installed.

pub mod error;
pub mod provisioner;

pub use error::{ProvisionError, Result};
pub use provisioner::{
    CliProvisioner, CommandSpec, Provisioner, DEFAULT_CREATE_TIMEOUT, DEFAULT_DELETE_TIMEOUT,
    DEFAULT_UPDATE_TIMEOUT,
};
