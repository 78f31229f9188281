//! Operator approval
//!
//! Nothing is provisioned until an operator signs off. The gate is the only
//! path that grants approval; the scheduler reads `approved_at` and refuses
//! to select creations or updates without it. Drift revokes approval, so a
//! changed resource always comes back through here.

use helmflow_core::{ResourceKind, ResourceRecord};
use helmflow_store::ResourceStore;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

/// Grants operator approval for pending resources
#[derive(Clone)]
pub struct ApprovalGate {
    store: Arc<ResourceStore>,
}

impl ApprovalGate {
    pub fn new(store: Arc<ResourceStore>) -> Self {
        Self { store }
    }

    /// Approve a resource for provisioning
    ///
    /// Requires a bound template and a record that is neither already
    /// approved nor marked for deletion; violations surface as `Conflict`.
    pub async fn approve(
        &self,
        kind: ResourceKind,
        tenant: &str,
        name: &str,
    ) -> Result<ResourceRecord> {
        let record = self.store.approve(kind, tenant, name).await?;
        info!(resource = %record.qualified_name(), "Approval granted");
        Ok(record)
    }
}
