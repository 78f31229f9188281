//! Action executors
//!
//! An executor owns the full life of one dispatched action: take the
//! per-resource lock, reload the record, render, drive the provisioner and
//! record the outcome. On any failure the store is left untouched and the
//! dispatch mark stays set, so a failed action is never silently retried;
//! recovery is an explicit operator re-arm.

use crate::context::ReconcilerContext;
use crate::error::{ReconcilerError, Result};
use crate::scheduler::DispatchItem;
use helmflow_core::{ActionKind, ApiCredentials, DispatchState, ResourceKind, ResourceRecord};
use helmflow_render::{materialize, ManifestRenderer, ManifestSet, TemplateData, TemplateTree};
use helmflow_store::StoreError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Data keys a cluster record may use to expose its API server
const API_ENDPOINT_KEY: &str = "api-endpoint";
const KUBECONFIG_KEY: &str = "kubeconfig";

/// Reserved template keys carrying the record's quota settings
const LIMIT_CPU_KEY: &str = "limit_cpu";
const LIMIT_MEMORY_KEY: &str = "limit_memory";

/// Executes one dispatched action against one resource
#[derive(Clone)]
pub struct ActionExecutor {
    ctx: ReconcilerContext,
}

impl ActionExecutor {
    pub fn new(ctx: ReconcilerContext) -> Self {
        Self { ctx }
    }

    /// Run one action to completion
    ///
    /// Holds the resource lock for the whole execution. A record that
    /// vanished between dispatch and execution counts as already resolved.
    pub async fn execute(&self, item: DispatchItem) -> Result<()> {
        let _guard = self.ctx.locks.lock(item.id).await;

        let record = match self.ctx.store.get_by_id(item.id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                info!(id = %item.id, action = %item.action, "Record gone, nothing to do");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let deadline = self.ctx.timeouts.for_action(item.action);
        match item.action {
            ActionKind::Create => self.create(record, deadline).await,
            ActionKind::Update => self.update(record, deadline).await,
            ActionKind::Delete => self.delete(record, deadline).await,
        }
    }

    fn manifest_dir(&self, record: &ResourceRecord) -> PathBuf {
        self.ctx.manifests_root.join(record.id.to_string())
    }

    /// Render the record's bound template into a validated manifest set
    async fn render(&self, record: &ResourceRecord) -> Result<ManifestSet> {
        let template = record
            .template
            .as_deref()
            .ok_or_else(|| ReconcilerError::MissingTemplate(record.qualified_name()))?;
        let spec = self.ctx.store.get_template(template).await?;
        let tree = TemplateTree::from_dir(&spec.path)?;

        let (plain, secret) = self.gather(record)?;
        let mut renderer = ManifestRenderer::new(&plain, &secret);
        Ok(renderer.render(&tree)?)
    }

    /// Build the template namespaces from an unsealed record
    ///
    /// Quota settings ride along as reserved keys so templates can emit
    /// resource sections without the operator duplicating them into data.
    fn gather(&self, record: &ResourceRecord) -> Result<(TemplateData, TemplateData)> {
        let mut unsealed = record.clone();
        self.ctx.store.vault().unseal_record(&mut unsealed)?;

        let mut plain = unsealed.data;
        if let Some(limits) = &unsealed.limits {
            if let Some(cpu) = &limits.cpu {
                plain.insert(LIMIT_CPU_KEY.to_string(), cpu.clone());
            }
            if let Some(memory) = &limits.memory {
                plain.insert(LIMIT_MEMORY_KEY.to_string(), memory.clone());
            }
        }

        Ok((plain, unsealed.secret_data))
    }

    /// Fresh API credentials for a cluster record, from its own data
    fn api_credentials(&self, record: &ResourceRecord) -> Result<Option<ApiCredentials>> {
        if record.kind != ResourceKind::Cluster {
            return Ok(None);
        }

        let mut unsealed = record.clone();
        self.ctx.store.vault().unseal_record(&mut unsealed)?;

        let Some(endpoint) = unsealed.data.get(API_ENDPOINT_KEY) else {
            return Ok(None);
        };
        let mut api = ApiCredentials::new(endpoint);
        if let Some(kubeconfig) = unsealed.secret_data.get(KUBECONFIG_KEY) {
            api = api.with_kubeconfig(kubeconfig);
        }
        Ok(Some(api))
    }

    async fn create(&self, record: ResourceRecord, deadline: Duration) -> Result<()> {
        let set = self.render(&record).await?;
        let dir = self.manifest_dir(&record);

        // A leftover directory from an earlier attempt surfaces as
        // Forbidden; re-arming the creation removes it along with the mark.
        materialize(&set, &dir, false)?;

        self.ctx.provisioner.apply(&dir, deadline).await?;

        let api = self.api_credentials(&record)?;
        self.ctx.store.record_deployed(record.id, api).await?;

        info!(
            resource = %record.qualified_name(),
            kind = %record.kind,
            "Created"
        );
        Ok(())
    }

    async fn update(&self, record: ResourceRecord, deadline: Duration) -> Result<()> {
        let set = self.render(&record).await?;
        let dir = self.manifest_dir(&record);

        materialize(&set, &dir, true)?;

        self.ctx.provisioner.apply(&dir, deadline).await?;

        let api = self.api_credentials(&record)?;
        self.ctx.store.record_updated(record.id, api).await?;

        info!(resource = %record.qualified_name(), "Updated");
        Ok(())
    }

    async fn delete(&self, record: ResourceRecord, deadline: Duration) -> Result<()> {
        let dir = self.manifest_dir(&record);

        if DispatchState::of(&record).never_provisioned() {
            // Nothing was ever dispatched outward; this is pure bookkeeping
            if dir.exists() {
                tokio::fs::remove_dir_all(&dir).await?;
            }
            self.ctx.store.remove(record.id).await?;
            self.ctx.locks.forget(record.id).await;
            info!(
                resource = %record.qualified_name(),
                "Deleted record, nothing was provisioned"
            );
            return Ok(());
        }

        if !dir.exists() {
            // Manifests lost since creation; regenerate them for teardown
            warn!(
                resource = %record.qualified_name(),
                dir = %dir.display(),
                "Manifest directory missing, re-rendering for teardown"
            );
            let set = self.render(&record).await?;
            materialize(&set, &dir, false)?;
        }

        self.ctx.provisioner.delete(&dir, deadline).await?;

        tokio::fs::remove_dir_all(&dir).await?;
        self.ctx.store.remove(record.id).await?;
        self.ctx.locks.forget(record.id).await;

        info!(resource = %record.qualified_name(), "Deleted");
        Ok(())
    }
}
