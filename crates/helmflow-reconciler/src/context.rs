//! Shared wiring for scheduler and executors

use crate::locks::LockTable;
use helmflow_core::ActionKind;
use helmflow_provision::{
    Provisioner, DEFAULT_CREATE_TIMEOUT, DEFAULT_DELETE_TIMEOUT, DEFAULT_UPDATE_TIMEOUT,
};
use helmflow_store::ResourceStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Per-action provisioner deadlines
#[derive(Debug, Clone, Copy)]
pub struct ActionTimeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl ActionTimeouts {
    pub fn for_action(&self, action: ActionKind) -> Duration {
        match action {
            ActionKind::Create => self.create,
            ActionKind::Update => self.update,
            ActionKind::Delete => self.delete,
        }
    }
}

impl Default for ActionTimeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_CREATE_TIMEOUT,
            update: DEFAULT_UPDATE_TIMEOUT,
            delete: DEFAULT_DELETE_TIMEOUT,
        }
    }
}

/// Everything an executor needs, cheap to clone per worker
#[derive(Clone)]
pub struct ReconcilerContext {
    pub store: Arc<ResourceStore>,
    pub provisioner: Arc<dyn Provisioner>,
    pub locks: LockTable,

    /// Manifest sets are materialized at `<manifests_root>/<resource id>`
    pub manifests_root: PathBuf,

    pub timeouts: ActionTimeouts,
}

impl ReconcilerContext {
    pub fn new(
        store: Arc<ResourceStore>,
        provisioner: Arc<dyn Provisioner>,
        manifests_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            provisioner,
            locks: LockTable::new(),
            manifests_root: manifests_root.into(),
            timeouts: ActionTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ActionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}
