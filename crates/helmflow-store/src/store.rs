//! State management for reconciled resources
//!
//! Manages the `.helmflow/state.json` file which tracks every resource
//! record plus the template registry. All mutating operations follow the
//! same cycle: acquire the lock file, load fresh state, apply a conditional
//! mutation, save, release. Conditions are re-checked against the freshly
//! loaded state, so a stale caller gets a `Conflict` instead of silently
//! clobbering a concurrent transition.

use crate::error::{Result, StoreError};
use crate::vault::SecretVault;
use chrono::{DateTime, Utc};
use helmflow_core::{next_action, ActionKind, ApiCredentials, DispatchState, ResourceKind, ResourceRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".helmflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Full persisted state: resources plus the template registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Records indexed by kind:tenant:name
    pub resources: HashMap<String, ResourceRecord>,

    /// Registered templates by name
    #[serde(default)]
    pub templates: HashMap<String, TemplateSpec>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: HashMap::new(),
            templates: HashMap::new(),
        }
    }
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(kind: ResourceKind, tenant: &str, name: &str) -> String {
        format!("{}:{}:{}", kind, tenant, name)
    }

    fn get(&self, kind: ResourceKind, tenant: &str, name: &str) -> Option<&ResourceRecord> {
        self.resources.get(&Self::key_of(kind, tenant, name))
    }

    fn get_mut_by_id(&mut self, id: Uuid) -> Option<&mut ResourceRecord> {
        self.resources.values_mut().find(|r| r.id == id)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A registered manifest template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Registry name, referenced by resource records
    pub name: String,

    /// Directory holding the template tree
    pub path: PathBuf,

    /// When the template was (last) registered
    pub registered_at: DateTime<Utc>,
}

/// Store for reading and conditionally mutating resource state
pub struct ResourceStore {
    /// Directory containing `.helmflow/`
    root: PathBuf,
    vault: SecretVault,
    /// Serializes in-process cycles; the lock file guards other processes
    cycle_guard: tokio::sync::Mutex<()>,
}

impl ResourceStore {
    pub fn open(root: impl AsRef<Path>, vault: SecretVault) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            vault,
            cycle_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn vault(&self) -> &SecretVault {
        &self.vault
    }

    fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state without taking the lock file
    ///
    /// Fine for read paths; mutations go through [`Self::with_state`].
    /// Readers in this process never observe a half-finished save.
    pub async fn load(&self) -> Result<StoreState> {
        let _cycle = self.cycle_guard.lock().await;
        self.load_unlocked().await
    }

    async fn load_unlocked(&self) -> Result<StoreState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StoreState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StoreState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(StoreError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        Ok(state)
    }

    async fn save(&self, state: &StoreState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Acquire the lock file for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than 1 hour are treated as crashed holders
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(StoreError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        Ok(StateLock {
            lock_path,
            released: false,
        })
    }

    /// Run one exclusive lock-load-mutate-save cycle
    ///
    /// The closure's error aborts the cycle without saving. The lock is
    /// released on every path.
    async fn with_state<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<T>,
    ) -> Result<T> {
        let _cycle = self.cycle_guard.lock().await;
        let lock = self.acquire_lock().await?;
        let result = match self.load_unlocked().await {
            Ok(mut state) => match f(&mut state) {
                Ok(value) => {
                    state.touch();
                    self.save(&state).await.map(|_| value)
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        lock.release().await?;
        result
    }

    /// Insert a new record or apply configuration changes to an existing one
    ///
    /// On an existing record only the configuration fields are taken from
    /// `incoming`; identity and lifecycle fields are preserved. When the
    /// record has been provisioned (or provisioning is in flight) and a
    /// manifest-producing input changed, the drift rule fires: the record is
    /// flagged `pending_update` and its approval is revoked.
    pub async fn upsert(&self, incoming: ResourceRecord) -> Result<ResourceRecord> {
        let vault = self.vault.clone();
        self.with_state(move |state| {
            let key = StoreState::key_of(incoming.kind, &incoming.tenant, &incoming.name);
            match state.resources.get_mut(&key) {
                None => {
                    let mut fresh = incoming;
                    vault.seal_record(&mut fresh)?;
                    tracing::info!(
                        kind = %fresh.kind,
                        resource = %fresh.qualified_name(),
                        "Inserted resource record"
                    );
                    let stored = fresh.clone();
                    state.resources.insert(key, fresh);
                    Ok(stored)
                }
                Some(existing) => {
                    if existing.desired_delete {
                        return Err(StoreError::Conflict(format!(
                            "{} is marked for deletion",
                            existing.qualified_name()
                        )));
                    }

                    // Sealing uses a random nonce, so an unchanged secret
                    // must keep its existing ciphertext or the drift compare
                    // below would always fire.
                    let mut sealed_secrets = std::collections::BTreeMap::new();
                    for (name, value) in incoming.secret_data {
                        let plain = vault.unseal(&value)?;
                        let sealed = match existing.secret_data.get(&name) {
                            Some(old) if vault.unseal(old)? == plain => old.clone(),
                            _ => vault.seal(&plain)?,
                        };
                        sealed_secrets.insert(name, sealed);
                    }

                    let before = existing.clone();
                    existing.template = incoming.template;
                    existing.cluster = incoming.cluster;
                    existing.data = incoming.data;
                    existing.secret_data = sealed_secrets;
                    existing.limits = incoming.limits;
                    if let Some(mut git) = incoming.git {
                        if let Some(token) = git.token.as_mut() {
                            *token = vault.seal(token)?;
                        }
                        existing.git = Some(git);
                    }
                    existing.updated_at = Utc::now();

                    let provisioning_started =
                        before.deployed_at.is_some() || before.creation_dispatched_at.is_some();
                    if provisioning_started && before.manifest_inputs() != existing.manifest_inputs()
                    {
                        existing.pending_update = true;
                        existing.approved_at = None;
                        tracing::info!(
                            resource = %existing.qualified_name(),
                            "Configuration drift detected, approval revoked"
                        );
                    }
                    Ok(existing.clone())
                }
            }
        })
        .await
    }

    /// Fetch one record; secrets stay sealed
    pub async fn get(
        &self,
        kind: ResourceKind,
        tenant: &str,
        name: &str,
    ) -> Result<ResourceRecord> {
        let state = self.load().await?;
        state
            .get(kind, tenant, name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{}:{}/{}", kind, tenant, name)))
    }

    /// Fetch one record by id; secrets stay sealed
    pub async fn get_by_id(&self, id: Uuid) -> Result<ResourceRecord> {
        let state = self.load().await?;
        state
            .resources
            .values()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("resource {}", id)))
    }

    /// All records in deterministic sweep order: kind, then creation time, then id
    pub async fn list(&self) -> Result<Vec<ResourceRecord>> {
        let state = self.load().await?;
        let mut records: Vec<ResourceRecord> = state.resources.into_values().collect();
        records.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(records)
    }

    /// Grant approval; the sole unblocker for creation and update
    ///
    /// Fails with `Conflict` when no template is bound, when the record is
    /// marked for deletion, or when approval was already granted.
    pub async fn approve(
        &self,
        kind: ResourceKind,
        tenant: &str,
        name: &str,
    ) -> Result<ResourceRecord> {
        let key = StoreState::key_of(kind, tenant, name);
        let label = format!("{}:{}/{}", kind, tenant, name);
        self.with_state(move |state| {
            let record = state
                .resources
                .get_mut(&key)
                .ok_or_else(|| StoreError::NotFound(label.clone()))?;

            if record.template.is_none() {
                return Err(StoreError::Conflict(format!(
                    "{} has no template bound",
                    record.qualified_name()
                )));
            }
            if record.desired_delete {
                return Err(StoreError::Conflict(format!(
                    "{} is marked for deletion",
                    record.qualified_name()
                )));
            }
            if record.approved_at.is_some() {
                return Err(StoreError::Conflict(format!(
                    "{} is already approved",
                    record.qualified_name()
                )));
            }

            record.approved_at = Some(Utc::now());
            record.updated_at = Utc::now();
            tracing::info!(resource = %record.qualified_name(), "Approved");
            Ok(record.clone())
        })
        .await
    }

    /// Flag a record for teardown; idempotent
    pub async fn mark_desired_delete(
        &self,
        kind: ResourceKind,
        tenant: &str,
        name: &str,
    ) -> Result<ResourceRecord> {
        let key = StoreState::key_of(kind, tenant, name);
        let label = format!("{}:{}/{}", kind, tenant, name);
        self.with_state(move |state| {
            let record = state
                .resources
                .get_mut(&key)
                .ok_or_else(|| StoreError::NotFound(label.clone()))?;

            if !record.desired_delete {
                record.desired_delete = true;
                record.updated_at = Utc::now();
                tracing::info!(resource = %record.qualified_name(), "Marked for deletion");
            }
            Ok(record.clone())
        })
        .await
    }

    /// Set the dispatch mark for `action`, re-checking eligibility first
    ///
    /// This is the compare-and-set the scheduler relies on: if the freshly
    /// loaded record no longer selects `action` (someone else dispatched it,
    /// approval was revoked, the record vanished), the caller gets a
    /// `Conflict`/`NotFound` and must not enqueue.
    pub async fn mark_dispatched(
        &self,
        id: Uuid,
        action: ActionKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_state(move |state| {
            let record = state
                .get_mut_by_id(id)
                .ok_or_else(|| StoreError::NotFound(format!("resource {}", id)))?;

            if next_action(&DispatchState::of(record)) != Some(action) {
                return Err(StoreError::Conflict(format!(
                    "{} is no longer eligible for {}",
                    record.qualified_name(),
                    action
                )));
            }

            match action {
                ActionKind::Create => record.creation_dispatched_at = Some(now),
                ActionKind::Update => record.update_dispatched_at = Some(now),
                ActionKind::Delete => record.deletion_dispatched_at = Some(now),
            }
            record.updated_at = now;
            Ok(())
        })
        .await
    }

    /// Clear a dispatch mark: the manual recovery path after a failed action
    ///
    /// Clearing is idempotent. The operator is expected to have checked
    /// external state first; a cleared mark makes the resource eligible for
    /// selection again on the next sweep.
    pub async fn clear_dispatch(&self, id: Uuid, action: ActionKind) -> Result<ResourceRecord> {
        self.with_state(move |state| {
            let record = state
                .get_mut_by_id(id)
                .ok_or_else(|| StoreError::NotFound(format!("resource {}", id)))?;

            match action {
                ActionKind::Create => record.creation_dispatched_at = None,
                ActionKind::Update => record.update_dispatched_at = None,
                ActionKind::Delete => record.deletion_dispatched_at = None,
            }
            record.updated_at = Utc::now();
            tracing::info!(
                resource = %record.qualified_name(),
                action = %action,
                "Dispatch mark cleared"
            );
            Ok(record.clone())
        })
        .await
    }

    /// Record a successful creation, storing fresh API credentials if any
    pub async fn record_deployed(&self, id: Uuid, api: Option<ApiCredentials>) -> Result<()> {
        let api = match api {
            Some(mut api) => {
                if let Some(kubeconfig) = api.kubeconfig.as_mut() {
                    *kubeconfig = self.vault.seal(kubeconfig)?;
                }
                Some(api)
            }
            None => None,
        };
        self.with_state(move |state| {
            let record = state
                .get_mut_by_id(id)
                .ok_or_else(|| StoreError::NotFound(format!("resource {}", id)))?;

            let now = Utc::now();
            record.deployed_at = Some(now);
            record.updated_at = now;
            if let Some(api) = api {
                record.api = Some(api.refreshed_now());
            }
            tracing::info!(resource = %record.qualified_name(), "Recorded deployment");
            Ok(())
        })
        .await
    }

    /// Record a successful update
    ///
    /// Clears the drift flag and the update dispatch mark so the resource
    /// returns to quiescence. Fresh API credentials replace the stored ones
    /// when the provisioner handed any back. Approval is left standing.
    pub async fn record_updated(&self, id: Uuid, api: Option<ApiCredentials>) -> Result<()> {
        let api = match api {
            Some(mut api) => {
                if let Some(kubeconfig) = api.kubeconfig.as_mut() {
                    *kubeconfig = self.vault.seal(kubeconfig)?;
                }
                Some(api)
            }
            None => None,
        };
        self.with_state(move |state| {
            let record = state
                .get_mut_by_id(id)
                .ok_or_else(|| StoreError::NotFound(format!("resource {}", id)))?;

            record.pending_update = false;
            record.update_dispatched_at = None;
            record.updated_at = Utc::now();
            if let Some(api) = api {
                record.api = Some(api.refreshed_now());
            }
            tracing::info!(resource = %record.qualified_name(), "Recorded update");
            Ok(())
        })
        .await
    }

    /// Drop a record after teardown completed; idempotent
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        self.with_state(move |state| {
            let key = state
                .resources
                .iter()
                .find(|(_, r)| r.id == id)
                .map(|(k, _)| k.clone());
            if let Some(key) = key {
                let record = state.resources.remove(&key);
                if let Some(record) = record {
                    tracing::info!(resource = %record.qualified_name(), "Removed resource record");
                }
            }
            Ok(())
        })
        .await
    }

    /// Register a template directory under a name; re-registering replaces it
    pub async fn put_template(
        &self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<TemplateSpec> {
        let spec = TemplateSpec {
            name: name.into(),
            path: path.into(),
            registered_at: Utc::now(),
        };
        self.with_state(move |state| {
            state.templates.insert(spec.name.clone(), spec.clone());
            tracing::info!(template = %spec.name, "Registered template");
            Ok(spec)
        })
        .await
    }

    pub async fn get_template(&self, name: &str) -> Result<TemplateSpec> {
        let state = self.load().await?;
        state
            .templates
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("template {}", name)))
    }

    pub async fn list_templates(&self) -> Result<Vec<TemplateSpec>> {
        let state = self.load().await?;
        let mut templates: Vec<TemplateSpec> = state.templates.into_values().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
#[derive(Debug)]
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            // Synchronous cleanup in drop - not ideal but necessary
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> ResourceStore {
        ResourceStore::open(dir, SecretVault::disabled())
    }

    fn deployment(tenant: &str, name: &str) -> ResourceRecord {
        ResourceRecord::new(ResourceKind::Deployment, tenant, name).with_template("webapp")
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let state = store.load().await.unwrap();
        assert!(state.resources.is_empty());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_and_get_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let record = store.upsert(deployment("acme", "webapp")).await.unwrap();
        let loaded = store
            .get(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();

        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.template.as_deref(), Some("webapp"));
        assert_eq!(store.get_by_id(record.id).await.unwrap().id, record.id);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let err = store
            .get(ResourceKind::Cluster, "acme", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_existing_keeps_identity() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let first = store.upsert(deployment("acme", "webapp")).await.unwrap();
        let mut edited = deployment("acme", "webapp");
        edited.data.insert("replicas".into(), "3".into());
        let second = store.upsert(edited).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.data.get("replicas").map(String::as_str), Some("3"));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_approve_requires_template() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        store
            .upsert(ResourceRecord::new(ResourceKind::Cluster, "acme", "bare"))
            .await
            .unwrap();
        let err = store
            .approve(ResourceKind::Cluster, "acme", "bare")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_approve_once_then_conflict() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        store.upsert(deployment("acme", "webapp")).await.unwrap();
        let approved = store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();
        assert!(approved.approved_at.is_some());

        let err = store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_mark_dispatched_is_compare_and_set() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let record = store.upsert(deployment("acme", "webapp")).await.unwrap();
        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();

        store
            .mark_dispatched(record.id, ActionKind::Create, Utc::now())
            .await
            .unwrap();

        // Second dispatch of the same action must fail
        let err = store
            .mark_dispatched(record.id, ActionKind::Create, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_mark_dispatched_refuses_unapproved_create() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let record = store.upsert(deployment("acme", "webapp")).await.unwrap();
        let err = store
            .mark_dispatched(record.id, ActionKind::Create, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_drift_rule_revokes_approval() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let record = store.upsert(deployment("acme", "webapp")).await.unwrap();
        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();
        store
            .mark_dispatched(record.id, ActionKind::Create, Utc::now())
            .await
            .unwrap();
        store.record_deployed(record.id, None).await.unwrap();

        let mut edited = deployment("acme", "webapp");
        edited.data.insert("image".into(), "nginx:1.27".into());
        let drifted = store.upsert(edited).await.unwrap();

        assert!(drifted.pending_update);
        assert!(drifted.approved_at.is_none());
        assert!(drifted.deployed_at.is_some());
    }

    #[tokio::test]
    async fn test_credential_refresh_is_not_drift() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let record = store.upsert(deployment("acme", "webapp")).await.unwrap();
        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();
        store
            .mark_dispatched(record.id, ActionKind::Create, Utc::now())
            .await
            .unwrap();
        store.record_deployed(record.id, None).await.unwrap();

        let edited = deployment("acme", "webapp").with_git(
            helmflow_core::GitCredentials::new("https://example.com/repo.git"),
        );
        let refreshed = store.upsert(edited).await.unwrap();

        assert!(!refreshed.pending_update);
        assert!(refreshed.approved_at.is_some());
    }

    #[tokio::test]
    async fn test_midflight_edit_survives_deployment() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let record = store.upsert(deployment("acme", "webapp")).await.unwrap();
        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();
        store
            .mark_dispatched(record.id, ActionKind::Create, Utc::now())
            .await
            .unwrap();

        // Edit lands while the creation is still in flight
        let mut edited = deployment("acme", "webapp");
        edited.data.insert("replicas".into(), "3".into());
        let drifted = store.upsert(edited).await.unwrap();
        assert!(drifted.pending_update);
        assert!(drifted.approved_at.is_none());

        store.record_deployed(record.id, None).await.unwrap();
        let deployed = store.get_by_id(record.id).await.unwrap();

        // The edit is not in the manifests that were applied; it stays queued
        assert!(deployed.pending_update);
        assert_eq!(next_action(&DispatchState::of(&deployed)), None);

        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();
        let approved = store.get_by_id(record.id).await.unwrap();
        assert_eq!(
            next_action(&DispatchState::of(&approved)),
            Some(ActionKind::Update)
        );
    }

    #[tokio::test]
    async fn test_update_cycle_returns_to_quiescence() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let record = store.upsert(deployment("acme", "webapp")).await.unwrap();
        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();
        store
            .mark_dispatched(record.id, ActionKind::Create, Utc::now())
            .await
            .unwrap();
        store.record_deployed(record.id, None).await.unwrap();

        let mut edited = deployment("acme", "webapp");
        edited.data.insert("replicas".into(), "5".into());
        store.upsert(edited).await.unwrap();
        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();
        store
            .mark_dispatched(record.id, ActionKind::Update, Utc::now())
            .await
            .unwrap();
        store.record_updated(record.id, None).await.unwrap();

        let settled = store.get_by_id(record.id).await.unwrap();
        assert!(!settled.pending_update);
        assert!(settled.update_dispatched_at.is_none());
        assert!(settled.approved_at.is_some());
        assert_eq!(
            next_action(&DispatchState::of(&settled)),
            None,
            "settled record must be quiescent"
        );
    }

    #[tokio::test]
    async fn test_upsert_to_deleting_record_conflicts() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        store.upsert(deployment("acme", "webapp")).await.unwrap();
        store
            .mark_desired_delete(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();

        let err = store.upsert(deployment("acme", "webapp")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let record = store.upsert(deployment("acme", "webapp")).await.unwrap();
        store.remove(record.id).await.unwrap();
        store.remove(record.id).await.unwrap();

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_dispatch_rearms_creation() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let record = store.upsert(deployment("acme", "webapp")).await.unwrap();
        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();
        store
            .mark_dispatched(record.id, ActionKind::Create, Utc::now())
            .await
            .unwrap();

        store.clear_dispatch(record.id, ActionKind::Create).await.unwrap();
        let rearmed = store.get_by_id(record.id).await.unwrap();
        assert_eq!(
            next_action(&DispatchState::of(&rearmed)),
            Some(ActionKind::Create)
        );
    }

    #[tokio::test]
    async fn test_list_order_is_deterministic() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        store
            .upsert(ResourceRecord::new(ResourceKind::Deployment, "acme", "webapp"))
            .await
            .unwrap();
        store
            .upsert(ResourceRecord::new(ResourceKind::Cluster, "acme", "prod"))
            .await
            .unwrap();
        store
            .upsert(ResourceRecord::new(ResourceKind::Cluster, "acme", "staging"))
            .await
            .unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 3);
        // Clusters sort before deployments
        assert_eq!(listed[0].kind, ResourceKind::Cluster);
        assert_eq!(listed[1].kind, ResourceKind::Cluster);
        assert_eq!(listed[2].kind, ResourceKind::Deployment);

        let again = store.list().await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|r| r.id).collect();
        let ids_again: Vec<Uuid> = again.iter().map(|r| r.id).collect();
        assert_eq!(ids, ids_again);
    }

    #[tokio::test]
    async fn test_newer_state_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());
        store.upsert(deployment("acme", "webapp")).await.unwrap();

        let path = temp_dir.path().join(".helmflow/state.json");
        let content = std::fs::read_to_string(&path).unwrap();
        let bumped = content.replacen("\"version\": 1", "\"version\": 99", 1);
        std::fs::write(&path, bumped).unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StoreError::StateError(_)));
    }

    #[tokio::test]
    async fn test_template_registry() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        store.put_template("webapp", "/srv/templates/webapp").await.unwrap();
        let spec = store.get_template("webapp").await.unwrap();
        assert_eq!(spec.path, PathBuf::from("/srv/templates/webapp"));

        store.put_template("webapp", "/srv/templates/webapp-v2").await.unwrap();
        let replaced = store.get_template("webapp").await.unwrap();
        assert_eq!(replaced.path, PathBuf::from("/srv/templates/webapp-v2"));

        assert!(matches!(
            store.get_template("nope").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_unchanged_secret_is_not_drift() {
        let temp_dir = tempdir().unwrap();
        let store = ResourceStore::open(temp_dir.path(), SecretVault::with_key([3u8; 32]));

        let mut record = deployment("acme", "webapp");
        record.secret_data.insert("api_key".into(), "hunter2".into());
        let inserted = store.upsert(record).await.unwrap();
        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();
        store
            .mark_dispatched(inserted.id, ActionKind::Create, Utc::now())
            .await
            .unwrap();
        store.record_deployed(inserted.id, None).await.unwrap();

        let mut same = deployment("acme", "webapp");
        same.secret_data.insert("api_key".into(), "hunter2".into());
        let unchanged = store.upsert(same).await.unwrap();
        assert!(!unchanged.pending_update, "re-submitting the same secret is not drift");

        let mut rotated = deployment("acme", "webapp");
        rotated.secret_data.insert("api_key".into(), "hunter3".into());
        let drifted = store.upsert(rotated).await.unwrap();
        assert!(drifted.pending_update);
        assert!(drifted.approved_at.is_none());
    }

    #[tokio::test]
    async fn test_secrets_are_sealed_at_rest() {
        let temp_dir = tempdir().unwrap();
        let store = ResourceStore::open(temp_dir.path(), SecretVault::with_key([3u8; 32]));

        let mut record = deployment("acme", "webapp");
        record.secret_data.insert("api_key".into(), "hunter2".into());
        store.upsert(record).await.unwrap();

        let raw = std::fs::read_to_string(temp_dir.path().join(".helmflow/state.json")).unwrap();
        assert!(!raw.contains("hunter2"));
        assert!(raw.contains("sealed:"));

        let mut loaded = store
            .get(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();
        store.vault().unseal_record(&mut loaded).unwrap();
        assert_eq!(loaded.secret_data["api_key"], "hunter2");
    }

    #[tokio::test]
    async fn test_fake_sealed_secret_is_rejected_at_upsert() {
        let temp_dir = tempdir().unwrap();
        let store = ResourceStore::open(temp_dir.path(), SecretVault::with_key([3u8; 32]));

        let mut record = deployment("acme", "webapp");
        record
            .secret_data
            .insert("token".into(), "sealed:not-really".into());

        assert!(matches!(
            store.upsert(record).await,
            Err(StoreError::VaultError(_))
        ));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_conflict_while_held() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let lock = store.acquire_lock().await.unwrap();
        let err = store.acquire_lock().await.unwrap_err();
        assert!(matches!(err, StoreError::LockError(_)));

        lock.release().await.unwrap();
        let reacquired = store.acquire_lock().await.unwrap();
        reacquired.release().await.unwrap();
    }
}
