use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use helmflow_provision::{ProvisionError, Provisioner};
use helmflow_reconciler::{
    ActionExecutor, DispatchItem, ReconcilerContext, ReconcilerError, Scheduler, SweepReport,
};
use helmflow_store::{ResourceStore, SecretVault};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Apply,
    Delete,
}

/// Records every provisioner attempt; failures are switchable per direction.
pub struct MockProvisioner {
    pub calls: Mutex<Vec<(Call, PathBuf)>>,
    fail_apply: AtomicBool,
    fail_delete: AtomicBool,
    timeout_apply: AtomicBool,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_apply: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            timeout_apply: AtomicBool::new(false),
        }
    }

    #[allow(dead_code)]
    pub fn set_fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Make `apply` report an elapsed deadline, as the CLI wrapper would
    /// after killing a stuck child.
    #[allow(dead_code)]
    pub fn set_timeout_apply(&self, timeout: bool) {
        self.timeout_apply.store(timeout, Ordering::SeqCst);
    }

    pub fn applies(&self) -> usize {
        self.count(Call::Apply)
    }

    pub fn deletes(&self) -> usize {
        self.count(Call::Delete)
    }

    fn count(&self, call: Call) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == call)
            .count()
    }

    fn fail(program: &str) -> ProvisionError {
        ProvisionError::CommandFailed {
            program: program.to_string(),
            code: Some(1),
            stderr: "mock failure".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Provisioner for MockProvisioner {
    async fn apply(&self, dir: &Path, deadline: Duration) -> helmflow_provision::Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((Call::Apply, dir.to_path_buf()));
        if self.timeout_apply.load(Ordering::SeqCst) {
            return Err(ProvisionError::Timeout {
                program: "mock-apply".to_string(),
                after: deadline,
            });
        }
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(Self::fail("mock-apply"));
        }
        Ok("applied".to_string())
    }

    async fn delete(&self, dir: &Path, _deadline: Duration) -> helmflow_provision::Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((Call::Delete, dir.to_path_buf()));
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::fail("mock-delete"));
        }
        Ok("deleted".to_string())
    }
}

/// A control plane wired against the mock provisioner, driven one
/// dispatch cycle at a time so tests stay deterministic.
pub struct TestPlane {
    pub root: TempDir,
    pub store: Arc<ResourceStore>,
    pub provisioner: Arc<MockProvisioner>,
    executor: ActionExecutor,
    scheduler: Scheduler,
    rx: mpsc::Receiver<DispatchItem>,
}

impl TestPlane {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(ResourceStore::open(
            root.path(),
            SecretVault::with_key([7u8; 32]),
        ));
        let provisioner = Arc::new(MockProvisioner::new());

        let ctx = ReconcilerContext::new(
            Arc::clone(&store),
            Arc::clone(&provisioner) as Arc<dyn Provisioner>,
            root.path().join("manifests"),
        );
        let (tx, rx) = mpsc::channel(16);
        let scheduler = Scheduler::new(Arc::clone(&store), tx);
        let executor = ActionExecutor::new(ctx);

        Self {
            root,
            store,
            provisioner,
            executor,
            scheduler,
            rx,
        }
    }

    /// Register a template built from the given relative-path/content pairs.
    pub async fn write_template(&self, name: &str, files: &[(&str, &str)]) {
        let dir = self.root.path().join("templates").join(name);
        for (rel, content) in files {
            let path = dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        self.store.put_template(name, &dir).await.unwrap();
    }

    /// One scheduler sweep without executing anything yet.
    pub async fn sweep_only(&self) -> SweepReport {
        self.scheduler.sweep().await.unwrap()
    }

    /// Execute everything currently enqueued, panicking on failures.
    pub async fn drain(&mut self) {
        for err in self.drain_collect().await {
            panic!("action failed: {err}");
        }
    }

    /// Execute everything currently enqueued, collecting failures.
    pub async fn drain_collect(&mut self) -> Vec<ReconcilerError> {
        let mut errors = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            if let Err(e) = self.executor.execute(item).await {
                errors.push(e);
            }
        }
        errors
    }

    /// One full dispatch cycle: sweep, then execute everything enqueued.
    pub async fn cycle(&mut self) -> SweepReport {
        let report = self.sweep_only().await;
        self.drain().await;
        report
    }

    /// Like [`Self::cycle`] but failures are returned instead of panicking.
    #[allow(dead_code)]
    pub async fn cycle_collect(&mut self) -> (SweepReport, Vec<ReconcilerError>) {
        let report = self.sweep_only().await;
        let errors = self.drain_collect().await;
        (report, errors)
    }

    pub fn manifest_dir(&self, id: Uuid) -> PathBuf {
        self.root.path().join("manifests").join(id.to_string())
    }

    /// Raw persisted state, for asserting what actually hit the disk.
    #[allow(dead_code)]
    pub fn state_file(&self) -> String {
        fs::read_to_string(self.root.path().join(".helmflow").join("state.json")).unwrap()
    }
}
