//! Dispatch scheduler
//!
//! One sweep loads the store state fresh, computes the next action for every
//! record and hands eligible work to the executor pool. The order is always
//! mark-then-enqueue: the dispatch mark is persisted before the item enters
//! the channel. If the daemon dies in between, the resource stays parked with
//! its mark set until an operator re-arms it; the same action is never run
//! twice for one mark.

use crate::error::Result;
use chrono::Utc;
use helmflow_core::{next_action, ActionKind, DispatchState};
use helmflow_store::{ResourceStore, StoreError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One unit of work handed to an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchItem {
    pub id: Uuid,
    pub action: ActionKind,
}

/// Counters for one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    /// Records that selected no action
    pub unchanged: usize,
    /// Records whose dispatch mark was lost to a concurrent writer
    pub skipped: usize,
    /// Records marked but not enqueued; they need a manual re-arm
    pub parked: usize,
}

impl SweepReport {
    pub fn dispatched(&self) -> usize {
        self.create + self.update + self.delete
    }

    fn note(&mut self, action: ActionKind) {
        match action {
            ActionKind::Create => self.create += 1,
            ActionKind::Update => self.update += 1,
            ActionKind::Delete => self.delete += 1,
        }
    }
}

impl std::fmt::Display for SweepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.unchanged
        )?;
        if self.skipped > 0 || self.parked > 0 {
            write!(f, " ({} skipped, {} parked)", self.skipped, self.parked)?;
        }
        Ok(())
    }
}

/// Sweeps the store and feeds the dispatch channel
pub struct Scheduler {
    store: Arc<ResourceStore>,
    queue: mpsc::Sender<DispatchItem>,
}

impl Scheduler {
    pub fn new(store: Arc<ResourceStore>, queue: mpsc::Sender<DispatchItem>) -> Self {
        Self { store, queue }
    }

    /// Run one sweep over all records
    ///
    /// A single record's failure is counted and logged, never fatal for the
    /// rest of the sweep.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let records = self.store.list().await?;
        let mut report = SweepReport::default();

        for record in records {
            let Some(action) = next_action(&DispatchState::of(&record)) else {
                report.unchanged += 1;
                continue;
            };

            // Persist the mark first. A conflict means another writer got
            // there between our snapshot and now; the resource simply waits
            // for the next sweep.
            match self
                .store
                .mark_dispatched(record.id, action, Utc::now())
                .await
            {
                Ok(()) => {}
                Err(StoreError::Conflict(reason)) => {
                    debug!(resource = %record.qualified_name(), %reason, "Dispatch skipped");
                    report.skipped += 1;
                    continue;
                }
                Err(StoreError::NotFound(_)) => {
                    debug!(resource = %record.qualified_name(), "Record vanished before dispatch");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(resource = %record.qualified_name(), error = %e, "Dispatch mark failed");
                    report.skipped += 1;
                    continue;
                }
            }

            let item = DispatchItem {
                id: record.id,
                action,
            };
            match self.queue.try_send(item) {
                Ok(()) => {
                    info!(
                        resource = %record.qualified_name(),
                        action = %action,
                        "Dispatched"
                    );
                    report.note(action);
                }
                Err(e) => {
                    // Marked but not enqueued: the mark keeps the resource
                    // out of future sweeps until an operator re-arms it.
                    warn!(
                        resource = %record.qualified_name(),
                        action = %action,
                        error = %e,
                        "Enqueue failed, resource parked"
                    );
                    report.parked += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmflow_core::{ResourceKind, ResourceRecord};
    use helmflow_store::SecretVault;
    use tempfile::tempdir;

    async fn seeded_store(dir: &std::path::Path) -> Arc<ResourceStore> {
        Arc::new(ResourceStore::open(dir, SecretVault::disabled()))
    }

    fn deployment(name: &str) -> ResourceRecord {
        ResourceRecord::new(ResourceKind::Deployment, "acme", name).with_template("webapp")
    }

    #[tokio::test]
    async fn test_sweep_dispatches_approved_records() {
        let temp_dir = tempdir().unwrap();
        let store = seeded_store(temp_dir.path()).await;
        let record = store.upsert(deployment("webapp")).await.unwrap();
        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = Scheduler::new(store.clone(), tx);

        let report = scheduler.sweep().await.unwrap();
        assert_eq!(report.create, 1);
        assert_eq!(report.dispatched(), 1);

        let item = rx.recv().await.unwrap();
        assert_eq!(item.id, record.id);
        assert_eq!(item.action, ActionKind::Create);

        // The mark is already persisted when the item is visible
        let marked = store.get_by_id(record.id).await.unwrap();
        assert!(marked.creation_dispatched_at.is_some());
    }

    #[tokio::test]
    async fn test_sweep_ignores_unapproved_records() {
        let temp_dir = tempdir().unwrap();
        let store = seeded_store(temp_dir.path()).await;
        store.upsert(deployment("webapp")).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let report = Scheduler::new(store, tx).sweep().await.unwrap();

        assert_eq!(report.dispatched(), 0);
        assert_eq!(report.unchanged, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_sweep_does_not_redispatch() {
        let temp_dir = tempdir().unwrap();
        let store = seeded_store(temp_dir.path()).await;
        store.upsert(deployment("webapp")).await.unwrap();
        store
            .approve(ResourceKind::Deployment, "acme", "webapp")
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = Scheduler::new(store, tx);

        assert_eq!(scheduler.sweep().await.unwrap().create, 1);

        // No executor ran; the mark must keep the record out of this sweep
        let second = scheduler.sweep().await.unwrap();
        assert_eq!(second.dispatched(), 0);
        assert_eq!(second.unchanged, 1);

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sweeps_dispatch_each_record_once() {
        let temp_dir = tempdir().unwrap();
        let store = seeded_store(temp_dir.path()).await;
        for name in ["one", "two", "three"] {
            store.upsert(deployment(name)).await.unwrap();
            store
                .approve(ResourceKind::Deployment, "acme", name)
                .await
                .unwrap();
        }

        let (tx, mut rx) = mpsc::channel(8);
        let first = Scheduler::new(store.clone(), tx.clone());
        let second = Scheduler::new(store.clone(), tx);

        let racing = tokio::spawn(async move { first.sweep().await });
        let report_b = second.sweep().await.unwrap();
        let report_a = racing.await.unwrap().unwrap();

        // The loser of a mark race skips; each record is dispatched once
        assert_eq!(report_a.dispatched() + report_b.dispatched(), 3);

        let mut seen = std::collections::HashSet::new();
        while let Ok(item) = rx.try_recv() {
            assert!(seen.insert(item.id), "{} dispatched twice", item.id);
        }
        assert_eq!(seen.len(), 3);

        for record in store.list().await.unwrap() {
            assert!(record.creation_dispatched_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_full_channel_parks_marked_records() {
        let temp_dir = tempdir().unwrap();
        let store = seeded_store(temp_dir.path()).await;
        for name in ["one", "two"] {
            store.upsert(deployment(name)).await.unwrap();
            store
                .approve(ResourceKind::Deployment, "acme", name)
                .await
                .unwrap();
        }

        let (tx, mut rx) = mpsc::channel(1);
        let scheduler = Scheduler::new(store.clone(), tx);

        let report = scheduler.sweep().await.unwrap();
        assert_eq!(report.create, 1);
        assert_eq!(report.parked, 1);

        // The parked record keeps its mark and is not re-selected
        let drained = rx.recv().await.unwrap();
        let parked: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.id != drained.id)
            .collect();
        assert_eq!(parked.len(), 1);
        assert!(parked[0].creation_dispatched_at.is_some());

        let after = scheduler.sweep().await.unwrap();
        assert_eq!(after.dispatched(), 0);
    }

    #[test]
    fn test_report_display() {
        let mut report = SweepReport {
            create: 2,
            unchanged: 5,
            ..Default::default()
        };
        assert_eq!(report.to_string(), "2 to create, 0 to update, 0 to delete, 5 unchanged");

        report.parked = 1;
        assert!(report.to_string().ends_with("(0 skipped, 1 parked)"));
    }
}
