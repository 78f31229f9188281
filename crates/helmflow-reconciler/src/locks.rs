//! Per-resource execution locks
//!
//! A shared table of `tokio` mutexes keyed by resource id. Executors take
//! the lock for the resource they are about to act on, so two actions for
//! the same resource can never interleave while actions for distinct
//! resources proceed in parallel. Guards are owned, which lets them cross
//! `await` points inside an execution.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct LockTable {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for one resource, waiting if an execution is in flight
    pub async fn lock(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut table = self.inner.lock().await;
            table
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Drop the table entry for a removed resource
    ///
    /// A guard already handed out stays valid; only the table forgets the
    /// entry so deleted resources do not accumulate.
    pub async fn forget(&self, id: Uuid) {
        self.inner.lock().await.remove(&id);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
