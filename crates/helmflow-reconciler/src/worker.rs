//! Background worker loops
//!
//! One tick loop drives the scheduler sweep; a bounded pool of executor
//! tasks consumes the dispatch channel. The sweep only enqueues, so a slow
//! provisioner run never stalls selection. Cancelling the returned token
//! stops the tick loop first; dropping its sender then drains the pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::context::ReconcilerContext;
use crate::executor::ActionExecutor;
use crate::scheduler::{DispatchItem, Scheduler};

/// Configuration for the reconciliation loops.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the scheduler sweeps the store.
    pub tick_interval: Duration,
    /// Number of concurrent executor tasks.
    pub workers: usize,
    /// Dispatch channel capacity; a full channel parks marked resources.
    pub channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            workers: 4,
            channel_capacity: 64,
        }
    }
}

/// Start the reconciliation loops.
///
/// - **Tick loop**: sweeps the store every `tick_interval`, marking and
///   enqueueing eligible resources. Sweep errors are logged and the loop
///   continues.
/// - **Executor pool**: `workers` tasks consuming the dispatch channel;
///   distinct resources run concurrently, same-resource executions are
///   serialized by the lock table.
///
/// Returns a CancellationToken that stops the loops when cancelled.
pub fn start(ctx: ReconcilerContext, config: WorkerConfig) -> CancellationToken {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<DispatchItem>(config.channel_capacity);
    let rx = Arc::new(Mutex::new(rx));

    // --- Tick loop ---
    {
        let scheduler = Scheduler::new(Arc::clone(&ctx.store), tx);
        let cancel = cancel.clone();
        let interval = config.tick_interval;

        tokio::spawn(async move {
            info!("dispatch tick loop started (interval={interval:?})");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("dispatch tick loop stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        match scheduler.sweep().await {
                            Ok(report) if report.dispatched() == 0 => {
                                debug!("sweep: nothing to dispatch");
                            }
                            Ok(report) => info!("sweep: {report}"),
                            Err(e) => error!("sweep error: {e}"),
                        }
                    }
                }
            }
            // Dropping the scheduler closes the channel; executors drain
            // whatever was already enqueued and then exit.
        });
    }

    // --- Executor pool ---
    for worker in 0..config.workers.max(1) {
        let executor = ActionExecutor::new(ctx.clone());
        let rx = Arc::clone(&rx);
        let cancel = cancel.clone();

        tokio::spawn(async move {
            info!("executor worker {worker} started");
            loop {
                let item = {
                    let mut rx = rx.lock().await;
                    tokio::select! {
                        _ = cancel.cancelled() => None,
                        item = rx.recv() => item,
                    }
                };
                let Some(item) = item else { break };

                if let Err(e) = executor.execute(item).await {
                    error!(
                        id = %item.id,
                        action = %item.action,
                        "executor worker {worker}: action failed: {e}"
                    );
                }
            }
            info!("executor worker {worker} stopped");
        });
    }

    cancel
}
