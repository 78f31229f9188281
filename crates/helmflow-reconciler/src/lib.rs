//! Reconciliation engine for the HelmFlow control plane
//!
//! Ties the resource store, the manifest renderer and the provisioner client
//! together into the dispatch cycle:
//!
//! ```text
//! ┌───────────┐  sweep   ┌───────────┐  channel  ┌────────────┐
//! │ Scheduler │ ───────> │ mark-then │ ────────> │ Executors  │
//! │ (tick)    │          │ -enqueue  │           │ (N workers)│
//! └───────────┘          └───────────┘           └─────┬──────┘
//!       ▲                                              │
//!       │              ┌──────────────┐     render/apply/record
//!       └───────────── │ ResourceStore│ <──────────────┘
//!                      └──────────────┘
//! ```
//!
//! The scheduler persists a dispatch mark before anything is enqueued, so a
//! crash between marking and execution parks the resource instead of running
//! an action twice. Per-resource locks serialize executions for the same
//! resource; distinct resources run concurrently.

pub mod approval;
pub mod context;
pub mod error;
pub mod executor;
pub mod locks;
pub mod scheduler;
pub mod worker;

pub use approval::ApprovalGate;
pub use context::{ActionTimeouts, ReconcilerContext};
pub use error::{ReconcilerError, Result};
pub use executor::ActionExecutor;
pub use locks::LockTable;
pub use scheduler::{DispatchItem, Scheduler, SweepReport};
pub use worker::{start, WorkerConfig};
