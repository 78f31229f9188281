//! Helmflow Core
//!
//! Shared resource model for the Helmflow control plane: the records the
//! store persists, the credential/data sub-records they own, and the pure
//! dispatch state machine that decides which lifecycle action (if any) a
//! resource is eligible for.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  helmflowd (CLI)                  │
//! └───────────────────────┬──────────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────────┐
//! │              helmflow-reconciler                  │
//! │   sweep → next_action(record) → executors         │
//! └───────┬───────────────┬───────────────┬──────────┘
//!         │               │               │
//! ┌───────▼──────┐ ┌──────▼───────┐ ┌─────▼────────┐
//! │ helmflow-    │ │ helmflow-    │ │ helmflow-    │
//! │ store        │ │ render       │ │ provision    │
//! └──────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! Everything above depends on the model defined in this crate.

pub mod error;
pub mod model;
pub mod state;

// Re-exports
pub use error::{CoreError, Result};
pub use model::{
    validate_name, ApiCredentials, GitCredentials, ResourceKind, ResourceLimits, ResourceRecord,
};
pub use state::{ActionKind, DispatchState, next_action};
