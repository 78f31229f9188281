//! Resource store for the HelmFlow control plane
//!
//! Persists all resource records and template registrations in a single
//! `.helmflow/state.json` file. Every mutation runs as an exclusive
//! lock-load-mutate-save cycle so that the daemon and the CLI can share
//! the same state directory safely.
//!
//! Secret values (template secret data, git tokens, kubeconfigs) are sealed
//! with AES-256-GCM before they touch disk whenever a state key is present.

pub mod error;
pub mod store;
pub mod vault;

pub use error::{Result, StoreError};
pub use store::{ResourceStore, StateLock, StoreState, TemplateSpec};
pub use vault::{SecretVault, STATE_KEY_ENV};
