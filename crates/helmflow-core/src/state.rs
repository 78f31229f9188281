//! Dispatch state machine
//!
//! [`next_action`] is the single place that decides what, if anything, should
//! happen to a resource next. It is a pure function over a [`DispatchState`]
//! snapshot so every transition can be unit tested as a truth table, without
//! a store or a scheduler in the loop.

use crate::error::CoreError;
use crate::model::ResourceRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of reconciliation action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Provision the resource for the first time
    Create,
    /// Re-render and apply changed configuration
    Update,
    /// Tear the resource down and drop its record
    Delete,
}

impl ActionKind {
    /// One-character marker for plan output and log lines
    pub fn symbol(&self) -> &'static str {
        match self {
            ActionKind::Create => "+",
            ActionKind::Update => "~",
            ActionKind::Delete => "-",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Create => write!(f, "create"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ActionKind::Create),
            "update" => Ok(ActionKind::Update),
            "delete" => Ok(ActionKind::Delete),
            other => Err(CoreError::UnknownAction(other.to_string())),
        }
    }
}

/// Snapshot of the lifecycle fields that drive action selection
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchState {
    pub desired_delete: bool,
    pub pending_update: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub creation_dispatched_at: Option<DateTime<Utc>>,
    pub update_dispatched_at: Option<DateTime<Utc>>,
    pub deletion_dispatched_at: Option<DateTime<Utc>>,
}

impl DispatchState {
    /// Extract the snapshot from a full record
    pub fn of(record: &ResourceRecord) -> Self {
        Self {
            desired_delete: record.desired_delete,
            pending_update: record.pending_update,
            approved_at: record.approved_at,
            deployed_at: record.deployed_at,
            creation_dispatched_at: record.creation_dispatched_at,
            update_dispatched_at: record.update_dispatched_at,
            deletion_dispatched_at: record.deletion_dispatched_at,
        }
    }

    /// True when no provisioning attempt was ever dispatched
    ///
    /// Deleting such a record is pure bookkeeping: there is no external
    /// infrastructure to tear down, so the executor skips the provisioner.
    pub fn never_provisioned(&self) -> bool {
        self.deployed_at.is_none() && self.creation_dispatched_at.is_none()
    }
}

/// Decide the next action for a resource, if any
///
/// Rules, in priority order:
/// 1. Deletion wins over everything else, and does not require approval.
///    A set deletion mark blocks re-selection. Deployed resources get a
///    full teardown; never-provisioned ones are deleted as record-only
///    cleanup. A resource whose creation was dispatched but never
///    confirmed is left alone, since external state is unknown.
/// 2. Creation and update both require approval.
/// 3. Creation fires once per resource, gated by its own mark and by any
///    deletion mark left from a previous life of the name.
/// 4. Update fires only for deployed resources with drifted configuration,
///    gated by the update mark.
pub fn next_action(state: &DispatchState) -> Option<ActionKind> {
    if state.desired_delete {
        if state.deletion_dispatched_at.is_some() {
            return None;
        }
        if state.deployed_at.is_some() {
            return Some(ActionKind::Delete);
        }
        if state.creation_dispatched_at.is_none() {
            return Some(ActionKind::Delete);
        }
        return None;
    }

    if state.approved_at.is_none() {
        return None;
    }

    if state.deployed_at.is_none() {
        if state.creation_dispatched_at.is_none() && state.deletion_dispatched_at.is_none() {
            return Some(ActionKind::Create);
        }
        return None;
    }

    if state.pending_update
        && state.creation_dispatched_at.is_some()
        && state.update_dispatched_at.is_none()
    {
        return Some(ActionKind::Update);
    }

    None
}
