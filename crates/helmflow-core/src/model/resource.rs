//! Resource records: the unit of reconciliation
//!
//! A resource is either a Kubernetes cluster to provision or an application
//! deployment to place onto one. Both share the same lifecycle fields, so
//! they are stored as a single record type discriminated by [`ResourceKind`].

use super::credentials::{ApiCredentials, GitCredentials};
use super::limits::ResourceLimits;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Kind of managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A Kubernetes cluster provisioned through the external tool
    Cluster,
    /// An application workload deployed onto a cluster
    Deployment,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Cluster => write!(f, "cluster"),
            ResourceKind::Deployment => write!(f, "deployment"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cluster" => Ok(ResourceKind::Cluster),
            "deployment" => Ok(ResourceKind::Deployment),
            other => Err(CoreError::UnknownKind(other.to_string())),
        }
    }
}

/// Check a tenant or resource name for use in store keys and manifest paths
///
/// DNS-1123 label shape: non-empty, at most 63 characters, lowercase
/// alphanumeric and `-`, no leading or trailing `-`. Matches what Kubernetes
/// accepts for object names, so a valid record name is always a valid
/// manifest name too.
pub fn validate_name(name: &str) -> crate::error::Result<()> {
    let shape_ok = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');

    if shape_ok {
        Ok(())
    } else {
        Err(CoreError::InvalidName(name.to_string()))
    }
}

/// A single reconciled resource
///
/// The `*_dispatched_at` timestamps double as in-flight locks: the scheduler
/// sets them the instant it hands the resource to an executor, and the
/// eligibility predicates in [`crate::state`] refuse to re-select a resource
/// whose mark is already set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Stable identifier, assigned at first insert
    pub id: Uuid,

    /// Cluster or deployment
    pub kind: ResourceKind,

    /// Owning tenant
    pub tenant: String,

    /// Name, unique per (tenant, kind)
    pub name: String,

    /// Target cluster name (deployments only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,

    /// Bound template name; approval requires a binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Marked for teardown
    #[serde(default)]
    pub desired_delete: bool,

    /// Live configuration has drifted from desired state
    #[serde(default)]
    pub pending_update: bool,

    /// Set by the approval gate; creation/update stay ineligible while None
    pub approved_at: Option<DateTime<Utc>>,

    /// Set once creation succeeded; None means "not yet provisioned"
    pub deployed_at: Option<DateTime<Utc>>,

    /// In-flight mark for the creation action
    pub creation_dispatched_at: Option<DateTime<Utc>>,

    /// In-flight mark for the update action
    pub update_dispatched_at: Option<DateTime<Utc>>,

    /// In-flight mark for the deletion action
    pub deletion_dispatched_at: Option<DateTime<Utc>>,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,

    /// Git credentials for template sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitCredentials>,

    /// Cluster API connection material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiCredentials>,

    /// Plain template data, exposed to templates as `data.*`
    #[serde(default)]
    pub data: BTreeMap<String, String>,

    /// Secret template data, exposed as `secret.*`; sealed at rest
    #[serde(default)]
    pub secret_data: BTreeMap<String, String>,

    /// Resource quotas applied to the workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceLimits>,
}

impl ResourceRecord {
    pub fn new(
        kind: ResourceKind,
        tenant: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            tenant: tenant.into(),
            name: name.into(),
            cluster: None,
            template: None,
            desired_delete: false,
            pending_update: false,
            approved_at: None,
            deployed_at: None,
            creation_dispatched_at: None,
            update_dispatched_at: None,
            deletion_dispatched_at: None,
            created_at: now,
            updated_at: now,
            git: None,
            api: None,
            data: BTreeMap::new(),
            secret_data: BTreeMap::new(),
            limits: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn with_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.data = data;
        self
    }

    pub fn with_secret_data(mut self, secret_data: BTreeMap<String, String>) -> Self {
        self.secret_data = secret_data;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_git(mut self, git: GitCredentials) -> Self {
        self.git = Some(git);
        self
    }

    pub fn with_api(mut self, api: ApiCredentials) -> Self {
        self.api = Some(api);
        self
    }

    /// The `tenant/name` form used by the CLI and in log lines
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.tenant, self.name)
    }

    /// Whether creation has completed successfully at some point
    pub fn is_deployed(&self) -> bool {
        self.deployed_at.is_some()
    }

    /// The manifest-producing inputs, compared to detect drift
    ///
    /// Credentials are deliberately excluded: they are connection material,
    /// not template inputs, and refreshing them must not re-gate a resource.
    pub fn manifest_inputs(&self) -> ManifestInputs<'_> {
        ManifestInputs {
            template: self.template.as_deref(),
            data: &self.data,
            secret_data: &self.secret_data,
            limits: self.limits.as_ref(),
        }
    }
}

/// Borrowed view over the fields whose change constitutes drift
#[derive(Debug, PartialEq, Eq)]
pub struct ManifestInputs<'a> {
    pub template: Option<&'a str>,
    pub data: &'a BTreeMap<String, String>,
    pub secret_data: &'a BTreeMap<String, String>,
    pub limits: Option<&'a ResourceLimits>,
}
