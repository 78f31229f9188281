//! Credential sub-records attached to resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Git access for pulling template sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCredentials {
    /// Repository URL
    pub url: String,

    /// Username for HTTP auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Access token; sealed at rest by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl GitCredentials {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            token: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, token: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.token = Some(token.into());
        self
    }
}

/// Connection material for a provisioned cluster's API server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    /// API server endpoint URL
    pub endpoint: String,

    /// Kubeconfig contents; sealed at rest by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,

    /// Last time the provisioner handed back fresh material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl ApiCredentials {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            kubeconfig: None,
            refreshed_at: None,
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<String>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    /// Stamp the credentials as just refreshed
    pub fn refreshed_now(mut self) -> Self {
        self.refreshed_at = Some(Utc::now());
        self
    }
}
