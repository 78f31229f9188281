//! Resource quota settings

use serde::{Deserialize, Serialize};

/// CPU and memory quotas for a workload, in Kubernetes quantity notation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU quota, e.g. `500m` or `2`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory quota, e.g. `512Mi` or `4Gi`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceLimits {
    pub fn new() -> Self {
        Self {
            cpu: None,
            memory: None,
        }
    }

    pub fn with_cpu(mut self, cpu: impl Into<String>) -> Self {
        self.cpu = Some(cpu.into());
        self
    }

    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = Some(memory.into());
        self
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::new()
    }
}
