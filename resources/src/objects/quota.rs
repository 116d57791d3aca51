use serde::{Deserialize, Serialize};

use super::{metrics::Resource, Metadata, Object};

/// Per-namespace aggregate cap, checked by the Validation Engine's quota
/// rule (spec.md §4.7 "ResourceQuota"). The agent only ever reads these.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResourceQuota {
    pub metadata: Metadata,
    pub spec: ResourceQuotaSpec,
    #[serde(default)]
    pub status: ResourceQuotaStatus,
}

impl Object for ResourceQuota {
    fn kind(&self) -> &'static str {
        "ResourceQuota"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }

    fn resource_key(&self) -> String {
        format!("ResourceQuota/{}/{}", self.metadata.namespace, self.metadata.name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResourceQuotaSpec {
    pub hard_cpu_millicores: Option<u64>,
    pub hard_memory_mib: Option<u64>,
}

/// Last observed aggregate usage for the namespace, refreshed by the
/// cluster; the validation cache re-simulates deltas against this rather
/// than recomputing the whole namespace from a pod list every tick.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceQuotaStatus {
    pub used_cpu_millicores: u64,
    pub used_memory_mib: u64,
}

impl ResourceQuotaStatus {
    pub fn used(&self, resource: Resource) -> u64 {
        match resource {
            Resource::CPU => self.used_cpu_millicores,
            Resource::Memory => self.used_memory_mib,
        }
    }
}

impl ResourceQuotaSpec {
    pub fn hard(&self, resource: Resource) -> Option<u64> {
        match resource {
            Resource::CPU => self.hard_cpu_millicores,
            Resource::Memory => self.hard_memory_mib,
        }
    }
}
