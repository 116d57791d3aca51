use serde::{Deserialize, Serialize};

use super::{metrics::Resource, Metadata, Object};

/// Per-namespace, per-kind bound on container request/limit, checked by the
/// Validation Engine's limit-range rule (spec.md §4.7). Read-only to the
/// agent.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LimitRange {
    pub metadata: Metadata,
    pub spec: LimitRangeSpec,
}

impl Object for LimitRange {
    fn kind(&self) -> &'static str {
        "LimitRange"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }

    fn resource_key(&self) -> String {
        format!("LimitRange/{}/{}", self.metadata.namespace, self.metadata.name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LimitRangeSpec {
    pub limits: Vec<LimitRangeItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LimitRangeItem {
    /// The pod/container kind this item constrains, e.g. "Container".
    #[serde(rename = "type")]
    pub type_: String,
    pub min_cpu_millicores: Option<u64>,
    pub max_cpu_millicores: Option<u64>,
    pub min_memory_mib: Option<u64>,
    pub max_memory_mib: Option<u64>,
}

impl LimitRangeItem {
    pub fn min(&self, resource: Resource) -> Option<u64> {
        match resource {
            Resource::CPU => self.min_cpu_millicores,
            Resource::Memory => self.min_memory_mib,
        }
    }

    pub fn max(&self, resource: Resource) -> Option<u64> {
        match resource {
            Resource::CPU => self.max_cpu_millicores,
            Resource::Memory => self.max_memory_mib,
        }
    }
}
