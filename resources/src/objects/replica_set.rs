use serde::{Deserialize, Serialize};

use super::{Labels, Metadata, Object};

/// Minimal read-only view the agent needs of a pod's owning ReplicaSet: just
/// enough to classify the owner kind during policy matching (spec.md §4.4).
/// The agent never mutates ReplicaSets and has no use for pod templates or
/// scale status, unlike the teacher's HPA-facing `ReplicaSet`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReplicaSet {
    pub metadata: Metadata,
    pub spec: ReplicaSetSpec,
}

impl Object for ReplicaSet {
    fn kind(&self) -> &'static str {
        "ReplicaSet"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }

    fn resource_key(&self) -> String {
        format!("ReplicaSet/{}/{}", self.metadata.namespace, self.metadata.name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReplicaSetSpec {
    pub selector: Labels,
    pub replicas: u32,
}
