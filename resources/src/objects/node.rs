use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{metrics::Resource, Metadata, Object};

/// Read-only view of node capacity the Validation Engine uses for its node
/// capacity rule (spec.md §4.7). The agent never creates or mutates nodes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Node {
    pub metadata: Metadata,
    pub status: NodeStatus,
}

impl Object for Node {
    fn kind(&self) -> &'static str {
        "Node"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Resources available for scheduling, in canonical units. Defaults to
    /// capacity when the node reserves nothing for system daemons.
    pub allocatable: Capacity,
    pub capacity: Capacity,
    pub last_heartbeat: NaiveDateTime,
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus {
            allocatable: Capacity::default(),
            capacity: Capacity::default(),
            last_heartbeat: NaiveDateTime::from_timestamp(0, 0),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub cpu_millicores: u64,
    pub memory_mib: u64,
}

impl Capacity {
    pub fn get(&self, resource: Resource) -> u64 {
        match resource {
            Resource::CPU => self.cpu_millicores,
            Resource::Memory => self.memory_mib,
        }
    }
}
