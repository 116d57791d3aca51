use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::{metrics::Resource, Metadata, Object};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Pod {
    pub metadata: Metadata,
    pub spec: PodSpec,
    pub status: Option<PodStatus>,
}

impl Object for Pod {
    fn kind(&self) -> &'static str {
        "Pod"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }

    fn resource_key(&self) -> String {
        format!("Pod/{}/{}", self.metadata.namespace, self.metadata.name)
    }
}

impl Pod {
    /// Owner kind used by the policy matcher's `targetRef.kind` filter.
    /// A pod with no owner reference is targeted as a bare `Pod`.
    pub fn owner_kind(&self) -> &str {
        self.metadata
            .owner_references
            .first()
            .map(|r| r.kind.as_str())
            .unwrap_or("Pod")
    }

    /// Scheduler-derived QoS class (GLOSSARY), recomputed from the current
    /// container resources rather than trusted from status, since the
    /// reconciler must know whether a *proposed* set of values would
    /// change it (spec.md invariant 3 / validation rule "QoS").
    pub fn qos_class(&self) -> QosClass {
        qos_class_of(self.spec.containers.iter().map(|c| &c.resources))
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.spec.containers.iter().find(|c| c.name == name)
    }

    /// Sum of a resource's current requests across every container, used by
    /// the Validation Engine's node-capacity and quota checks.
    pub fn total_requests(&self, resource: Resource) -> u64 {
        self.spec
            .containers
            .iter()
            .map(|c| c.resources.requests.get(resource))
            .sum()
    }
}

/// Computes the QoS class for an arbitrary set of container resources,
/// shared between `Pod::qos_class` and the Resource Calculator's
/// what-if evaluation of a proposed resource set.
pub fn qos_class_of<'a>(containers: impl Iterator<Item = &'a ContainerResources>) -> QosClass {
    let mut any_set = false;
    let mut all_guaranteed = true;
    for resources in containers {
        for resource in [Resource::CPU, Resource::Memory] {
            let req = resources.requests.get(resource);
            let lim = resources.limits.get(resource);
            if req > 0 || lim > 0 {
                any_set = true;
            }
            if req != lim || req == 0 {
                all_guaranteed = false;
            }
        }
    }
    if !any_set {
        QosClass::BestEffort
    } else if all_guaranteed {
        QosClass::Guaranteed
    } else {
        QosClass::Burstable
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display)]
pub enum QosClass {
    Guaranteed,
    Burstable,
    BestEffort,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PodSpec {
    /// There must be at least one container in a Pod. Containers cannot
    /// currently be added or removed in place.
    pub containers: Vec<Container>,
    /// Name of the node the pod is bound to. Empty if unscheduled.
    #[serde(default)]
    pub node_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Container {
    /// Each container in a pod must have a unique name (DNS_LABEL).
    pub name: String,
    pub resources: ContainerResources,
    /// Per-resource declaration of whether a resize requires a restart
    /// (GLOSSARY "Resize policy"). Defaults to `NotRequired` for both
    /// resources, matching the in-place-resize feature's own default.
    #[serde(default)]
    pub resize_policy: ResizePolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerResources {
    pub requests: ResourceList,
    pub limits: ResourceList,
}

/// Canonical-unit resource quantities: CPU in millicores, memory in MiB.
/// Conversion to/from wire formats (e.g. "500m", "256Mi") happens only at
/// the cluster-API boundary, per spec.md §4.6 "Units are canonical
/// throughout".
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    pub cpu_millicores: u64,
    pub memory_mib: u64,
}

impl ResourceList {
    pub fn get(&self, resource: Resource) -> u64 {
        match resource {
            Resource::CPU => self.cpu_millicores,
            Resource::Memory => self.memory_mib,
        }
    }

    pub fn set(&mut self, resource: Resource, value: u64) {
        match resource {
            Resource::CPU => self.cpu_millicores = value,
            Resource::Memory => self.memory_mib = value,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ResizePolicy {
    pub cpu: ResizePolicyRule,
    pub memory: ResizePolicyRule,
}

impl Default for ResizePolicy {
    fn default() -> Self {
        ResizePolicy {
            cpu: ResizePolicyRule::NotRequired,
            memory: ResizePolicyRule::NotRequired,
        }
    }
}

impl ResizePolicy {
    pub fn for_resource(&self, resource: Resource) -> ResizePolicyRule {
        match resource {
            Resource::CPU => self.cpu,
            Resource::Memory => self.memory,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ResizePolicyRule {
    NotRequired,
    RestartContainer,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    /// IP address of the host the pod is bound to. Empty if unscheduled.
    pub host_ip: Option<String>,
    pub start_time: NaiveDateTime,
    pub phase: PodPhase,
    pub conditions: Vec<PodCondition>,
    /// Outcome of the most recent in-place resize attempt, as last reported
    /// by the applier (spec.md §4.9 state machine terminal states).
    pub resize: Option<ResizeStatus>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum PodConditionType {
    ContainersReady,
    Initialized,
    PodScheduled,
    Ready,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub type_: PodConditionType,
    pub status: bool,
}

impl PodStatus {
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .find(|c| c.type_ == PodConditionType::Ready)
            .map(|c| c.status)
            .unwrap_or(false)
    }
}

/// Resize-subresource outcome, surfaced on pod status by the cluster API
/// after the applier's patch call (spec.md §4.9).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display)]
pub enum ResizeStatus {
    Proposed,
    InProgress,
    Deferred,
    Infeasible,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources(req: u64, lim: u64) -> ContainerResources {
        ContainerResources {
            requests: ResourceList {
                cpu_millicores: req,
                memory_mib: req,
            },
            limits: ResourceList {
                cpu_millicores: lim,
                memory_mib: lim,
            },
        }
    }

    #[test]
    fn guaranteed_requires_request_equals_limit_on_every_resource() {
        let qos = qos_class_of([resources(100, 100), resources(256, 256)].iter());
        assert_eq!(qos, QosClass::Guaranteed);
    }

    #[test]
    fn burstable_when_any_container_has_request_below_limit() {
        let qos = qos_class_of([resources(100, 200)].iter());
        assert_eq!(qos, QosClass::Burstable);
    }

    #[test]
    fn best_effort_when_nothing_is_set() {
        let qos = qos_class_of([resources(0, 0)].iter());
        assert_eq!(qos, QosClass::BestEffort);
    }
}
