use resources::objects::{
    autoscaler::{HorizontalAutoscaler, VerticalAutoscaler},
    limit_range::LimitRange,
    metrics::Resource,
    node::Node,
    object_reference::ObjectReference,
    pdb::PodDisruptionBudget,
    pod::{Pod, QosClass, ResizePolicyRule},
    policy::GlobalConstraints,
    quota::ResourceQuota,
    proposal::{ContainerProposal, PodDisposition, ResizeProposal},
};

use crate::calculator;

#[derive(Debug, Clone, PartialEq)]
pub enum RuleVerdict {
    Pass,
    Warn(String),
    Fail(String),
}

impl RuleVerdict {
    pub fn is_fail(&self) -> bool {
        matches!(self, RuleVerdict::Fail(_))
    }
}

/// Read-only cluster state the Validation Engine checks a proposal against
/// (spec.md §4.7). All fields are pre-filtered to the pod's namespace/node by
/// the caller; the engine itself does no lookup.
pub struct ValidationContext<'a> {
    pub node: Option<&'a Node>,
    /// Sum of requests already committed by every other pod scheduled on
    /// this node, used to simulate headroom without re-summing the whole
    /// cluster every tick.
    pub node_used_excluding_pod: (u64, u64),
    pub quotas: &'a [ResourceQuota],
    pub limit_ranges: &'a [LimitRange],
    pub pdbs: &'a [PodDisruptionBudget],
    pub hpas: &'a [HorizontalAutoscaler],
    pub vpas: &'a [VerticalAutoscaler],
    pub resize_subresource_served: bool,
}

/// Named rule outcomes, in the order spec.md §4.7 lists them. Any `Fail`
/// rejects the proposal; `Warn` is surfaced in the audit trail without
/// blocking.
pub struct ValidationReport {
    pub rules: Vec<(&'static str, RuleVerdict)>,
}

impl ValidationReport {
    pub fn failed(&self) -> bool {
        self.rules.iter().any(|(_, v)| v.is_fail())
    }

    pub fn first_failure_reason(&self) -> Option<String> {
        self.rules.iter().find_map(|(name, v)| match v {
            RuleVerdict::Fail(reason) => Some(format!("{}: {}", name, reason)),
            _ => None,
        })
    }

    pub fn warnings(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|(name, v)| match v {
                RuleVerdict::Warn(reason) => Some(format!("{}: {}", name, reason)),
                _ => None,
            })
            .collect()
    }
}

/// Runs every rule over the fully composed proposal and sets its disposition
/// (spec.md §4.7). Mutates `proposal` in place: the autoscaler-conflict rule
/// may strip container changes before the remaining rules see them.
pub fn validate(
    pod: &Pod,
    owner: &ObjectReference,
    proposal: &mut ResizeProposal,
    constraints: &GlobalConstraints,
    ctx: &ValidationContext,
) -> ValidationReport {
    let mut rules = Vec::new();

    rules.push(("autoscaler_conflict", autoscaler_conflict(owner, proposal, constraints, ctx)));
    rules.push(("node_capacity", node_capacity(proposal, ctx)));
    rules.push(("resource_quota", resource_quota(pod, proposal, ctx)));
    rules.push(("limit_range", limit_range(pod, proposal, ctx)));
    rules.push(("qos", qos(pod, proposal, constraints)));
    rules.push(("disruption_budget", disruption_budget(pod, proposal, constraints, ctx)));
    rules.push(("resize_capability", resize_capability(ctx)));

    let report = ValidationReport { rules };

    if report.failed() {
        proposal.disposition = PodDisposition::Skip(
            report
                .first_failure_reason()
                .unwrap_or_else(|| "validation_failed".to_owned()),
        );
    }

    report
}

/// Strips both axes of every container proposal targeting an owner a
/// horizontal autoscaler also targets (warn); fails outright if a vertical
/// autoscaler targets the owner (spec.md §4.7 "Autoscaler conflict").
fn autoscaler_conflict(
    owner: &ObjectReference,
    proposal: &mut ResizeProposal,
    constraints: &GlobalConstraints,
    ctx: &ValidationContext,
) -> RuleVerdict {
    if constraints.respect_vpa {
        if let Some(vpa) = ctx
            .vpas
            .iter()
            .find(|vpa| vpa.spec.scale_target_ref == *owner)
        {
            return RuleVerdict::Fail(format!("vertical autoscaler {} targets this workload", vpa.metadata.name));
        }
    }
    if constraints.respect_hpa {
        if let Some(hpa) = ctx
            .hpas
            .iter()
            .find(|hpa| hpa.spec.scale_target_ref == *owner)
        {
            for container in proposal.containers.iter_mut() {
                container.target = container.current;
            }
            return RuleVerdict::Warn(format!(
                "horizontal autoscaler {} targets this workload; proposal stripped",
                hpa.metadata.name
            ));
        }
    }
    RuleVerdict::Pass
}

fn node_capacity(proposal: &ResizeProposal, ctx: &ValidationContext) -> RuleVerdict {
    let Some(node) = ctx.node else {
        return RuleVerdict::Pass;
    };
    let (used_cpu, used_mem) = ctx.node_used_excluding_pod;
    let (pod_cpu, pod_mem) = pod_total_requests(proposal);

    let allocatable_cpu = node.status.allocatable.get(Resource::CPU);
    let allocatable_mem = node.status.allocatable.get(Resource::Memory);

    if used_cpu.saturating_add(pod_cpu) > allocatable_cpu {
        return RuleVerdict::Fail(format!(
            "cpu request {} exceeds node {} allocatable {}",
            used_cpu.saturating_add(pod_cpu),
            node.metadata.name,
            allocatable_cpu
        ));
    }
    if used_mem.saturating_add(pod_mem) > allocatable_mem {
        return RuleVerdict::Fail(format!(
            "memory request {} exceeds node {} allocatable {}",
            used_mem.saturating_add(pod_mem),
            node.metadata.name,
            allocatable_mem
        ));
    }
    RuleVerdict::Pass
}

fn resource_quota(pod: &Pod, proposal: &ResizeProposal, ctx: &ValidationContext) -> RuleVerdict {
    let (new_cpu, new_mem) = pod_total_requests(proposal);
    let (old_cpu, old_mem) = (
        pod.total_requests(Resource::CPU),
        pod.total_requests(Resource::Memory),
    );
    let (delta_cpu, delta_mem) = (
        new_cpu as i64 - old_cpu as i64,
        new_mem as i64 - old_mem as i64,
    );

    for quota in ctx.quotas {
        if let Some(hard) = quota.spec.hard(Resource::CPU) {
            let projected = quota.status.used(Resource::CPU) as i64 + delta_cpu;
            if projected > hard as i64 {
                return RuleVerdict::Fail(format!(
                    "cpu quota {} would overshoot: {} > {}",
                    quota.metadata.name, projected, hard
                ));
            }
        }
        if let Some(hard) = quota.spec.hard(Resource::Memory) {
            let projected = quota.status.used(Resource::Memory) as i64 + delta_mem;
            if projected > hard as i64 {
                return RuleVerdict::Fail(format!(
                    "memory quota {} would overshoot: {} > {}",
                    quota.metadata.name, projected, hard
                ));
            }
        }
    }
    RuleVerdict::Pass
}

fn limit_range(pod: &Pod, proposal: &ResizeProposal, ctx: &ValidationContext) -> RuleVerdict {
    for container in &proposal.containers {
        for range in ctx.limit_ranges {
            for item in &range.spec.limits {
                if item.type_ != "Container" {
                    continue;
                }
                if let Some(reason) = container_violates_item(container, item) {
                    return RuleVerdict::Fail(format!(
                        "{}/{}: {}",
                        pod.metadata.name, container.container, reason
                    ));
                }
            }
        }
    }
    RuleVerdict::Pass
}

fn container_violates_item(
    container: &ContainerProposal,
    item: &resources::objects::limit_range::LimitRangeItem,
) -> Option<String> {
    for resource in [Resource::CPU, Resource::Memory] {
        let request = container.target.requests.get(resource);
        let limit = container.target.limits.get(resource);
        if let Some(min) = item.min(resource) {
            if request < min {
                return Some(format!("{} request {} below limit range min {}", resource, request, min));
            }
        }
        if let Some(max) = item.max(resource) {
            if limit > max {
                return Some(format!("{} limit {} above limit range max {}", resource, limit, max));
            }
        }
    }
    None
}

fn qos(pod: &Pod, proposal: &ResizeProposal, constraints: &GlobalConstraints) -> RuleVerdict {
    if !constraints.preserve_guaranteed_qos || pod.qos_class() != QosClass::Guaranteed {
        return RuleVerdict::Pass;
    }
    for container in &proposal.containers {
        if calculator::proposed_qos(&container.target) != QosClass::Guaranteed {
            return RuleVerdict::Fail(format!(
                "container {} would leave Guaranteed QoS",
                container.container
            ));
        }
    }
    RuleVerdict::Pass
}

fn disruption_budget(
    pod: &Pod,
    proposal: &ResizeProposal,
    constraints: &GlobalConstraints,
    ctx: &ValidationContext,
) -> RuleVerdict {
    if !constraints.respect_pdb {
        return RuleVerdict::Pass;
    }
    if !is_disruptive(pod, proposal) {
        return RuleVerdict::Pass;
    }
    for pdb in ctx.pdbs {
        if pod.metadata.labels.matches(&pdb.spec.selector) && pdb.status.would_be_violated_by_one_disruption() {
            return RuleVerdict::Fail(format!(
                "disruption budget {} has zero disruptions allowed",
                pdb.metadata.name
            ));
        }
    }
    RuleVerdict::Pass
}

/// A change is disruptive when it touches a resource whose `resizePolicy`
/// declares `RestartContainer` (spec.md §4.9 point 2).
fn is_disruptive(pod: &Pod, proposal: &ResizeProposal) -> bool {
    proposal.containers.iter().any(|container| {
        let Some(spec_container) = pod.container(&container.container) else {
            return false;
        };
        [Resource::CPU, Resource::Memory].into_iter().any(|resource| {
            let changed = container.current.requests.get(resource) != container.target.requests.get(resource)
                || container.current.limits.get(resource) != container.target.limits.get(resource);
            changed && spec_container.resize_policy.for_resource(resource) == ResizePolicyRule::RestartContainer
        })
    })
}

fn resize_capability(ctx: &ValidationContext) -> RuleVerdict {
    if ctx.resize_subresource_served {
        RuleVerdict::Pass
    } else {
        RuleVerdict::Fail("not_supported".to_owned())
    }
}

fn pod_total_requests(proposal: &ResizeProposal) -> (u64, u64) {
    let cpu = proposal.containers.iter().map(|c| c.target.requests.get(Resource::CPU)).sum();
    let mem = proposal.containers.iter().map(|c| c.target.requests.get(Resource::Memory)).sum();
    (cpu, mem)
}

#[cfg(test)]
mod tests {
    use resources::objects::{
        limit_range::{LimitRangeItem, LimitRangeSpec},
        node::{Capacity, NodeStatus},
        pod::{ContainerResources, ResourceList},
        quota::{ResourceQuotaSpec, ResourceQuotaStatus},
        Metadata,
    };

    use super::*;

    fn bare_pod() -> Pod {
        Pod {
            metadata: Metadata {
                name: "web-1".to_owned(),
                namespace: "checkout".to_owned(),
                ..Default::default()
            },
            spec: resources::objects::pod::PodSpec {
                containers: vec![resources::objects::pod::Container {
                    name: "app".to_owned(),
                    resources: ContainerResources::default(),
                    resize_policy: Default::default(),
                }],
                node_name: "node-1".to_owned(),
            },
            status: None,
        }
    }

    fn container_proposal(current: ContainerResources, target: ContainerResources) -> ContainerProposal {
        ContainerProposal {
            container: "app".to_owned(),
            current,
            target,
            cpu_direction: resources::objects::proposal::Direction::Up,
            memory_direction: resources::objects::proposal::Direction::None,
            reasons: vec![],
        }
    }

    fn empty_ctx() -> ValidationContext<'static> {
        ValidationContext {
            node: None,
            node_used_excluding_pod: (0, 0),
            quotas: &[],
            limit_ranges: &[],
            pdbs: &[],
            hpas: &[],
            vpas: &[],
            resize_subresource_served: true,
        }
    }

    fn bare_proposal(containers: Vec<ContainerProposal>) -> ResizeProposal {
        ResizeProposal {
            namespace: "checkout".to_owned(),
            pod: "web-1".to_owned(),
            uid: None,
            qos_class: QosClass::Burstable,
            policy_name: "default".to_owned(),
            containers,
            disposition: PodDisposition::Apply,
        }
    }

    #[test]
    fn resize_not_served_fails() {
        let pod = bare_pod();
        let mut proposal = bare_proposal(vec![]);
        let mut ctx = empty_ctx();
        ctx.resize_subresource_served = false;
        let report = validate(&pod, &ObjectReference::new("Pod", ""), &mut proposal, &GlobalConstraints::default(), &ctx);
        assert!(report.failed());
        assert!(matches!(proposal.disposition, PodDisposition::Skip(_)));
    }

    #[test]
    fn node_capacity_rejects_overcommit() {
        let pod = bare_pod();
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 0 },
            limits: ResourceList { cpu_millicores: 200, memory_mib: 0 },
        };
        let target = ContainerResources {
            requests: ResourceList { cpu_millicores: 900, memory_mib: 0 },
            limits: ResourceList { cpu_millicores: 1000, memory_mib: 0 },
        };
        let mut proposal = bare_proposal(vec![container_proposal(current, target)]);
        let node = Node {
            metadata: Metadata { name: "node-1".to_owned(), ..Default::default() },
            status: NodeStatus {
                allocatable: Capacity { cpu_millicores: 1000, memory_mib: 8192 },
                capacity: Capacity { cpu_millicores: 1000, memory_mib: 8192 },
                last_heartbeat: chrono::NaiveDateTime::from_timestamp(0, 0),
            },
        };
        let mut ctx = empty_ctx();
        ctx.node = Some(&node);
        ctx.node_used_excluding_pod = (200, 0);
        let report = validate(&pod, &ObjectReference::new("Pod", ""), &mut proposal, &GlobalConstraints::default(), &ctx);
        assert!(report.failed());
    }

    #[test]
    fn quota_overshoot_fails() {
        let pod = bare_pod();
        let current = ContainerResources::default();
        let target = ContainerResources {
            requests: ResourceList { cpu_millicores: 500, memory_mib: 0 },
            limits: ResourceList { cpu_millicores: 500, memory_mib: 0 },
        };
        let mut proposal = bare_proposal(vec![container_proposal(current, target)]);
        let quota = ResourceQuota {
            metadata: Metadata { name: "checkout-quota".to_owned(), ..Default::default() },
            spec: ResourceQuotaSpec { hard_cpu_millicores: Some(400), hard_memory_mib: None },
            status: ResourceQuotaStatus { used_cpu_millicores: 0, used_memory_mib: 0 },
        };
        let mut ctx = empty_ctx();
        let quotas = vec![quota];
        ctx.quotas = &quotas;
        let report = validate(&pod, &ObjectReference::new("Pod", ""), &mut proposal, &GlobalConstraints::default(), &ctx);
        assert!(report.failed());
    }

    #[test]
    fn limit_range_rejects_below_min() {
        let pod = bare_pod();
        let current = ContainerResources::default();
        let target = ContainerResources {
            requests: ResourceList { cpu_millicores: 5, memory_mib: 0 },
            limits: ResourceList { cpu_millicores: 5, memory_mib: 0 },
        };
        let mut proposal = bare_proposal(vec![container_proposal(current, target)]);
        let range = LimitRange {
            metadata: Metadata { name: "defaults".to_owned(), ..Default::default() },
            spec: LimitRangeSpec {
                limits: vec![LimitRangeItem {
                    type_: "Container".to_owned(),
                    min_cpu_millicores: Some(10),
                    max_cpu_millicores: None,
                    min_memory_mib: None,
                    max_memory_mib: None,
                }],
            },
        };
        let mut ctx = empty_ctx();
        let ranges = vec![range];
        ctx.limit_ranges = &ranges;
        let report = validate(&pod, &ObjectReference::new("Pod", ""), &mut proposal, &GlobalConstraints::default(), &ctx);
        assert!(report.failed());
    }

    #[test]
    fn passing_proposal_stays_apply() {
        let pod = bare_pod();
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 256 },
            limits: ResourceList { cpu_millicores: 200, memory_mib: 512 },
        };
        let target = ContainerResources {
            requests: ResourceList { cpu_millicores: 150, memory_mib: 256 },
            limits: ResourceList { cpu_millicores: 300, memory_mib: 512 },
        };
        let mut proposal = bare_proposal(vec![container_proposal(current, target)]);
        let ctx = empty_ctx();
        let report = validate(&pod, &ObjectReference::new("Pod", ""), &mut proposal, &GlobalConstraints::default(), &ctx);
        assert!(!report.failed());
        assert_eq!(proposal.disposition, PodDisposition::Apply);
    }
}
