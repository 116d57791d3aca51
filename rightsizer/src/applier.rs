use resources::objects::{
    metrics::Resource,
    pod::{ResizePolicy, ResizePolicyRule},
    proposal::ContainerProposal,
};

use crate::cluster_client::{PatchOutcome, ResizeClient};

/// Pod-level outcome of applying one container's proposal (spec.md §4.9
/// point 5). `PartiallyApplied` names which axis went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    PartiallyApplied { cpu: bool, memory: bool },
    NotSupported,
    Conflict,
    Rejected(String),
    Transient(String),
}

pub struct ApplyResult {
    pub outcome: ApplyOutcome,
    pub restarted: bool,
}

/// Applies one container's proposal via CPU-then-memory patch calls (spec.md
/// §4.9 point 1); both are attempted even if the first fails, except a
/// memory decrease the current resize policy / platform doesn't allow,
/// which is never attempted at all (invariant 5) and is reported as the
/// memory axis being `NotSupported` rather than as a failure.
#[allow(clippy::too_many_arguments)]
pub async fn apply_container(
    client: &dyn ResizeClient,
    namespace: &str,
    pod: &str,
    container_index: usize,
    resize_policy: &ResizePolicy,
    prevent_memory_decrease: Option<bool>,
    update_resize_policy: bool,
    proposal: &ContainerProposal,
) -> ApplyResult {
    let cpu_outcome = if resource_unchanged(proposal, Resource::CPU) {
        None
    } else {
        Some(
            client
                .patch_container_resource(
                    namespace,
                    pod,
                    container_index,
                    Resource::CPU,
                    proposal.target.requests.get(Resource::CPU),
                    proposal.target.limits.get(Resource::CPU),
                )
                .await,
        )
    };

    let memory_outcome = if resource_unchanged(proposal, Resource::Memory) {
        None
    } else if is_memory_decrease(proposal) && !memory_decrease_allowed(resize_policy, prevent_memory_decrease, client).await {
        Some(PatchOutcome::NotSupported)
    } else {
        Some(
            client
                .patch_container_resource(
                    namespace,
                    pod,
                    container_index,
                    Resource::Memory,
                    proposal.target.requests.get(Resource::Memory),
                    proposal.target.limits.get(Resource::Memory),
                )
                .await,
        )
    };

    // Gated by FeatureGates::update_resize_policy (spec.md §6): an
    // additional patch alongside the resource values, never a replacement
    // for them.
    let policy_outcome = if update_resize_policy {
        Some(
            client
                .patch_container_resize_policy(namespace, pod, container_index, resize_policy)
                .await,
        )
    } else {
        None
    };

    compose(cpu_outcome, memory_outcome, policy_outcome)
}

fn resource_unchanged(proposal: &ContainerProposal, resource: Resource) -> bool {
    proposal.current.requests.get(resource) == proposal.target.requests.get(resource)
        && proposal.current.limits.get(resource) == proposal.target.limits.get(resource)
}

fn is_memory_decrease(proposal: &ContainerProposal) -> bool {
    proposal.target.limits.get(Resource::Memory) < proposal.current.limits.get(Resource::Memory)
        || proposal.target.requests.get(Resource::Memory) < proposal.current.requests.get(Resource::Memory)
}

/// Invariant 5: a memory decrease is only attempted when the container's
/// resize policy requires a restart anyway, or the operator has explicitly
/// allowed decreases (`preventMemoryDecrease == false`) and the platform
/// itself accepts them.
async fn memory_decrease_allowed(
    resize_policy: &ResizePolicy,
    prevent_memory_decrease: Option<bool>,
    client: &dyn ResizeClient,
) -> bool {
    if resize_policy.memory == ResizePolicyRule::RestartContainer {
        return true;
    }
    let explicitly_allowed = prevent_memory_decrease == Some(false);
    explicitly_allowed && client.supports_memory_decrease().await
}

fn compose(cpu: Option<PatchOutcome>, memory: Option<PatchOutcome>, policy: Option<PatchOutcome>) -> ApplyResult {
    let restarted = matches!(&cpu, Some(PatchOutcome::Applied { restarted: true }))
        || matches!(&memory, Some(PatchOutcome::Applied { restarted: true }))
        || matches!(&policy, Some(PatchOutcome::Applied { restarted: true }));

    let outcome = match (&cpu, &memory, &policy) {
        (Some(PatchOutcome::Conflict), _, _) | (_, Some(PatchOutcome::Conflict), _) | (_, _, Some(PatchOutcome::Conflict)) => {
            ApplyOutcome::Conflict
        }
        (Some(PatchOutcome::Transient(reason)), _, _)
        | (_, Some(PatchOutcome::Transient(reason)), _)
        | (_, _, Some(PatchOutcome::Transient(reason))) => ApplyOutcome::Transient(reason.clone()),
        (Some(PatchOutcome::Rejected(reason)), _, _)
        | (_, Some(PatchOutcome::Rejected(reason)), _)
        | (_, _, Some(PatchOutcome::Rejected(reason))) => ApplyOutcome::Rejected(reason.clone()),
        _ => {
            // A `policy` outcome of `Applied`/`NotSupported` never changes
            // the resource-level composition below — it only escalates
            // through the Conflict/Transient/Rejected arms above.
            let cpu_applied = matches!(cpu, None | Some(PatchOutcome::Applied { .. }));
            let memory_applied = matches!(memory, None | Some(PatchOutcome::Applied { .. }));
            let cpu_attempted = cpu.is_some();
            let memory_attempted = memory.is_some();

            if !cpu_attempted && !memory_attempted {
                ApplyOutcome::Applied
            } else if cpu_applied && memory_applied {
                ApplyOutcome::Applied
            } else if !cpu_applied && !memory_applied {
                ApplyOutcome::NotSupported
            } else {
                ApplyOutcome::PartiallyApplied {
                    cpu: cpu_applied,
                    memory: memory_applied,
                }
            }
        }
    };

    ApplyResult { outcome, restarted }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use resources::objects::pod::{ContainerResources, ResourceList};

    use super::*;

    struct StubClient {
        cpu: PatchOutcome,
        memory: PatchOutcome,
        supports_memory_decrease: bool,
        resize_policy: Option<PatchOutcome>,
    }

    #[async_trait]
    impl ResizeClient for StubClient {
        async fn patch_container_resource(
            &self,
            _namespace: &str,
            _pod: &str,
            _container_index: usize,
            resource: Resource,
            _request: u64,
            _limit: u64,
        ) -> PatchOutcome {
            match resource {
                Resource::CPU => self.cpu.clone(),
                Resource::Memory => self.memory.clone(),
            }
        }

        async fn supports_memory_decrease(&self) -> bool {
            self.supports_memory_decrease
        }

        async fn patch_container_resize_policy(
            &self,
            _namespace: &str,
            _pod: &str,
            _container_index: usize,
            _resize_policy: &ResizePolicy,
        ) -> PatchOutcome {
            self.resize_policy.clone().unwrap_or(PatchOutcome::NotSupported)
        }
    }

    fn proposal(current: ContainerResources, target: ContainerResources) -> ContainerProposal {
        ContainerProposal {
            container: "app".to_owned(),
            current,
            target,
            cpu_direction: resources::objects::proposal::Direction::Up,
            memory_direction: resources::objects::proposal::Direction::None,
            reasons: vec![],
        }
    }

    #[tokio::test]
    async fn both_axes_applied_is_applied() {
        let client = StubClient {
            cpu: PatchOutcome::Applied { restarted: false },
            memory: PatchOutcome::Applied { restarted: false },
            supports_memory_decrease: false,
            resize_policy: None,
        };
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 100 },
            limits: ResourceList { cpu_millicores: 200, memory_mib: 200 },
        };
        let target = ContainerResources {
            requests: ResourceList { cpu_millicores: 150, memory_mib: 150 },
            limits: ResourceList { cpu_millicores: 250, memory_mib: 250 },
        };
        let result = apply_container(
            &client,
            "checkout",
            "web-1",
            0,
            &ResizePolicy::default(),
            None,
            false,
            &proposal(current, target),
        )
        .await;
        assert_eq!(result.outcome, ApplyOutcome::Applied);
    }

    #[tokio::test]
    async fn memory_decrease_without_restart_policy_is_skipped() {
        let client = StubClient {
            cpu: PatchOutcome::Applied { restarted: false },
            memory: PatchOutcome::Applied { restarted: false },
            supports_memory_decrease: false,
            resize_policy: None,
        };
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 512 },
            limits: ResourceList { cpu_millicores: 200, memory_mib: 1024 },
        };
        let target = ContainerResources {
            requests: ResourceList { cpu_millicores: 150, memory_mib: 256 },
            limits: ResourceList { cpu_millicores: 250, memory_mib: 512 },
        };
        let result = apply_container(
            &client,
            "checkout",
            "web-1",
            0,
            &ResizePolicy::default(),
            None,
            false,
            &proposal(current, target),
        )
        .await;
        assert_eq!(result.outcome, ApplyOutcome::PartiallyApplied { cpu: true, memory: false });
    }

    #[tokio::test]
    async fn conflict_on_either_axis_wins() {
        let client = StubClient {
            cpu: PatchOutcome::Conflict,
            memory: PatchOutcome::Applied { restarted: false },
            supports_memory_decrease: false,
            resize_policy: None,
        };
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 100 },
            limits: ResourceList { cpu_millicores: 200, memory_mib: 200 },
        };
        let target = ContainerResources {
            requests: ResourceList { cpu_millicores: 150, memory_mib: 150 },
            limits: ResourceList { cpu_millicores: 250, memory_mib: 250 },
        };
        let result = apply_container(
            &client,
            "checkout",
            "web-1",
            0,
            &ResizePolicy::default(),
            None,
            false,
            &proposal(current, target),
        )
        .await;
        assert_eq!(result.outcome, ApplyOutcome::Conflict);
    }

    #[tokio::test]
    async fn restart_required_memory_decrease_is_attempted() {
        let client = StubClient {
            cpu: PatchOutcome::Applied { restarted: false },
            memory: PatchOutcome::Applied { restarted: true },
            supports_memory_decrease: false,
            resize_policy: None,
        };
        let mut resize_policy = ResizePolicy::default();
        resize_policy.memory = ResizePolicyRule::RestartContainer;
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 512 },
            limits: ResourceList { cpu_millicores: 200, memory_mib: 1024 },
        };
        let target = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 256 },
            limits: ResourceList { cpu_millicores: 200, memory_mib: 512 },
        };
        let result = apply_container(
            &client,
            "checkout",
            "web-1",
            0,
            &resize_policy,
            None,
            false,
            &proposal(current, target),
        )
        .await;
        assert_eq!(result.outcome, ApplyOutcome::Applied);
        assert!(result.restarted);
    }

    #[tokio::test]
    async fn update_resize_policy_gate_off_never_calls_the_client() {
        let client = StubClient {
            cpu: PatchOutcome::Applied { restarted: false },
            memory: PatchOutcome::Applied { restarted: false },
            supports_memory_decrease: false,
            resize_policy: Some(PatchOutcome::Rejected("should not be called".to_owned())),
        };
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 100 },
            limits: ResourceList { cpu_millicores: 200, memory_mib: 200 },
        };
        let target = ContainerResources {
            requests: ResourceList { cpu_millicores: 150, memory_mib: 150 },
            limits: ResourceList { cpu_millicores: 250, memory_mib: 250 },
        };
        let result = apply_container(
            &client,
            "checkout",
            "web-1",
            0,
            &ResizePolicy::default(),
            None,
            false,
            &proposal(current, target),
        )
        .await;
        assert_eq!(result.outcome, ApplyOutcome::Applied);
    }

    #[tokio::test]
    async fn update_resize_policy_gate_on_surfaces_rejection() {
        let client = StubClient {
            cpu: PatchOutcome::Applied { restarted: false },
            memory: PatchOutcome::Applied { restarted: false },
            supports_memory_decrease: false,
            resize_policy: Some(PatchOutcome::Rejected("immutable".to_owned())),
        };
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 100 },
            limits: ResourceList { cpu_millicores: 200, memory_mib: 200 },
        };
        let target = ContainerResources {
            requests: ResourceList { cpu_millicores: 150, memory_mib: 150 },
            limits: ResourceList { cpu_millicores: 250, memory_mib: 250 },
        };
        let result = apply_container(
            &client,
            "checkout",
            "web-1",
            0,
            &ResizePolicy::default(),
            None,
            true,
            &proposal(current, target),
        )
        .await;
        assert_eq!(result.outcome, ApplyOutcome::Rejected("immutable".to_owned()));
    }
}
