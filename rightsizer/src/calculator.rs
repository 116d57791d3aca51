use resources::objects::{
    metrics::Resource,
    pod::{qos_class_of, ContainerResources, QosClass},
    policy::{GlobalConstraints, ResourceStrategyAxis},
    proposal::{ContainerProposal, Direction, ScalingDecision},
};

const RELATIVE_CHANGE_EPSILON: f64 = 1e-9;
/// Scale-down dampening ceiling (spec.md §4.6, law "monotone dampening"):
/// a Down step never requests more than 10% headroom above usage.
const SCALE_DOWN_HEADROOM_MULTIPLIER: f64 = 1.1;

/// Turns a per-axis decision into target request/limit, then applies
/// dampening, QoS preservation, and the relative/absolute change gates
/// (spec.md §4.6). Called once per container with both axes' usage already
/// known via `decision`.
pub fn calculate(
    decision: &ScalingDecision,
    current_qos: QosClass,
    cpu_strategy: &ResourceStrategyAxis,
    memory_strategy: &ResourceStrategyAxis,
    constraints: &GlobalConstraints,
) -> ContainerProposal {
    let mut target = decision.current;

    if decision.cpu_direction != Direction::None {
        target.requests.set(
            Resource::CPU,
            target_request(
                decision.usage.cpu_millicores,
                decision.cpu_direction,
                cpu_strategy,
            ),
        );
        target.limits.set(
            Resource::CPU,
            target_limit(decision.usage.cpu_millicores, target.requests.get(Resource::CPU), cpu_strategy),
        );
    }

    if decision.memory_direction != Direction::None {
        target.requests.set(
            Resource::Memory,
            target_request(
                decision.usage.memory_mib(),
                decision.memory_direction,
                memory_strategy,
            ),
        );
        target.limits.set(
            Resource::Memory,
            target_limit(decision.usage.memory_mib(), target.requests.get(Resource::Memory), memory_strategy),
        );
    }

    if current_qos == QosClass::Guaranteed && constraints.preserve_guaranteed_qos {
        target.limits.set(Resource::CPU, target.requests.get(Resource::CPU));
        target.limits.set(Resource::Memory, target.requests.get(Resource::Memory));
    }

    apply_absolute_cap(&mut target, decision.current, Resource::CPU, constraints.max_change_percentage);
    apply_absolute_cap(&mut target, decision.current, Resource::Memory, constraints.max_change_percentage);

    let mut proposal = ContainerProposal {
        container: decision.container.clone(),
        current: decision.current,
        target,
        cpu_direction: decision.cpu_direction,
        memory_direction: decision.memory_direction,
        reasons: decision.reasons.clone(),
    };

    if !exceeds_change_threshold(&proposal, constraints.min_change_threshold) {
        proposal.target = proposal.current;
        proposal.reasons.push("below_min_change_threshold".to_owned());
    }

    proposal
}

fn target_request(usage: u64, direction: Direction, strategy: &ResourceStrategyAxis) -> u64 {
    let mut raw = match strategy.target_utilization {
        // spec.md §4.6 "if S.targetUtilization is set, scale so that
        // U / lim' ≈ targetUtilization, then clamp as above" — overrides
        // the multiplier/addition formula for both request and limit.
        Some(target_utilization) if target_utilization > 0.0 => {
            usage as f64 / target_utilization + strategy.request_addition
        },
        _ => {
            let multiplier = if direction == Direction::Down {
                strategy.request_multiplier.min(SCALE_DOWN_HEADROOM_MULTIPLIER)
            } else {
                strategy.request_multiplier
            };
            usage as f64 * multiplier + strategy.request_addition
        },
    };
    if direction == Direction::Down {
        raw = raw.min(usage as f64 * SCALE_DOWN_HEADROOM_MULTIPLIER);
    }
    clamp_u64(raw.round(), strategy.min_request, strategy.max_limit)
}

fn target_limit(usage: u64, request: u64, strategy: &ResourceStrategyAxis) -> u64 {
    let raw = match strategy.target_utilization {
        Some(target_utilization) if target_utilization > 0.0 => usage as f64 / target_utilization,
        _ => request as f64 * strategy.limit_multiplier + strategy.limit_addition,
    };
    let clamped = clamp_u64(raw.round(), request, strategy.max_limit);
    if clamped == 0 {
        // spec.md §4.6 "lim' defaults to 2*req' if computed non-positive".
        (request * 2).min(strategy.max_limit).max(request)
    } else {
        clamped
    }
}

fn clamp_u64(value: f64, min: u64, max: u64) -> u64 {
    let value = if value.is_sign_negative() || value.is_nan() { 0.0 } else { value };
    (value as u64).clamp(min, max)
}

/// Caps the per-cycle delta on one resource to `maxChangePercentage` of its
/// current value (spec.md §4.6 "absolute cap"), applied to request and
/// limit independently after all other adjustments.
fn apply_absolute_cap(target: &mut ContainerResources, current: ContainerResources, resource: Resource, max_change_percentage: f64) {
    let cap_one = |current_value: u64, target_value: u64| -> u64 {
        if current_value == 0 {
            return target_value;
        }
        let max_delta = (current_value as f64 * max_change_percentage).round() as u64;
        let ceiling = current_value.saturating_add(max_delta);
        let floor = current_value.saturating_sub(max_delta);
        target_value.clamp(floor, ceiling.max(floor))
    };

    let capped_request = cap_one(current.requests.get(resource), target.requests.get(resource));
    let capped_limit = cap_one(current.limits.get(resource), target.limits.get(resource)).max(capped_request);
    target.requests.set(resource, capped_request);
    target.limits.set(resource, capped_limit);
}

/// Relative-change gate (spec.md §4.6, invariant 4): the proposal only
/// commits if at least one resource's *request* changed by
/// `>= minChangeThreshold` relative to its prior value. Limits are derived
/// from requests and are not independently gated.
fn exceeds_change_threshold(proposal: &ContainerProposal, min_change_threshold: f64) -> bool {
    [Resource::CPU, Resource::Memory].iter().any(|&resource| {
        let old = proposal.current.requests.get(resource);
        let new = proposal.target.requests.get(resource);
        if old == new {
            return false;
        }
        let denom = (old as f64).max(RELATIVE_CHANGE_EPSILON);
        ((new as f64 - old as f64).abs() / denom) >= min_change_threshold
    })
}

/// Re-derives QoS from a proposed resource set, used by the Validation
/// Engine's QoS rule to detect a transition the calculator's own QoS
/// preservation step should have prevented.
pub fn proposed_qos(target: &ContainerResources) -> QosClass {
    qos_class_of(std::iter::once(target))
}

#[cfg(test)]
mod tests {
    use resources::objects::{
        metrics::ContainerUsage,
        pod::ResourceList,
    };

    use super::*;

    fn axis() -> ResourceStrategyAxis {
        ResourceStrategyAxis {
            request_multiplier: 1.2,
            request_addition: 0.0,
            limit_multiplier: 2.0,
            limit_addition: 0.0,
            min_request: 10,
            max_limit: 10_000,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            target_utilization: None,
            history_window_seconds: None,
            percentile: None,
        }
    }

    fn relaxed_constraints() -> GlobalConstraints {
        GlobalConstraints {
            max_change_percentage: 5.0,
            min_change_threshold: 0.05,
            ..GlobalConstraints::default()
        }
    }

    #[test]
    fn scenario_s2_cpu_down_memory_unchanged() {
        let usage = ContainerUsage {
            container: "app".to_owned(),
            cpu_millicores: 20,
            memory_bytes: 400 * 1024 * 1024,
        };
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 400 },
            limits: ResourceList { cpu_millicores: 200, memory_mib: 512 },
        };
        let decision = ScalingDecision {
            container: "app".to_owned(),
            cpu_direction: Direction::Down,
            memory_direction: Direction::None,
            usage,
            current,
            proposed: current,
            reasons: vec![],
        };
        let proposal = calculate(&decision, QosClass::Burstable, &axis(), &axis(), &relaxed_constraints());
        assert_eq!(proposal.target.requests.get(Resource::CPU), 22);
        assert_eq!(proposal.target.limits.get(Resource::CPU), 44);
        assert_eq!(proposal.target.requests.get(Resource::Memory), 400);
        assert_eq!(proposal.target.limits.get(Resource::Memory), 512);
    }

    #[test]
    fn scenario_s3_guaranteed_qos_preserved() {
        let usage = ContainerUsage {
            container: "app".to_owned(),
            cpu_millicores: 850,
            memory_bytes: 1650 * 1024 * 1024,
        };
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 1000, memory_mib: 2048 },
            limits: ResourceList { cpu_millicores: 1000, memory_mib: 2048 },
        };
        let decision = ScalingDecision {
            container: "app".to_owned(),
            cpu_direction: Direction::Up,
            memory_direction: Direction::Up,
            usage,
            current,
            proposed: current,
            reasons: vec![],
        };
        let mut constraints = relaxed_constraints();
        constraints.preserve_guaranteed_qos = true;
        let proposal = calculate(&decision, QosClass::Guaranteed, &axis(), &axis(), &constraints);
        assert_eq!(
            proposal.target.requests.get(Resource::CPU),
            proposal.target.limits.get(Resource::CPU)
        );
        assert_eq!(
            proposal.target.requests.get(Resource::Memory),
            proposal.target.limits.get(Resource::Memory)
        );
        assert_eq!(proposed_qos(&proposal.target), QosClass::Guaranteed);
    }

    #[test]
    fn scale_down_never_exceeds_ten_percent_headroom_over_usage() {
        let strategy = ResourceStrategyAxis {
            request_multiplier: 1.5, // would normally request 150, dampening caps it
            ..axis()
        };
        let usage = ContainerUsage {
            container: "app".to_owned(),
            cpu_millicores: 100,
            memory_bytes: 0,
        };
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 300, memory_mib: 0 },
            limits: ResourceList { cpu_millicores: 400, memory_mib: 0 },
        };
        let decision = ScalingDecision {
            container: "app".to_owned(),
            cpu_direction: Direction::Down,
            memory_direction: Direction::None,
            usage,
            current,
            proposed: current,
            reasons: vec![],
        };
        let proposal = calculate(&decision, QosClass::Burstable, &strategy, &axis(), &relaxed_constraints());
        let usage_based_ceiling = (100.0 * SCALE_DOWN_HEADROOM_MULTIPLIER).round() as u64;
        assert!(proposal.target.requests.get(Resource::CPU) <= usage_based_ceiling);
    }

    #[test]
    fn below_threshold_change_is_reverted_to_current() {
        let usage = ContainerUsage {
            container: "app".to_owned(),
            cpu_millicores: 81,
            memory_bytes: 0,
        };
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 100, memory_mib: 0 },
            limits: ResourceList { cpu_millicores: 101, memory_mib: 0 },
        };
        let decision = ScalingDecision {
            container: "app".to_owned(),
            cpu_direction: Direction::Up,
            memory_direction: Direction::None,
            usage,
            current,
            proposed: current,
            reasons: vec![],
        };
        let mut constraints = relaxed_constraints();
        constraints.min_change_threshold = 0.5;
        let proposal = calculate(&decision, QosClass::Burstable, &axis(), &axis(), &constraints);
        assert!(proposal.is_no_op());
    }

    #[test]
    fn target_utilization_overrides_multiplier_formula() {
        let strategy = ResourceStrategyAxis { target_utilization: Some(0.5), ..axis() };
        let usage = ContainerUsage {
            container: "app".to_owned(),
            cpu_millicores: 100,
            memory_bytes: 0,
        };
        let current = ContainerResources {
            requests: ResourceList { cpu_millicores: 150, memory_mib: 0 },
            limits: ResourceList { cpu_millicores: 150, memory_mib: 0 },
        };
        let decision = ScalingDecision {
            container: "app".to_owned(),
            cpu_direction: Direction::Up,
            memory_direction: Direction::None,
            usage,
            current,
            proposed: current,
            reasons: vec![],
        };
        let proposal = calculate(&decision, QosClass::Burstable, &strategy, &axis(), &relaxed_constraints());
        // usage / targetUtilization = 100 / 0.5 = 200, for both request and limit.
        assert_eq!(proposal.target.requests.get(Resource::CPU), 200);
        assert_eq!(proposal.target.limits.get(Resource::CPU), 200);
    }
}
