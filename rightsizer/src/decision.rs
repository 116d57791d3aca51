use resources::objects::{
    metrics::{ContainerUsage, Resource},
    pod::ContainerResources,
    policy::ResourceStrategyAxis,
    proposal::{Direction, ScalingDecision},
};

/// Classifies one resource axis from a usage/limit ratio (spec.md §4.5).
/// `r == scaleUpThreshold` is treated as Up (closed interval at the upper
/// bound, spec.md §8 boundary cases); a zero or missing limit makes the
/// ratio undefined and is classified `None` with reason `metrics_missing`.
pub fn classify(usage: u64, limit: u64, axis: &ResourceStrategyAxis) -> (Direction, &'static str) {
    if limit == 0 {
        return (Direction::None, "metrics_missing");
    }
    let ratio = usage as f64 / limit as f64;
    if let Some(target) = axis.target_utilization {
        return if ratio > target {
            (Direction::Up, "above_target_utilization")
        } else if ratio < target {
            (Direction::Down, "below_target_utilization")
        } else {
            (Direction::None, "at_target_utilization")
        };
    }
    if ratio >= axis.scale_up_threshold {
        (Direction::Up, "above_scale_up_threshold")
    } else if ratio <= axis.scale_down_threshold {
        (Direction::Down, "below_scale_down_threshold")
    } else {
        (Direction::None, "within_hysteresis_band")
    }
}

/// Builds the per-container decision for both axes independently (spec.md
/// §4.5). `proposed` is left equal to `current` here; the Resource
/// Calculator fills it in for axes with a non-`None` direction.
pub fn decide(
    usage: &ContainerUsage,
    current: ContainerResources,
    cpu_strategy: &ResourceStrategyAxis,
    memory_strategy: &ResourceStrategyAxis,
) -> ScalingDecision {
    let (cpu_direction, cpu_reason) = classify(usage.cpu_millicores, current.limits.get(Resource::CPU), cpu_strategy);
    let (memory_direction, memory_reason) =
        classify(usage.memory_mib(), current.limits.get(Resource::Memory), memory_strategy);

    ScalingDecision {
        container: usage.container.clone(),
        cpu_direction,
        memory_direction,
        usage: usage.clone(),
        current,
        proposed: current,
        reasons: vec![
            format!("cpu:{}", cpu_reason),
            format!("memory:{}", memory_reason),
        ],
    }
}
