use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    metrics::ContainerUsage,
    pod::{ContainerResources, QosClass},
};

/// Per-resource classification produced by the decision engine (spec.md §3
/// "Scaling Decision", §4.5). `None` covers both "ratio inside the
/// hysteresis band" and "metrics missing".
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    None,
    Down,
}

/// Per-container scaling decision, independent for CPU and memory.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScalingDecision {
    pub container: String,
    pub cpu_direction: Direction,
    pub memory_direction: Direction,
    pub usage: ContainerUsage,
    pub current: ContainerResources,
    /// Populated by the Resource Calculator once a direction implies a
    /// change; left equal to `current` for an axis with direction `None`.
    pub proposed: ContainerResources,
    pub reasons: Vec<String>,
}

impl ScalingDecision {
    /// A pod is skipped when both axes agree there's nothing to do, or when
    /// CPU is stable and memory would decrease (spec.md §4.5 composition
    /// rules — a memory-only decrease needs a restart-capable resize policy
    /// the pipeline hasn't confirmed yet at this stage).
    pub fn container_should_be_skipped(&self) -> bool {
        self.skip_reason().is_some()
    }

    /// Names *why* a container was skipped, distinguishing ordinary
    /// steady-state (`no_change`) from a memory decrease held back pending
    /// restart-policy confirmation (`no_change:mem_decrease_blocked`) —
    /// the two `container_should_be_skipped` cases above, kept separate so
    /// callers can report which one happened instead of a single label.
    pub fn skip_reason(&self) -> Option<&'static str> {
        let both_none = self.cpu_direction == Direction::None && self.memory_direction == Direction::None;
        let cpu_stable_mem_down =
            self.cpu_direction == Direction::None && self.memory_direction == Direction::Down;
        if cpu_stable_mem_down {
            Some("no_change:mem_decrease_blocked")
        } else if both_none {
            Some("no_change")
        } else {
            None
        }
    }
}

/// One container's worth of the composed proposal (spec.md §3 "Resize
/// Proposal"), after calculation and before validation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContainerProposal {
    pub container: String,
    pub current: ContainerResources,
    pub target: ContainerResources,
    pub cpu_direction: Direction,
    pub memory_direction: Direction,
    pub reasons: Vec<String>,
}

impl ContainerProposal {
    /// True when neither resource's value changed at all; used by the
    /// relative-change gate (spec.md §4.6, invariant 4) ahead of validation.
    pub fn is_no_op(&self) -> bool {
        self.current == self.target
    }
}

/// Pod-level outcome of policy/decision/calculation, ready for validation
/// (spec.md §3 "Resize Proposal").
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResizeProposal {
    pub namespace: String,
    pub pod: String,
    pub uid: Option<Uuid>,
    pub qos_class: QosClass,
    pub policy_name: String,
    pub containers: Vec<ContainerProposal>,
    pub disposition: PodDisposition,
}

impl ResizeProposal {
    pub fn is_applyable(&self) -> bool {
        matches!(self.disposition, PodDisposition::Apply) && !self.containers.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum PodDisposition {
    Apply,
    Skip(String),
    DryRun,
}
