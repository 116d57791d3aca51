use serde::{Deserialize, Serialize};

use super::{Labels, Metadata, Object};

/// Disruption budget consulted by the Validation Engine's PDB rule
/// (spec.md §4.7) when `respectPDB` is set and an operation is classified
/// disruptive (e.g. a restart-required memory decrease).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PodDisruptionBudget {
    pub metadata: Metadata,
    pub spec: PodDisruptionBudgetSpec,
    #[serde(default)]
    pub status: PodDisruptionBudgetStatus,
}

impl Object for PodDisruptionBudget {
    fn kind(&self) -> &'static str {
        "PodDisruptionBudget"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }

    fn resource_key(&self) -> String {
        format!(
            "PodDisruptionBudget/{}/{}",
            self.metadata.namespace, self.metadata.name
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PodDisruptionBudgetSpec {
    pub selector: Labels,
    pub min_available: Option<u32>,
    pub max_unavailable: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct PodDisruptionBudgetStatus {
    pub current_healthy: u32,
    pub desired_healthy: u32,
    pub disruptions_allowed: u32,
}

impl PodDisruptionBudgetStatus {
    pub fn would_be_violated_by_one_disruption(&self) -> bool {
        self.disruptions_allowed == 0
    }
}
