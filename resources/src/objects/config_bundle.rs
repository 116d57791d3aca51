use serde::{Deserialize, Serialize};

use super::{
    policy::{GlobalConstraints, Mode, ResourceStrategy},
    Metadata, Object,
};

/// The global configuration resource (spec.md §3 "Configuration Bundle"),
/// hot-reloadable and namespace-scoped like `Policy`. Exactly one instance
/// is expected to be active; the Configuration Store treats the most
/// recently observed one as authoritative.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationBundle {
    pub metadata: Metadata,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub default_mode: Mode,
    pub resize_interval_seconds: u64,
    #[serde(default)]
    pub dry_run: bool,
    pub default_resource_strategy: ResourceStrategy,
    pub global_constraints: GlobalConstraints,
    #[serde(default)]
    pub namespace_config: NamespaceConfig,
    #[serde(default)]
    pub feature_gates: FeatureGates,
    /// Agent's own namespace. Read from an environment variable at startup
    /// (spec.md §6); falls back to a fixed default when unset. Always
    /// present in the effective exclude list (spec.md §3, §4.3 invariant).
    pub operator_namespace: String,
}

fn default_true() -> bool {
    true
}

impl Object for ConfigurationBundle {
    fn kind(&self) -> &'static str {
        "AgentConfigBundle"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }

    fn resource_key(&self) -> String {
        format!(
            "AgentConfigBundle/{}/{}",
            self.metadata.namespace, self.metadata.name
        )
    }
}

impl ConfigurationBundle {
    /// Enforces the invariant that the operator namespace is always present
    /// in the effective exclude list; called by the Configuration Store on
    /// every merge so it can never be bypassed by an update (spec.md §4.3,
    /// §9 design note).
    pub fn with_operator_namespace_excluded(mut self) -> Self {
        if !self
            .namespace_config
            .exclude
            .iter()
            .any(|ns| ns == &self.operator_namespace)
        {
            self.namespace_config
                .exclude
                .push(self.operator_namespace.clone());
        }
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.default_resource_strategy.validate()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Namespaces the agent refuses to touch regardless of configuration,
    /// e.g. `kube-system`.
    #[serde(default = "default_system_namespaces")]
    pub system_always_excluded: Vec<String>,
}

fn default_system_namespaces() -> Vec<String> {
    vec!["kube-system".to_owned(), "kube-public".to_owned()]
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGates {
    #[serde(default = "default_true")]
    pub in_place_resize: bool,
    /// Whether the applier may mutate container-level resize policies.
    /// Off by default; when off the applier only reads them (spec.md §6).
    #[serde(default)]
    pub update_resize_policy: bool,
    #[serde(default)]
    pub predictive_scaling: bool,
}

impl Default for FeatureGates {
    fn default() -> Self {
        FeatureGates {
            in_place_resize: true,
            update_resize_policy: false,
            predictive_scaling: false,
        }
    }
}
