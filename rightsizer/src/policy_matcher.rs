use resources::objects::{
    config_bundle::ConfigurationBundle, pod::Pod, policy::Policy, object_reference::ObjectReference,
};

use crate::{config_store::ConfigSnapshot, scheduler};

/// Global namespace admission, independent of any single policy (spec.md §3
/// "Configuration Bundle" `namespaceConfig`). `include` being non-empty
/// means allow-list semantics; otherwise everything not excluded is
/// eligible. `systemAlwaysExcluded` and the operator's own namespace always
/// win over `include`.
pub fn namespace_is_eligible(bundle: &ConfigurationBundle, namespace: &str) -> bool {
    let cfg = &bundle.namespace_config;
    if cfg.system_always_excluded.iter().any(|ns| ns == namespace) {
        return false;
    }
    if cfg.exclude.iter().any(|ns| ns == namespace) {
        return false;
    }
    if !cfg.include.is_empty() {
        return cfg.include.iter().any(|ns| ns == namespace);
    }
    true
}

/// Selects the highest-priority enabled, schedule-active, selector-matching
/// policy for a pod, falling back to a synthetic policy wrapping the global
/// defaults when nothing matches (spec.md §4.4). Pure given a fixed
/// snapshot and pod state, satisfying testable property 6 (deterministic
/// policy matching).
pub fn select_policy(pod: &Pod, snapshot: &ConfigSnapshot) -> Policy {
    let owner = owner_reference(pod);

    snapshot
        .policies
        .iter()
        .find(|policy| policy_matches(policy, pod, &owner))
        .cloned()
        .unwrap_or_else(|| {
            Policy::synthetic_default(
                "default",
                snapshot.bundle.default_mode,
                snapshot.bundle.default_resource_strategy,
                snapshot.bundle.global_constraints,
            )
        })
}

pub fn owner_reference(pod: &Pod) -> ObjectReference {
    pod.metadata
        .owner_references
        .first()
        .cloned()
        .unwrap_or_else(|| ObjectReference::new("Pod", ""))
}

fn policy_matches(policy: &Policy, pod: &Pod, owner: &ObjectReference) -> bool {
    if !policy.enabled {
        return false;
    }
    if !scheduler::is_schedule_active(&policy.schedule) {
        return false;
    }

    let target = &policy.target_ref;
    if !target.matches_owner(owner) {
        return false;
    }

    let namespace = &pod.metadata.namespace;
    if !target.namespaces.is_empty() && !target.namespaces.iter().any(|ns| ns == namespace) {
        return false;
    }
    if target.exclude_namespaces.iter().any(|ns| ns == namespace) {
        return false;
    }

    if !pod.metadata.labels.matches(&target.label_selector) {
        return false;
    }
    if !pod.metadata.annotations.matches(&target.annotation_selector) {
        return false;
    }

    let name = &pod.metadata.name;
    if !target.names.is_empty() && !target.names.iter().any(|n| n == name) {
        return false;
    }
    if target.exclude_names.iter().any(|n| n == name) {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use resources::objects::{
        policy::{GlobalConstraints, Mode, PolicyTargetRef, ResourceStrategy, Schedule},
        Labels, Metadata,
    };

    use super::*;

    fn bare_pod(namespace: &str, name: &str) -> Pod {
        Pod {
            metadata: Metadata {
                name: name.to_owned(),
                namespace: namespace.to_owned(),
                ..Default::default()
            },
            spec: resources::objects::pod::PodSpec {
                containers: vec![],
                node_name: String::new(),
            },
            status: None,
        }
    }

    fn snapshot_with(policies: Vec<Policy>) -> ConfigSnapshot {
        use resources::objects::config_bundle::ConfigurationBundle;
        ConfigSnapshot {
            bundle: std::sync::Arc::new(ConfigurationBundle {
                metadata: Metadata {
                    name: "default".to_owned(),
                    ..Default::default()
                },
                enabled: true,
                default_mode: Mode::Balanced,
                resize_interval_seconds: 60,
                dry_run: false,
                default_resource_strategy: ResourceStrategy::balanced_default(),
                global_constraints: GlobalConstraints::default(),
                namespace_config: Default::default(),
                feature_gates: Default::default(),
                operator_namespace: "rightsizer-system".to_owned(),
            }),
            policies: std::sync::Arc::new(policies),
        }
    }

    fn policy(name: &str, priority: u32) -> Policy {
        let mut p = Policy::synthetic_default(
            name,
            Mode::Balanced,
            ResourceStrategy::balanced_default(),
            GlobalConstraints::default(),
        );
        p.priority = priority;
        p
    }

    #[test]
    fn falls_back_to_synthetic_default_when_nothing_matches() {
        let snapshot = snapshot_with(vec![]);
        let pod = bare_pod("checkout", "web-1");
        let selected = select_policy(&pod, &snapshot);
        assert_eq!(selected.metadata.name, "default");
    }

    #[test]
    fn higher_priority_wins_on_selector_tie() {
        let low = policy("low", 5);
        let high = policy("high", 50);
        let snapshot = snapshot_with(vec![high.clone(), low]);
        let pod = bare_pod("checkout", "web-1");
        let selected = select_policy(&pod, &snapshot);
        assert_eq!(selected.metadata.name, "high");
    }

    #[test]
    fn disabled_policy_is_skipped() {
        let mut disabled = policy("disabled", 100);
        disabled.enabled = false;
        let fallback = policy("fallback", 1);
        let snapshot = snapshot_with(vec![disabled, fallback]);
        let pod = bare_pod("checkout", "web-1");
        let selected = select_policy(&pod, &snapshot);
        assert_eq!(selected.metadata.name, "fallback");
    }

    #[test]
    fn label_selector_excludes_non_matching_pods() {
        let mut p = policy("frontend-only", 10);
        p.target_ref = PolicyTargetRef {
            label_selector: {
                let mut l = Labels::new();
                l.insert("tier", "frontend");
                l
            },
            ..Default::default()
        };
        let snapshot = snapshot_with(vec![p]);
        let pod = bare_pod("checkout", "web-1");
        let selected = select_policy(&pod, &snapshot);
        assert_eq!(selected.metadata.name, "default");
    }

    #[test]
    fn schedule_gates_selection() {
        let mut p = policy("scheduled", 10);
        p.schedule = Schedule {
            time_windows: vec![resources::objects::policy::TimeWindow {
                days: vec![],
                start: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                end: chrono::NaiveTime::from_hms_opt(0, 0, 1).unwrap(),
                timezone: "UTC".to_owned(),
            }],
            ..Default::default()
        };
        let snapshot = snapshot_with(vec![p]);
        let pod = bare_pod("checkout", "web-1");
        // No day of week ever matches an empty `days` list, so this policy
        // is never active regardless of wall time.
        let selected = select_policy(&pod, &snapshot);
        assert_eq!(selected.metadata.name, "default");
    }
}
