use arc_swap::ArcSwap;
use resources::objects::{
    config_bundle::ConfigurationBundle,
    policy::Policy,
};
use std::sync::Arc;

/// A config bundle plus its priority-sorted policy set, swapped as one unit
/// so readers never observe a bundle paired with a stale/future policy list
/// (spec.md §4.3 "readers see either the old or the new bundle fully").
#[derive(Clone)]
pub struct ConfigSnapshot {
    pub bundle: Arc<ConfigurationBundle>,
    /// Sorted by priority descending, then name ascending (spec.md §4.4
    /// step 3), computed once at swap time so the matcher never re-sorts.
    pub policies: Arc<Vec<Policy>>,
}

/// Singleton holding the latest configuration bundle and policy set
/// (spec.md §4.3). The write path (driven by the bundle/policy informers)
/// is serialized by virtue of being the only writer; the read path never
/// blocks on a writer, satisfying spec.md §5 "read path is lock-free".
pub struct ConfigStore {
    current: ArcSwap<ConfigSnapshot>,
}

impl ConfigStore {
    pub fn new(initial_bundle: ConfigurationBundle) -> Self {
        let bundle = initial_bundle.with_operator_namespace_excluded();
        ConfigStore {
            current: ArcSwap::from_pointee(ConfigSnapshot {
                bundle: Arc::new(bundle),
                policies: Arc::new(Vec::new()),
            }),
        }
    }

    /// Readers take a cheap `Arc` clone of the whole snapshot; the clone and
    /// everything it points to is immutable, so no lock is ever held across
    /// the pipeline's `.await` points.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Replaces the bundle, re-enforcing the operator-namespace-exclusion
    /// invariant on every update regardless of what the new bundle's
    /// `namespaceConfig.exclude` already contains (spec.md §3 "updates must
    /// preserve that append").
    pub fn update_bundle(&self, bundle: ConfigurationBundle) {
        let bundle = bundle.with_operator_namespace_excluded();
        let previous = self.current.load();
        self.current.store(Arc::new(ConfigSnapshot {
            bundle: Arc::new(bundle),
            policies: previous.policies.clone(),
        }));
    }

    /// Replaces the policy set, re-sorting by priority descending then name
    /// ascending so the matcher (C4) never has to (spec.md §4.4 step 3).
    pub fn update_policies(&self, mut policies: Vec<Policy>) {
        policies.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.metadata.name.cmp(&b.metadata.name))
        });
        let previous = self.current.load();
        self.current.store(Arc::new(ConfigSnapshot {
            bundle: previous.bundle.clone(),
            policies: Arc::new(policies),
        }));
    }
}

#[cfg(test)]
mod tests {
    use resources::objects::{
        policy::{GlobalConstraints, Mode, ResourceStrategy},
        Metadata,
    };

    use super::*;

    fn bundle(operator_namespace: &str) -> ConfigurationBundle {
        ConfigurationBundle {
            metadata: Metadata {
                name: "default".to_owned(),
                ..Default::default()
            },
            enabled: true,
            default_mode: Mode::default(),
            resize_interval_seconds: 60,
            dry_run: false,
            default_resource_strategy: ResourceStrategy::balanced_default(),
            global_constraints: GlobalConstraints::default(),
            namespace_config: Default::default(),
            feature_gates: Default::default(),
            operator_namespace: operator_namespace.to_owned(),
        }
    }

    #[test]
    fn new_store_excludes_operator_namespace() {
        let store = ConfigStore::new(bundle("rightsizer-system"));
        let snap = store.snapshot();
        assert!(snap
            .bundle
            .namespace_config
            .exclude
            .contains(&"rightsizer-system".to_owned()));
    }

    #[test]
    fn update_bundle_preserves_policies() {
        let store = ConfigStore::new(bundle("rightsizer-system"));
        store.update_policies(vec![]);
        store.update_bundle(bundle("rightsizer-system"));
        let snap = store.snapshot();
        assert_eq!(snap.policies.len(), 0);
    }

    #[test]
    fn policies_sorted_by_priority_then_name() {
        let store = ConfigStore::new(bundle("rightsizer-system"));
        let mut low = Policy::synthetic_default(
            "b-policy",
            Mode::Balanced,
            ResourceStrategy::balanced_default(),
            GlobalConstraints::default(),
        );
        low.priority = 10;
        let mut high = Policy::synthetic_default(
            "a-policy",
            Mode::Balanced,
            ResourceStrategy::balanced_default(),
            GlobalConstraints::default(),
        );
        high.priority = 100;
        store.update_policies(vec![low.clone(), high.clone()]);
        let snap = store.snapshot();
        assert_eq!(snap.policies[0].metadata.name, "a-policy");
        assert_eq!(snap.policies[1].metadata.name, "b-policy");
    }
}
