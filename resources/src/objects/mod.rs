use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod autoscaler;
pub mod config_bundle;
pub mod limit_range;
pub mod metrics;
pub mod node;
pub mod object_reference;
pub mod pdb;
pub mod pod;
pub mod policy;
pub mod proposal;
pub mod quota;
pub mod replica_set;

pub use object_reference::ObjectReference;

/// Common behavior every cluster-API object exposes to the reconciler.
pub trait Object {
    fn kind(&self) -> &'static str;
    fn name(&self) -> &String;

    /// Stable key under which the informer store indexes this object.
    /// The default is unique enough for cluster-scoped kinds (`Node`); for
    /// namespaced kinds, the lister/watcher prefixes it with the namespace.
    fn resource_key(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }
}

/// Label or annotation map, matched against a selector by simple subset containment.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Labels(pub HashMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Labels(HashMap::new())
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_owned(), value.to_owned());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// True iff every key/value pair in `selector` is present and equal in `self`.
    /// An empty selector matches everything.
    pub fn matches(&self, selector: &Labels) -> bool {
        selector
            .0
            .iter()
            .all(|(k, v)| self.0.get(k).map(|found| found == v).unwrap_or(false))
    }
}

impl Display for Labels {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<_> = self.0.iter().collect();
        pairs.sort_by_key(|(k, _)| k.clone());
        let joined = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{}", joined)
    }
}

/// Annotation selector: same shape as `Labels`, matched identically, kept as a
/// distinct type alias so selectors can't be swapped by accident at call sites.
pub type AnnotationSelector = Labels;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub name: String,
    pub namespace: String,
    pub uid: Option<Uuid>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default)]
    pub owner_references: Vec<ObjectReference>,
}

/// Sum type over the cluster resources this agent reads or mutates. Mirrors
/// the teacher's `KubeObject`, generalized from its single-variant `Pod`
/// stub to the set this agent needs: the resize target (`Pod`), the owner
/// kinds it classifies against (`ReplicaSet`, `Node`), and the two
/// declarative resources it hot-reloads (`AgentConfigBundle`,
/// `ScalingPolicy`).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind")]
pub enum KubeObject {
    Pod(pod::Pod),
    ReplicaSet(replica_set::ReplicaSet),
    Node(node::Node),
    AgentConfigBundle(config_bundle::ConfigurationBundle),
    ScalingPolicy(policy::Policy),
}

impl Object for KubeObject {
    fn kind(&self) -> &'static str {
        match self {
            KubeObject::Pod(o) => o.kind(),
            KubeObject::ReplicaSet(o) => o.kind(),
            KubeObject::Node(o) => o.kind(),
            KubeObject::AgentConfigBundle(o) => o.kind(),
            KubeObject::ScalingPolicy(o) => o.kind(),
        }
    }

    fn name(&self) -> &String {
        match self {
            KubeObject::Pod(o) => o.name(),
            KubeObject::ReplicaSet(o) => o.name(),
            KubeObject::Node(o) => o.name(),
            KubeObject::AgentConfigBundle(o) => o.name(),
            KubeObject::ScalingPolicy(o) => o.name(),
        }
    }

    fn resource_key(&self) -> String {
        match self {
            KubeObject::Pod(o) => o.resource_key(),
            KubeObject::ReplicaSet(o) => o.resource_key(),
            KubeObject::Node(o) => o.resource_key(),
            KubeObject::AgentConfigBundle(o) => o.resource_key(),
            KubeObject::ScalingPolicy(o) => o.resource_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_is_subset_containment() {
        let mut target = Labels::new();
        target.insert("app", "checkout");
        target.insert("tier", "backend");

        let mut selector = Labels::new();
        selector.insert("app", "checkout");
        assert!(target.matches(&selector));

        selector.insert("tier", "frontend");
        assert!(!target.matches(&selector));
    }

    #[test]
    fn empty_selector_matches_everything() {
        let target = Labels::new();
        let selector = Labels::new();
        assert!(target.matches(&selector));
    }
}
