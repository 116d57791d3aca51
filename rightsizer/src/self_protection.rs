use resources::objects::pod::Pod;

/// Label key the agent's own deployment carries; checked regardless of
/// what any policy's selectors say (spec.md §4.11).
const AGENT_APP_LABEL: &str = "app.kubernetes.io/name";
const AGENT_APP_LABEL_VALUE: &str = "rightsizer";

/// Mandatory, non-disableable filter run before any other decision stage
/// (spec.md §4.11, invariant 6 "the agent's own pods are never subjects of
/// a proposal"). No policy, selector, or feature gate can override this.
pub fn is_self(pod: &Pod, operator_namespace: &str) -> bool {
    if pod.metadata.namespace == operator_namespace {
        return true;
    }
    if pod
        .metadata
        .labels
        .get(AGENT_APP_LABEL)
        .map(|v| v == AGENT_APP_LABEL_VALUE)
        .unwrap_or(false)
    {
        return true;
    }
    // A stray pod bearing the agent's workload name in some other
    // namespace (e.g. a canary or migration artifact) is still refused,
    // even though it wouldn't be caught by the namespace or label checks.
    name_matches_agent_workload(&pod.metadata.name)
}

fn name_matches_agent_workload(name: &str) -> bool {
    name == AGENT_APP_LABEL_VALUE || name.starts_with(&format!("{}-", AGENT_APP_LABEL_VALUE))
}

#[cfg(test)]
mod tests {
    use resources::objects::{Labels, Metadata};

    use super::*;

    fn pod_in(namespace: &str, name: &str) -> Pod {
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

    #[test]
    fn pod_in_operator_namespace_is_self() {
        let pod = pod_in("rightsizer-system", "anything");
        assert!(is_self(&pod, "rightsizer-system"));
    }

    #[test]
    fn pod_with_agent_label_is_self_regardless_of_namespace() {
        let mut pod = pod_in("checkout", "web-1");
        pod.metadata.labels = {
            let mut l = Labels::new();
            l.insert(AGENT_APP_LABEL, AGENT_APP_LABEL_VALUE);
            l
        };
        assert!(is_self(&pod, "rightsizer-system"));
    }

    #[test]
    fn ordinary_workload_is_not_self() {
        let pod = pod_in("checkout", "web-1");
        assert!(!is_self(&pod, "rightsizer-system"));
    }
}
