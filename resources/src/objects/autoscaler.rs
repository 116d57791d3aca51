use serde::{Deserialize, Serialize};

use super::{object_reference::ObjectReference, Metadata, Object};

/// Read-only reference to a horizontal autoscaler targeting a workload,
/// used by the Validation Engine's autoscaler-conflict rule (spec.md §4.7,
/// `respectHPA` warns and strips conflicting axes rather than failing).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HorizontalAutoscaler {
    pub metadata: Metadata,
    pub spec: AutoscalerSpec,
}

impl Object for HorizontalAutoscaler {
    fn kind(&self) -> &'static str {
        "HorizontalAutoscaler"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }

    fn resource_key(&self) -> String {
        format!(
            "HorizontalAutoscaler/{}/{}",
            self.metadata.namespace, self.metadata.name
        )
    }
}

/// Read-only reference to a vertical autoscaler targeting a workload. When
/// `respectVPA` is set, any overlap fails the proposal outright rather than
/// being stripped, since VPA and this agent would otherwise fight over the
/// same knob.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VerticalAutoscaler {
    pub metadata: Metadata,
    pub spec: AutoscalerSpec,
}

impl Object for VerticalAutoscaler {
    fn kind(&self) -> &'static str {
        "VerticalAutoscaler"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }

    fn resource_key(&self) -> String {
        format!(
            "VerticalAutoscaler/{}/{}",
            self.metadata.namespace, self.metadata.name
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AutoscalerSpec {
    pub scale_target_ref: ObjectReference,
}
