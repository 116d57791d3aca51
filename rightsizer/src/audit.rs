use chrono::{DateTime, Utc};
use resources::objects::{
    pod::ContainerResources,
    proposal::{PodDisposition, ResizeProposal},
};
use serde::{Deserialize, Serialize};

use crate::applier::ApplyOutcome;
use crate::validation::ValidationReport;

/// One entry of the structured audit trail (spec.md §6 "Structured audit
/// events emitted per proposal with fields `{pod, container, decision,
/// beforeResources, afterResources, ruleOutcomes, policyName, timestamp}`").
/// Emitted at every terminal state of a proposal's lifecycle (spec.md §4.9
/// "terminal states emit audit events"), never at `Pending`/`InFlight`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub pod: String,
    pub namespace: String,
    pub container: String,
    pub decision: String,
    pub before_resources: ContainerResources,
    pub after_resources: ContainerResources,
    pub rule_outcomes: Vec<String>,
    pub policy_name: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Emits the event as a structured log line. A dedicated audit sink is
    /// out of scope (spec.md §1 "only their interaction contracts appear in
    /// §6"); `tracing` carries the event to whatever collects it downstream.
    pub fn emit(&self) {
        tracing::info!(
            audit = true,
            pod = %self.pod,
            namespace = %self.namespace,
            container = %self.container,
            decision = %self.decision,
            policy_name = %self.policy_name,
            rule_outcomes = ?self.rule_outcomes,
            timestamp = %self.timestamp,
            "resize proposal terminal state"
        );
    }
}

/// Builds and emits one audit event per container in a proposal that was
/// skipped before reaching the applier (validation failure, no-op, cooldown,
/// self-protection). `reason` becomes the `decision` field.
pub fn record_skip(proposal: &ResizeProposal, reason: &str, timestamp: DateTime<Utc>) {
    for container in &proposal.containers {
        AuditEvent {
            pod: proposal.pod.clone(),
            namespace: proposal.namespace.clone(),
            container: container.container.clone(),
            decision: reason.to_owned(),
            before_resources: container.current.clone(),
            after_resources: container.current.clone(),
            rule_outcomes: vec![],
            policy_name: proposal.policy_name.clone(),
            timestamp,
        }
        .emit();
    }
}

/// Builds and emits the audit events produced by a failed validation pass
/// (spec.md §7 "Validation failures: each rule reports a reason ... audit
/// logged, no retry").
pub fn record_validation_failure(proposal: &ResizeProposal, report: &ValidationReport, timestamp: DateTime<Utc>) {
    let reason = match &proposal.disposition {
        PodDisposition::Skip(reason) => reason.clone(),
        _ => "validation_failed".to_owned(),
    };
    let rule_outcomes: Vec<String> = report
        .rules
        .iter()
        .map(|(name, verdict)| format!("{}:{:?}", name, verdict))
        .collect();
    for container in &proposal.containers {
        AuditEvent {
            pod: proposal.pod.clone(),
            namespace: proposal.namespace.clone(),
            container: container.container.clone(),
            decision: reason.clone(),
            before_resources: container.current.clone(),
            after_resources: container.current.clone(),
            rule_outcomes: rule_outcomes.clone(),
            policy_name: proposal.policy_name.clone(),
            timestamp,
        }
        .emit();
    }
}

/// Builds and emits the audit event for one container's terminal apply
/// outcome (spec.md §4.9 state machine).
pub fn record_apply(
    namespace: &str,
    pod: &str,
    policy_name: &str,
    container: &str,
    before: ContainerResources,
    after: ContainerResources,
    outcome: &ApplyOutcome,
    timestamp: DateTime<Utc>,
) {
    AuditEvent {
        pod: pod.to_owned(),
        namespace: namespace.to_owned(),
        container: container.to_owned(),
        decision: outcome_label(outcome),
        before_resources: before,
        after_resources: after,
        rule_outcomes: vec![],
        policy_name: policy_name.to_owned(),
        timestamp,
    }
    .emit();
}

fn outcome_label(outcome: &ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::Applied => "applied".to_owned(),
        ApplyOutcome::PartiallyApplied { cpu, memory } => {
            format!("partially_applied(cpu={},memory={})", cpu, memory)
        }
        ApplyOutcome::NotSupported => "not_supported".to_owned(),
        ApplyOutcome::Conflict => "conflict".to_owned(),
        ApplyOutcome::Rejected(reason) => format!("rejected:{}", reason),
        ApplyOutcome::Transient(reason) => format!("deferred:{}", reason),
    }
}

#[cfg(test)]
mod tests {
    use resources::objects::pod::ResourceList;

    use super::*;

    fn resources(cpu: u64, mem: u64) -> ContainerResources {
        ContainerResources {
            requests: ResourceList { cpu_millicores: cpu, memory_mib: mem },
            limits: ResourceList { cpu_millicores: cpu * 2, memory_mib: mem * 2 },
        }
    }

    #[test]
    fn outcome_label_names_each_variant() {
        assert_eq!(outcome_label(&ApplyOutcome::Applied), "applied");
        assert_eq!(
            outcome_label(&ApplyOutcome::PartiallyApplied { cpu: true, memory: false }),
            "partially_applied(cpu=true,memory=false)"
        );
        assert_eq!(outcome_label(&ApplyOutcome::Conflict), "conflict");
        assert_eq!(outcome_label(&ApplyOutcome::Rejected("quota".to_owned())), "rejected:quota");
    }

    #[test]
    fn record_apply_does_not_panic_on_unchanged_resources() {
        let before = resources(100, 200);
        let after = before.clone();
        record_apply(
            "checkout",
            "web-1",
            "default",
            "app",
            before,
            after,
            &ApplyOutcome::Applied,
            Utc::now(),
        );
    }
}
