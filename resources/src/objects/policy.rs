use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::{object_reference::ObjectReference, AnnotationSelector, Labels, Metadata, Object};

/// A named, selector-scoped override of the global defaults (spec.md §3
/// "Policy"). Declarative, hot-reloadable, one of the two resource kinds
/// the Configuration Store watches.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub metadata: Metadata,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 0-1000; higher wins selection ties, then lexicographic name.
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub dry_run: bool,
    pub target_ref: PolicyTargetRef,
    /// Overrides the global default resource strategy. `None` means
    /// "inherit the global default" rather than "use a zeroed strategy".
    #[serde(default)]
    pub resource_strategy: Option<ResourceStrategy>,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub constraints: Option<GlobalConstraints>,
    #[serde(default)]
    pub annotations_to_add: Labels,
}

fn default_true() -> bool {
    true
}

impl Object for Policy {
    fn kind(&self) -> &'static str {
        "ScalingPolicy"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }

    fn resource_key(&self) -> String {
        format!("ScalingPolicy/{}/{}", self.metadata.namespace, self.metadata.name)
    }
}

impl Policy {
    /// Synthetic policy wrapping the global defaults, returned by the
    /// matcher when no named policy matches a workload (spec.md §4.4 step 4).
    pub fn synthetic_default(
        name: &str,
        default_mode: Mode,
        default_strategy: ResourceStrategy,
        default_constraints: GlobalConstraints,
    ) -> Self {
        Policy {
            metadata: Metadata {
                name: name.to_owned(),
                ..Default::default()
            },
            enabled: true,
            priority: 0,
            mode: default_mode,
            dry_run: false,
            target_ref: PolicyTargetRef::default(),
            resource_strategy: Some(default_strategy),
            schedule: Schedule::default(),
            constraints: Some(default_constraints),
            annotations_to_add: Labels::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Aggressive,
    Balanced,
    Conservative,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Balanced
    }
}

/// Selector combinator: every set field combines by logical AND (spec.md
/// §3 Policy invariants, §4.4 step 2). `names`/`excludeNames` apply last.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetRef {
    /// Empty matches any owner kind, including bare pods.
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub exclude_namespaces: Vec<String>,
    #[serde(default)]
    pub label_selector: Labels,
    #[serde(default)]
    pub annotation_selector: AnnotationSelector,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub exclude_names: Vec<String>,
}

impl PolicyTargetRef {
    pub fn matches_owner(&self, owner: &ObjectReference) -> bool {
        self.kind.is_empty() || owner.matches_owner(&self.kind, &self.api_version)
    }
}

/// One resource's worth of sizing rules (spec.md §3 "Resource Strategy"),
/// held independently for CPU and memory.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ResourceStrategy {
    pub cpu: ResourceStrategyAxis,
    pub memory: ResourceStrategyAxis,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStrategyAxis {
    pub request_multiplier: f64,
    #[serde(default)]
    pub request_addition: f64,
    pub limit_multiplier: f64,
    #[serde(default)]
    pub limit_addition: f64,
    pub min_request: u64,
    pub max_limit: u64,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    /// When set, overrides threshold-based classification with a target
    /// utilization (spec.md §4.6).
    #[serde(default)]
    pub target_utilization: Option<f64>,
    /// Used only if a trend source is plugged in; the core reconciler
    /// reads the latest sample unless this is set.
    #[serde(default)]
    pub history_window_seconds: Option<u32>,
    #[serde(default)]
    pub percentile: Option<f64>,
}

impl ResourceStrategyAxis {
    /// Enforces the invariant `scaleDown < scaleUp` (spec.md §3); a gap
    /// below 0.2 is allowed but not recommended, so only the ordering is a
    /// hard error.
    pub fn validate(&self) -> Result<(), String> {
        if self.scale_down_threshold >= self.scale_up_threshold {
            return Err(format!(
                "scaleDownThreshold ({}) must be < scaleUpThreshold ({})",
                self.scale_down_threshold, self.scale_up_threshold
            ));
        }
        if self.request_multiplier < 1.0 || self.limit_multiplier < 1.0 {
            return Err("requestMultiplier and limitMultiplier must be >= 1.0".to_owned());
        }
        if self.min_request > self.max_limit {
            return Err("minRequest must be <= maxLimit".to_owned());
        }
        Ok(())
    }
}

impl ResourceStrategy {
    pub fn validate(&self) -> Result<(), String> {
        self.cpu.validate()?;
        self.memory.validate()
    }

    /// Conservative defaults: modest multipliers, a wide hysteresis gap.
    pub fn balanced_default() -> Self {
        let cpu = ResourceStrategyAxis {
            request_multiplier: 1.2,
            request_addition: 0.0,
            limit_multiplier: 1.5,
            limit_addition: 0.0,
            min_request: 10,
            max_limit: 4000,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            target_utilization: None,
            history_window_seconds: None,
            percentile: None,
        };
        let memory = ResourceStrategyAxis {
            request_multiplier: 1.2,
            request_addition: 0.0,
            limit_multiplier: 1.5,
            limit_addition: 0.0,
            min_request: 32,
            max_limit: 16384,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            target_utilization: None,
            history_window_seconds: None,
            percentile: None,
        };
        ResourceStrategy { cpu, memory }
    }
}

/// Cluster-wide safety caps (spec.md §3 "Global Constraints"), overridable
/// per policy.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConstraints {
    pub max_change_percentage: f64,
    pub min_change_threshold: f64,
    pub cooldown_period_seconds: u64,
    pub max_concurrent_resizes: u32,
    pub max_restarts_per_hour: u32,
    #[serde(default = "default_true")]
    pub respect_pdb: bool,
    #[serde(default = "default_true")]
    pub respect_hpa: bool,
    #[serde(default = "default_true")]
    pub respect_vpa: bool,
    #[serde(default = "default_true")]
    pub preserve_guaranteed_qos: bool,
    #[serde(default)]
    pub prevent_memory_decrease: Option<bool>,
}

impl Default for GlobalConstraints {
    fn default() -> Self {
        GlobalConstraints {
            max_change_percentage: 0.5,
            min_change_threshold: 0.1,
            cooldown_period_seconds: 300,
            max_concurrent_resizes: 5,
            max_restarts_per_hour: 3,
            respect_pdb: true,
            respect_hpa: true,
            respect_vpa: true,
            preserve_guaranteed_qos: true,
            prevent_memory_decrease: None,
        }
    }
}

/// Per-policy schedule (spec.md §4.1). `interval` drives tick cadence when
/// set on a policy that overrides the global `resizeInterval`; `cron` and
/// `timeWindows` are eligibility filters layered on top, never a
/// replacement for the tick driver (spec.md §9 open question, resolved).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default)]
    pub interval_seconds: Option<u64>,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
    #[serde(default)]
    pub cooldown_period_seconds: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// IANA timezone name; schedule eligibility is evaluated in this zone
    /// (spec.md §4.1 "in its timezone").
    pub timezone: String,
}

/// Kept distinct from `chrono::Weekday` so this type has a stable,
/// lowercase-on-the-wire serde form independent of chrono's own.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<chrono::Weekday> for Weekday {
    fn from(value: chrono::Weekday) -> Self {
        match value {
            chrono::Weekday::Mon => Weekday::Mon,
            chrono::Weekday::Tue => Weekday::Tue,
            chrono::Weekday::Wed => Weekday::Wed,
            chrono::Weekday::Thu => Weekday::Thu,
            chrono::Weekday::Fri => Weekday::Fri,
            chrono::Weekday::Sat => Weekday::Sat,
            chrono::Weekday::Sun => Weekday::Sun,
        }
    }
}
