use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Serialize, Deserialize, Hash, Clone, Copy, Eq, PartialEq, Display)]
pub enum Resource {
    CPU,
    Memory,
}

/// One container's usage as reported by a metrics backend for a single
/// collection window (spec.md §4.2). CPU is a rate in millicores over the
/// provider's window; memory is working-set bytes, converted to the
/// canonical MiB unit only once it crosses into the decision pipeline.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ContainerUsage {
    pub container: String,
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

impl ContainerUsage {
    pub fn memory_mib(&self) -> u64 {
        self.memory_bytes / (1024 * 1024)
    }
}

/// A pod's usage across all its containers for one collection window, plus
/// the freshness metadata spec.md §4.2 requires callers be able to inspect.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PodUsageSnapshot {
    pub namespace: String,
    pub pod: String,
    /// Duration in seconds over which the metrics were gathered.
    pub window_seconds: u32,
    pub observed_at: NaiveDateTime,
    pub containers: Vec<ContainerUsage>,
}

/// Immutable per-(namespace,pod,container) snapshot (spec.md §3 "Container
/// Usage Sample"). A bounded ring of these may be retained for trend use by
/// a pluggable history source; the agent core only ever looks at the most
/// recent sample unless `Resource Strategy.historyWindow` is configured.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContainerUsageSample {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
    pub observed_at: NaiveDateTime,
}

impl ContainerUsageSample {
    pub fn memory_mib(&self) -> u64 {
        self.memory_bytes / (1024 * 1024)
    }
}
