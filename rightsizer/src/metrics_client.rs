use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use resources::objects::metrics::{ContainerUsage, PodUsageSnapshot};

use crate::CONFIG;

/// Outcome of a usage fetch (spec.md §4.2). `Unavailable` means the caller
/// should skip the pod for this tick; `NotFound` means the pod vanished
/// between listing and metrics fetch, which the reconciler treats the same
/// as a deletion event.
#[derive(Debug)]
pub enum MetricsError {
    Unavailable(String),
    NotFound,
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::Unavailable(reason) => write!(f, "metrics unavailable: {}", reason),
            MetricsError::NotFound => write!(f, "pod not found in metrics backend"),
        }
    }
}

impl std::error::Error for MetricsError {}

/// Pluggable usage source (spec.md §4.2, §6 "at least two providers are
/// supported abstractly"). CPU must be a rate in millicores over the
/// provider's own window; memory is working-set bytes.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn get_usage(&self, namespace: &str, pod: &str) -> Result<PodUsageSnapshot, MetricsError>;
}

/// Short-window aggregator built into the cluster (analogous to the
/// Kubernetes metrics-server): point-in-time, no configurable query.
pub struct ClusterAggregatorProvider {
    client: Client,
    base_url: String,
}

impl ClusterAggregatorProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl MetricsProvider for ClusterAggregatorProvider {
    async fn get_usage(&self, namespace: &str, pod: &str) -> Result<PodUsageSnapshot, MetricsError> {
        let url = format!("{}/api/v1/metrics/namespaces/{}/pods/{}", self.base_url, namespace, pod);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MetricsError::NotFound);
        }
        if !response.status().is_success() {
            return Err(MetricsError::Unavailable(format!("status {}", response.status())));
        }

        response
            .json::<PodUsageSnapshot>()
            .await
            .map_err(|e| MetricsError::Unavailable(e.to_string()))
    }
}

/// Time-series backend (e.g. a Prometheus-compatible store) queried with a
/// configurable window and a per-metric query template (spec.md §6).
pub struct TimeSeriesProvider {
    client: Client,
    query_url: String,
    window_seconds: u32,
    cpu_query_template: String,
    memory_query_template: String,
}

impl TimeSeriesProvider {
    pub fn new(query_url: String, window_seconds: u32) -> Self {
        Self {
            client: Client::new(),
            query_url,
            window_seconds,
            cpu_query_template: "rate(container_cpu_usage_seconds_total{namespace=\"{ns}\",pod=\"{pod}\"}[{window}s]) * 1000".to_owned(),
            memory_query_template: "container_memory_working_set_bytes{namespace=\"{ns}\",pod=\"{pod}\"}".to_owned(),
        }
    }

    fn render(template: &str, namespace: &str, pod: &str, window_seconds: u32) -> String {
        template
            .replace("{ns}", namespace)
            .replace("{pod}", pod)
            .replace("{window}", &window_seconds.to_string())
    }
}

#[derive(serde::Deserialize)]
struct TimeSeriesQueryResult {
    #[serde(default)]
    series: Vec<TimeSeriesSample>,
}

#[derive(serde::Deserialize)]
struct TimeSeriesSample {
    container: String,
    value: f64,
}

#[async_trait]
impl MetricsProvider for TimeSeriesProvider {
    async fn get_usage(&self, namespace: &str, pod: &str) -> Result<PodUsageSnapshot, MetricsError> {
        let cpu_query = Self::render(&self.cpu_query_template, namespace, pod, self.window_seconds);
        let memory_query = Self::render(&self.memory_query_template, namespace, pod, self.window_seconds);

        let cpu = self.run_query(&cpu_query).await?;
        let memory = self.run_query(&memory_query).await?;

        if cpu.series.is_empty() && memory.series.is_empty() {
            return Err(MetricsError::NotFound);
        }

        let mut containers: Vec<ContainerUsage> = Vec::new();
        for sample in cpu.series {
            containers.push(ContainerUsage {
                container: sample.container,
                cpu_millicores: sample.value.max(0.0).round() as u64,
                memory_bytes: 0,
            });
        }
        for sample in memory.series {
            if let Some(existing) = containers.iter_mut().find(|c| c.container == sample.container) {
                existing.memory_bytes = sample.value.max(0.0).round() as u64;
            } else {
                containers.push(ContainerUsage {
                    container: sample.container,
                    cpu_millicores: 0,
                    memory_bytes: sample.value.max(0.0).round() as u64,
                });
            }
        }

        Ok(PodUsageSnapshot {
            namespace: namespace.to_owned(),
            pod: pod.to_owned(),
            window_seconds: self.window_seconds,
            observed_at: Utc::now().naive_utc(),
            containers,
        })
    }
}

impl TimeSeriesProvider {
    async fn run_query(&self, query: &str) -> Result<TimeSeriesQueryResult, MetricsError> {
        self.client
            .get(&self.query_url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?
            .json::<TimeSeriesQueryResult>()
            .await
            .map_err(|e| MetricsError::Unavailable(e.to_string()))
    }
}

pub fn default_provider() -> ClusterAggregatorProvider {
    ClusterAggregatorProvider::new(CONFIG.cluster.api_server_url.clone())
}
