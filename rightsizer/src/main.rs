#[macro_use]
extern crate lazy_static;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

mod applier;
mod audit;
mod calculator;
mod cluster_client;
mod config_store;
mod decision;
mod governor;
mod metrics_client;
mod observability;
mod policy_matcher;
mod reconciler;
mod retry;
mod scheduler;
mod self_protection;
mod validation;

/// Static settings read once at startup (spec.md §6 "operator's own
/// namespace is read from an environment variable"). Distinct from the
/// hot-reloadable `ConfigurationBundle`/`Policy` set owned by the
/// Configuration Store, which is never folded into this singleton
/// (spec.md §9 "Global singleton configuration").
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    pub cluster: resources::config::ClusterConfig,
    /// Fallback used when `RIGHTSIZER_OPERATOR_NAMESPACE` is unset.
    pub operator_namespace: String,
    /// Default tick cadence before any configuration bundle is loaded.
    pub resize_interval_seconds: u64,
    pub metrics_window_seconds: u32,
    pub health_port: u16,
    pub metrics_port: u16,
}

impl Default for AgentSettings {
    fn default() -> Self {
        AgentSettings {
            cluster: resources::config::ClusterConfig::default(),
            operator_namespace: "rightsizer-system".to_owned(),
            resize_interval_seconds: 60,
            metrics_window_seconds: 60,
            health_port: 9090,
            metrics_port: 9091,
        }
    }
}

lazy_static! {
    pub static ref CONFIG: AgentSettings = Config::builder()
        .add_source(File::with_name("/etc/rightsizer/agent.yaml").required(false))
        .add_source(Environment::with_prefix("RIGHTSIZER").separator("_"))
        .build()
        .unwrap_or_default()
        .try_deserialize::<AgentSettings>()
        .with_context(|| "failed to parse agent settings".to_string())
        .unwrap_or_default();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let operator_namespace =
        std::env::var("RIGHTSIZER_OPERATOR_NAMESPACE").unwrap_or_else(|_| CONFIG.operator_namespace.clone());

    tracing::info!(
        operator_namespace = %operator_namespace,
        resize_interval_seconds = CONFIG.resize_interval_seconds,
        "rightsizer agent starting"
    );

    let health = observability::HealthState::new();
    let observability_handle = tokio::spawn(observability::serve(CONFIG.health_port, CONFIG.metrics_port, health.clone()));

    let mut agent = reconciler::Reconciler::new(operator_namespace, health).await?;
    let reconciler_handle = tokio::spawn(async move { agent.run().await });

    tokio::select! {
        result = reconciler_handle => {
            result.context("reconciler task panicked")?.context("reconciler exited with error")?;
        }
        result = observability_handle => {
            result.context("observability task panicked")?.context("observability server exited with error")?;
        }
    }

    Ok(())
}
