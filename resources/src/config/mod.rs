use serde::{Deserialize, Serialize};

/// Location of the cluster API the agent lists/watches resources through
/// (spec.md §6 "Cluster API"). Shared by the cluster client and every
/// informer's lister/watcher pair.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterConfig {
    pub api_server_url: String,
    pub api_server_watch_url: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            api_server_url: "http://localhost:8080".to_string(),
            api_server_watch_url: "ws://localhost:8080".to_string(),
        }
    }
}
