use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use resources::{
    informer::ListerWatcher,
    models::Response,
    objects::{
        metrics::Resource,
        pod::ResizePolicy,
        Object,
    },
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::CONFIG;

/// Builds a lister/watcher pair against the cluster API's REST+websocket
/// convention, generalized from the teacher's `create_lister_watcher` to any
/// `Object` the agent's informers track (pods, policies, bundles, nodes,
/// quotas, limit ranges, PDBs, autoscalers).
pub fn create_lister_watcher<T>(path: &str) -> ListerWatcher<T>
where
    T: Object + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let list_url = format!("{}/api/v1/{}", CONFIG.cluster.api_server_url, path);
    let watch_url = format!("{}/api/v1/watch/{}", CONFIG.cluster.api_server_watch_url, path);
    ListerWatcher {
        lister: Box::new(move |_| {
            let list_url = list_url.clone();
            Box::pin(async move {
                let res = reqwest::get(list_url).await?.json::<Response<Vec<T>>>().await?;
                res.data.ok_or_else(|| anyhow::anyhow!("lister got an empty response"))
            })
        }),
        watcher: Box::new(move |_| {
            let watch_url = watch_url.clone();
            Box::pin(async move {
                let url = reqwest::Url::parse(&watch_url)?;
                let (stream, _) = tokio_tungstenite::connect_async(url).await?;
                Ok(stream)
            })
        }),
    }
}

/// Outcome of a single patch call against one container's one resource
/// (spec.md §4.9 point 5, narrowed to a single axis; the Applier composes
/// the pod-level `ApplyOutcome` from a CPU call and a memory call).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied { restarted: bool },
    Conflict,
    Rejected(String),
    Transient(String),
    NotSupported,
}

/// Cluster-API surface the Applier mutates through (spec.md §4.9). Kept as
/// a trait so the Applier's composition logic is testable without a live
/// cluster API.
#[async_trait]
pub trait ResizeClient: Send + Sync {
    async fn patch_container_resource(
        &self,
        namespace: &str,
        pod: &str,
        container_index: usize,
        resource: Resource,
        request: u64,
        limit: u64,
    ) -> PatchOutcome;

    /// Capability probe backing the Open Question resolution on
    /// memory-limit decreases: defaults to unsupported until the cluster
    /// API confirms otherwise (spec.md §9).
    async fn supports_memory_decrease(&self) -> bool;

    /// Patches a container's `resizePolicy`, gated behind the
    /// `updateResizePolicy` feature gate (spec.md §6). Default
    /// implementation reports the call as unsupported so clients that never
    /// mutate resize policy (e.g. test stubs) don't need to implement it.
    async fn patch_container_resize_policy(
        &self,
        _namespace: &str,
        _pod: &str,
        _container_index: usize,
        _resize_policy: &ResizePolicy,
    ) -> PatchOutcome {
        PatchOutcome::NotSupported
    }
}

pub struct ClusterResizeClient {
    client: Client,
    base_url: String,
}

impl ClusterResizeClient {
    pub fn new(base_url: String) -> Self {
        ClusterResizeClient {
            client: Client::new(),
            base_url,
        }
    }

    pub fn from_config() -> Self {
        Self::new(CONFIG.cluster.api_server_url.clone())
    }

    fn resource_field(resource: Resource) -> &'static str {
        match resource {
            Resource::CPU => "cpu",
            Resource::Memory => "memory",
        }
    }
}

#[async_trait]
impl ResizeClient for ClusterResizeClient {
    async fn patch_container_resource(
        &self,
        namespace: &str,
        pod: &str,
        container_index: usize,
        resource: Resource,
        request: u64,
        limit: u64,
    ) -> PatchOutcome {
        let field = Self::resource_field(resource);
        let path = format!(
            "/spec/containers/{}/resources/requests/{}",
            container_index, field
        );
        let limit_path = format!("/spec/containers/{}/resources/limits/{}", container_index, field);
        let patch = json!([
            { "op": "replace", "path": path, "value": request },
            { "op": "replace", "path": limit_path, "value": limit },
        ]);

        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}/resize",
            self.base_url, namespace, pod
        );

        let response = match self.client.patch(url).json(&patch).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() || err.is_connect() => {
                return PatchOutcome::Transient(err.to_string())
            }
            Err(err) => return PatchOutcome::Transient(err.to_string()),
        };

        match response.status() {
            StatusCode::OK => {
                let restarted = response
                    .json::<Response<ResizeAck>>()
                    .await
                    .ok()
                    .and_then(|r| r.data)
                    .map(|ack| ack.restarted)
                    .unwrap_or(false);
                PatchOutcome::Applied { restarted }
            }
            StatusCode::CONFLICT => PatchOutcome::Conflict,
            StatusCode::NOT_IMPLEMENTED | StatusCode::NOT_FOUND => PatchOutcome::NotSupported,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::FORBIDDEN => {
                let reason = response.text().await.unwrap_or_default();
                PatchOutcome::Rejected(reason)
            }
            status if status.is_server_error() => {
                PatchOutcome::Transient(format!("server error {}", status))
            }
            status => PatchOutcome::Transient(format!("unexpected status {}", status)),
        }
    }

    async fn supports_memory_decrease(&self) -> bool {
        let url = format!("{}/api/v1/capabilities", self.base_url);
        match self.client.get(url).send().await {
            Ok(response) => response
                .json::<Response<ClusterCapabilities>>()
                .await
                .ok()
                .and_then(|r| r.data)
                .map(|c| c.memory_limit_decrease)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn patch_container_resize_policy(
        &self,
        namespace: &str,
        pod: &str,
        container_index: usize,
        resize_policy: &ResizePolicy,
    ) -> PatchOutcome {
        let path = format!("/spec/containers/{}/resizePolicy", container_index);
        let patch = json!([{ "op": "replace", "path": path, "value": resize_policy }]);

        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}/resize",
            self.base_url, namespace, pod
        );

        let response = match self.client.patch(url).json(&patch).send().await {
            Ok(response) => response,
            Err(err) => return PatchOutcome::Transient(err.to_string()),
        };

        match response.status() {
            StatusCode::OK => PatchOutcome::Applied { restarted: false },
            StatusCode::CONFLICT => PatchOutcome::Conflict,
            StatusCode::NOT_IMPLEMENTED | StatusCode::NOT_FOUND => PatchOutcome::NotSupported,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::FORBIDDEN => {
                let reason = response.text().await.unwrap_or_default();
                PatchOutcome::Rejected(reason)
            }
            status if status.is_server_error() => {
                PatchOutcome::Transient(format!("server error {}", status))
            }
            status => PatchOutcome::Transient(format!("unexpected status {}", status)),
        }
    }
}

#[derive(serde::Deserialize)]
struct ResizeAck {
    #[serde(default)]
    restarted: bool,
}

#[derive(serde::Deserialize)]
struct ClusterCapabilities {
    #[serde(default)]
    memory_limit_decrease: bool,
}
