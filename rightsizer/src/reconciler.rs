use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use chrono::Utc;
use futures_util::future::join_all;
use resources::{
    informer::{EventHandler, Informer, ListerWatcher, ResyncHandler, Store},
    objects::{
        autoscaler::{HorizontalAutoscaler, VerticalAutoscaler},
        config_bundle::ConfigurationBundle,
        limit_range::LimitRange,
        metrics::Resource,
        node::Node,
        pdb::PodDisruptionBudget,
        pod::Pod,
        policy::{GlobalConstraints, Mode, Policy, ResourceStrategy},
        quota::ResourceQuota,
        proposal::{ContainerProposal, PodDisposition, ResizeProposal},
        Metadata, Object,
    },
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::task::JoinHandle;

use crate::{
    applier::{self, ApplyOutcome},
    audit,
    calculator,
    cluster_client::{ClusterResizeClient, ResizeClient},
    config_store::{ConfigSnapshot, ConfigStore},
    decision,
    governor::{AdmitDecision, ConcurrencyGovernor},
    metrics_client::{default_provider, MetricsProvider},
    observability::{self, HealthState},
    policy_matcher::{self, namespace_is_eligible},
    retry::{self, CircuitBreaker},
    scheduler::Clock,
    self_protection,
    validation::{self, ValidationContext},
};

const CLIENT_QPS: u32 = 20;
const CLIENT_BURST: u32 = 40;
const DEFAULT_BATCH_SIZE: usize = 5;
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
const CIRCUIT_OPEN_DURATION: Duration = Duration::from_secs(30);
const RETRY_INITIAL_INTERVAL: Duration = Duration::from_millis(200);
const RETRY_MAX_ELAPSED: Duration = Duration::from_secs(5);

/// Ties the pipeline of §2 together: one tick lists the cached cluster state,
/// filters and scores every candidate pod through C4-C11, and lets each
/// container's terminal outcome reach the audit trail (spec.md §5 "parallel
/// threads of execution within a single process").
pub struct Reconciler {
    operator_namespace: String,
    health: HealthState,
    clock: Clock,
    config_store: ConfigStore,
    governor: ConcurrencyGovernor,
    breaker: CircuitBreaker,
    resize_client: Arc<dyn ResizeClient>,
    metrics_provider: Arc<dyn MetricsProvider>,

    pod_store: Store<Pod>,
    policy_store: Store<Policy>,
    bundle_store: Store<ConfigurationBundle>,
    node_store: Store<Node>,
    quota_store: Store<ResourceQuota>,
    limit_range_store: Store<LimitRange>,
    pdb_store: Store<PodDisruptionBudget>,
    hpa_store: Store<HorizontalAutoscaler>,
    vpa_store: Store<VerticalAutoscaler>,

    _informer_handles: Vec<JoinHandle<Result<()>>>,
}

impl Reconciler {
    pub async fn new(operator_namespace: String, health: HealthState) -> Result<Self> {
        let (pod_store, pod_handle) = spawn_passive_informer::<Pod>("pods");
        let (policy_store, policy_handle) = spawn_passive_informer::<Policy>("scalingpolicies");
        let (bundle_store, bundle_handle) = spawn_passive_informer::<ConfigurationBundle>("agentconfigbundles");
        let (node_store, node_handle) = spawn_passive_informer::<Node>("nodes");
        let (quota_store, quota_handle) = spawn_passive_informer::<ResourceQuota>("resourcequotas");
        let (limit_range_store, limit_range_handle) = spawn_passive_informer::<LimitRange>("limitranges");
        let (pdb_store, pdb_handle) = spawn_passive_informer::<PodDisruptionBudget>("poddisruptionbudgets");
        let (hpa_store, hpa_handle) = spawn_passive_informer::<HorizontalAutoscaler>("horizontalautoscalers");
        let (vpa_store, vpa_handle) = spawn_passive_informer::<VerticalAutoscaler>("verticalautoscalers");

        let bootstrap_bundle = ConfigurationBundle {
            metadata: Metadata { name: "bootstrap".to_owned(), ..Default::default() },
            enabled: true,
            default_mode: Mode::default(),
            resize_interval_seconds: crate::CONFIG.resize_interval_seconds,
            dry_run: false,
            default_resource_strategy: ResourceStrategy::balanced_default(),
            global_constraints: GlobalConstraints::default(),
            namespace_config: Default::default(),
            feature_gates: Default::default(),
            operator_namespace: operator_namespace.clone(),
        };
        let constraints = GlobalConstraints::default();

        Ok(Reconciler {
            operator_namespace,
            health,
            clock: Clock::new(crate::CONFIG.resize_interval_seconds),
            config_store: ConfigStore::new(bootstrap_bundle),
            governor: ConcurrencyGovernor::new(constraints.max_concurrent_resizes, CLIENT_QPS, CLIENT_BURST, DEFAULT_BATCH_SIZE),
            breaker: CircuitBreaker::new(CIRCUIT_FAILURE_THRESHOLD, CIRCUIT_OPEN_DURATION),
            resize_client: Arc::new(ClusterResizeClient::from_config()),
            metrics_provider: Arc::new(default_provider()),
            pod_store,
            policy_store,
            bundle_store,
            node_store,
            quota_store,
            limit_range_store,
            pdb_store,
            hpa_store,
            vpa_store,
            _informer_handles: vec![
                pod_handle, policy_handle, bundle_handle, node_handle, quota_handle, limit_range_handle, pdb_handle,
                hpa_handle, vpa_handle,
            ],
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("rightsizer reconciler started");
        loop {
            self.clock.tick().await;
            self.health.heartbeat();
            if let Err(e) = self.tick().await {
                tracing::error!("tick failed: {:#}", e);
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        self.refresh_config_snapshot().await;
        self.governor.ledger().evict_stale();

        let snapshot = self.config_store.snapshot();
        if !snapshot.bundle.enabled {
            tracing::info!("agent disabled by configuration bundle, skipping tick");
            return Ok(());
        }

        let pods: Vec<Pod> = self.pod_store.read().await.values().cloned().collect();
        let nodes: HashMap<String, Node> = self
            .node_store
            .read()
            .await
            .values()
            .map(|n| (n.metadata.name.clone(), n.clone()))
            .collect();
        let quotas: Vec<ResourceQuota> = self.quota_store.read().await.values().cloned().collect();
        let limit_ranges: Vec<LimitRange> = self.limit_range_store.read().await.values().cloned().collect();
        let pdbs: Vec<PodDisruptionBudget> = self.pdb_store.read().await.values().cloned().collect();
        let hpas: Vec<HorizontalAutoscaler> = self.hpa_store.read().await.values().cloned().collect();
        let vpas: Vec<VerticalAutoscaler> = self.vpa_store.read().await.values().cloned().collect();

        let node_totals = node_requested_totals(&pods);
        let resize_subresource_served = snapshot.bundle.feature_gates.in_place_resize;

        let mut candidates = Vec::new();
        for pod in pods {
            if self_protection::is_self(&pod, &self.operator_namespace) {
                observability::SELF_PROTECTION_SKIPS.with_label_values(&["self"]).inc();
                continue;
            }
            if !namespace_is_eligible(&snapshot.bundle, &pod.metadata.namespace) {
                observability::PODS_PROCESSED.with_label_values(&["namespace_ineligible"]).inc();
                continue;
            }
            candidates.push(pod);
        }

        for batch in self.governor.batch(candidates) {
            let futures = batch.into_iter().map(|pod| {
                self.process_pod(
                    pod,
                    &snapshot,
                    &nodes,
                    &quotas,
                    &limit_ranges,
                    &pdbs,
                    &hpas,
                    &vpas,
                    &node_totals,
                    resize_subresource_served,
                )
            });
            join_all(futures).await;
        }

        observability::LAST_TICK_UNIX.set(Utc::now().timestamp() as f64);
        Ok(())
    }

    async fn refresh_config_snapshot(&self) {
        let policies: Vec<Policy> = self.policy_store.read().await.values().cloned().collect();
        self.config_store.update_policies(policies);

        if let Some(bundle) = self.bundle_store.read().await.values().next().cloned() {
            self.config_store.update_bundle(bundle);
            self.health.mark_config_loaded();
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_pod(
        &self,
        pod: Pod,
        snapshot: &ConfigSnapshot,
        nodes: &HashMap<String, Node>,
        quotas: &[ResourceQuota],
        limit_ranges: &[LimitRange],
        pdbs: &[PodDisruptionBudget],
        hpas: &[HorizontalAutoscaler],
        vpas: &[VerticalAutoscaler],
        node_totals: &HashMap<String, (u64, u64)>,
        resize_subresource_served: bool,
    ) {
        let namespace = pod.metadata.namespace.clone();
        let pod_name = pod.metadata.name.clone();
        let policy = policy_matcher::select_policy(&pod, snapshot);
        let resource_strategy = policy.resource_strategy.unwrap_or(snapshot.bundle.default_resource_strategy);
        let constraints = policy.constraints.unwrap_or(snapshot.bundle.global_constraints);
        let current_qos = pod.qos_class();
        let dry_run = snapshot.bundle.dry_run || policy.dry_run;

        let usage_snapshot = match self.metrics_provider.get_usage(&namespace, &pod_name).await {
            Ok(snapshot) => {
                self.health.mark_first_metrics_fetch_ok();
                snapshot
            }
            Err(e) => {
                tracing::debug!(pod = %pod_name, namespace = %namespace, error = %e, "metrics unavailable, skipping pod this tick");
                observability::PODS_PROCESSED.with_label_values(&["metrics_unavailable"]).inc();
                return;
            }
        };

        let mut container_proposals = Vec::with_capacity(pod.spec.containers.len());
        let mut skip_reasons = Vec::with_capacity(pod.spec.containers.len());
        for container in &pod.spec.containers {
            let usage = usage_snapshot
                .containers
                .iter()
                .find(|u| u.container == container.name)
                .cloned()
                .unwrap_or_else(|| resources::objects::metrics::ContainerUsage {
                    container: container.name.clone(),
                    cpu_millicores: 0,
                    memory_bytes: 0,
                });

            let decision = decision::decide(&usage, container.resources, &resource_strategy.cpu, &resource_strategy.memory);

            let proposal = if let Some(reason) = decision.skip_reason() {
                skip_reasons.push(reason);
                ContainerProposal {
                    container: container.name.clone(),
                    current: container.resources,
                    target: container.resources,
                    cpu_direction: decision.cpu_direction,
                    memory_direction: decision.memory_direction,
                    reasons: decision.reasons.clone(),
                }
            } else {
                calculator::calculate(&decision, current_qos, &resource_strategy.cpu, &resource_strategy.memory, &constraints)
            };
            container_proposals.push(proposal);
        }

        let mut proposal = ResizeProposal {
            namespace: namespace.clone(),
            pod: pod_name.clone(),
            uid: pod.metadata.uid,
            qos_class: current_qos,
            policy_name: policy.metadata.name.clone(),
            containers: container_proposals,
            disposition: PodDisposition::Apply,
        };

        if proposal.containers.iter().all(|c| c.is_no_op()) {
            // Distinguishes a memory decrease held back pending
            // restart-policy confirmation (spec.md §4.5) from ordinary
            // steady-state, instead of reporting every no-op the same way.
            let skip_label = if skip_reasons.iter().any(|r| *r == "no_change:mem_decrease_blocked") {
                "no_change:mem_decrease_blocked"
            } else {
                "no_change"
            };
            observability::PODS_PROCESSED.with_label_values(&[skip_label]).inc();
            audit::record_skip(&proposal, skip_label, Utc::now());
            return;
        }

        let node = pod.spec.node_name.as_str();
        let node_used_excluding_pod = node_totals
            .get(node)
            .map(|(cpu, mem)| (cpu.saturating_sub(pod.total_requests(Resource::CPU)), mem.saturating_sub(pod.total_requests(Resource::Memory))))
            .unwrap_or((0, 0));

        let ctx = ValidationContext {
            node: nodes.get(node),
            node_used_excluding_pod,
            quotas,
            limit_ranges,
            pdbs,
            hpas,
            vpas,
            resize_subresource_served,
        };
        let owner = policy_matcher::owner_reference(&pod);
        let report = validation::validate(&pod, &owner, &mut proposal, &constraints, &ctx);

        for warning in report.warnings() {
            tracing::warn!(pod = %pod_name, namespace = %namespace, "{}", warning);
        }

        if report.failed() {
            for (rule, verdict) in &report.rules {
                if verdict.is_fail() {
                    observability::VALIDATION_FAILURES.with_label_values(&[rule]).inc();
                }
            }
            observability::PODS_PROCESSED.with_label_values(&["validation_failed"]).inc();
            audit::record_validation_failure(&proposal, &report, Utc::now());
            return;
        }

        if !proposal.is_applyable() {
            observability::PODS_PROCESSED.with_label_values(&["skip"]).inc();
            audit::record_skip(&proposal, "skip", Utc::now());
            return;
        }

        if dry_run {
            proposal.disposition = PodDisposition::DryRun;
            observability::PODS_PROCESSED.with_label_values(&["dry_run"]).inc();
            audit::record_skip(&proposal, "dry_run", Utc::now());
            return;
        }

        let update_resize_policy = snapshot.bundle.feature_gates.update_resize_policy;
        observability::PODS_PROCESSED.with_label_values(&["apply"]).inc();
        for (index, container_proposal) in proposal.containers.iter().enumerate() {
            if container_proposal.is_no_op() {
                continue;
            }
            self.apply_one_container(
                &namespace,
                &pod_name,
                &policy.metadata.name,
                index,
                &pod,
                container_proposal,
                &constraints,
                update_resize_policy,
            )
            .await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_one_container(
        &self,
        namespace: &str,
        pod_name: &str,
        policy_name: &str,
        container_index: usize,
        pod: &Pod,
        container_proposal: &ContainerProposal,
        constraints: &GlobalConstraints,
        update_resize_policy: bool,
    ) {
        let key = format!("{}/{}/{}", namespace, pod_name, container_proposal.container);
        let cooldown = Duration::from_secs(constraints.cooldown_period_seconds);

        match self.governor.admit(&key, cooldown, constraints.max_restarts_per_hour) {
            AdmitDecision::CooldownActive => {
                observability::COOLDOWN_REJECTIONS.with_label_values(&["cooldown_active"]).inc();
                return;
            }
            AdmitDecision::RestartBudgetExhausted => {
                observability::COOLDOWN_REJECTIONS.with_label_values(&["restart_budget_exhausted"]).inc();
                return;
            }
            AdmitDecision::Admit => {}
        }

        let _slot = self.governor.acquire_slot().await;
        self.governor.throttle_client().await;

        let resize_policy = pod
            .container(&container_proposal.container)
            .map(|c| c.resize_policy)
            .unwrap_or_default();

        observability::RESIZES_ATTEMPTED.with_label_values(&["cpu_or_memory"]).inc();

        let client = self.resize_client.clone();
        let prevent_memory_decrease = constraints.prevent_memory_decrease;
        let container_name = container_proposal.container.clone();
        let namespace_owned = namespace.to_owned();
        let pod_owned = pod_name.to_owned();
        let proposal_for_attempt = container_proposal.clone();

        let result = retry::apply_with_retry(&self.breaker, RETRY_INITIAL_INTERVAL, RETRY_MAX_ELAPSED, || {
            let client = client.clone();
            let namespace_owned = namespace_owned.clone();
            let pod_owned = pod_owned.clone();
            let resize_policy = resize_policy;
            let proposal_for_attempt = proposal_for_attempt.clone();
            async move {
                applier::apply_container(
                    client.as_ref(),
                    &namespace_owned,
                    &pod_owned,
                    container_index,
                    &resize_policy,
                    prevent_memory_decrease,
                    update_resize_policy,
                    &proposal_for_attempt,
                )
                .await
            }
        })
        .await;

        observability::CIRCUIT_BREAKER_STATE.set(self.breaker.is_open() as i64);
        self.governor.ledger().record_applied(&key, result.restarted);
        observability::RESIZES_APPLIED
            .with_label_values(&["cpu_or_memory", outcome_metric_label(&result.outcome)])
            .inc();

        audit::record_apply(
            &namespace_owned,
            &pod_owned,
            policy_name,
            &container_name,
            container_proposal.current,
            container_proposal.target,
            &result.outcome,
            Utc::now(),
        );
    }
}

fn outcome_metric_label(outcome: &ApplyOutcome) -> &'static str {
    match outcome {
        ApplyOutcome::Applied => "applied",
        ApplyOutcome::PartiallyApplied { .. } => "partially_applied",
        ApplyOutcome::NotSupported => "not_supported",
        ApplyOutcome::Conflict => "conflict",
        ApplyOutcome::Rejected(_) => "rejected",
        ApplyOutcome::Transient(_) => "transient",
    }
}

/// Sums current requests per node across every scheduled pod, so per-pod
/// node-capacity checks don't re-scan the whole pod list (spec.md §4.7
/// "node capacity").
fn node_requested_totals(pods: &[Pod]) -> HashMap<String, (u64, u64)> {
    let mut totals: HashMap<String, (u64, u64)> = HashMap::new();
    for pod in pods {
        if pod.spec.node_name.is_empty() {
            continue;
        }
        let entry = totals.entry(pod.spec.node_name.clone()).or_insert((0, 0));
        entry.0 += pod.total_requests(Resource::CPU);
        entry.1 += pod.total_requests(Resource::Memory);
    }
    totals
}

/// Builds a read-only cache for a cluster resource kind with no reaction to
/// individual events; the reconciler re-derives everything it needs from a
/// full snapshot at the top of every tick (spec.md §9 "Shared mutable
/// caches... readers take a snapshot reference").
fn spawn_passive_informer<T>(path: &str) -> (Store<T>, JoinHandle<Result<()>>)
where
    T: Object + Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let lw: ListerWatcher<T> = crate::cluster_client::create_lister_watcher(path);
    let eh = EventHandler::<T> {
        add_cls: Box::new(|_| Box::pin(async { Ok(()) })),
        update_cls: Box::new(|_| Box::pin(async { Ok(()) })),
        delete_cls: Box::new(|_| Box::pin(async { Ok(()) })),
    };
    let rh = ResyncHandler(Box::new(|_| Box::pin(async { Ok(()) })));
    let informer = Informer::new(lw, eh, rh);
    let store = informer.get_store();
    let handle = tokio::spawn(async move { informer.run().await });
    (store, handle)
}
