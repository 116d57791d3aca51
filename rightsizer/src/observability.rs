use std::sync::{
    atomic::{AtomicBool, AtomicI64, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{response::IntoResponse, routing::get, Extension, Router};
use prometheus::{
    opts, register_gauge, register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, Gauge,
    HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};

/// Liveness/readiness state shared between the reconciler and the HTTP
/// server (spec.md §6 "Liveness and readiness HTTP probes"). Cheap to clone;
/// every field is independently atomic so the reconciler never blocks on a
/// lock to report progress.
#[derive(Clone)]
pub struct HealthState {
    inner: Arc<HealthInner>,
}

struct HealthInner {
    last_heartbeat_unix: AtomicI64,
    config_loaded: AtomicBool,
    first_metrics_fetch_ok: AtomicBool,
}

impl HealthState {
    pub fn new() -> Self {
        HealthState {
            inner: Arc::new(HealthInner {
                last_heartbeat_unix: AtomicI64::new(0),
                config_loaded: AtomicBool::new(false),
                first_metrics_fetch_ok: AtomicBool::new(false),
            }),
        }
    }

    pub fn heartbeat(&self) {
        self.inner
            .last_heartbeat_unix
            .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn mark_config_loaded(&self) {
        self.inner.config_loaded.store(true, Ordering::Relaxed);
    }

    pub fn mark_first_metrics_fetch_ok(&self) {
        self.inner.first_metrics_fetch_ok.store(true, Ordering::Relaxed);
    }

    /// Healthy while the reconciler heartbeat is recent (spec.md §6). A tick
    /// may legitimately take longer than the interval under load, so the
    /// staleness bound is a multiple of it rather than the interval itself.
    fn is_live(&self, max_heartbeat_age: Duration) -> bool {
        let last = self.inner.last_heartbeat_unix.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        let age = chrono::Utc::now().timestamp() - last;
        age >= 0 && (age as u64) < max_heartbeat_age.as_secs()
    }

    fn is_ready(&self) -> bool {
        self.inner.config_loaded.load(Ordering::Relaxed) && self.inner.first_metrics_fetch_ok.load(Ordering::Relaxed)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref PODS_PROCESSED: IntCounterVec =
        register_int_counter_vec!(opts!("rightsizer_pods_processed_total", "Pods evaluated per tick"), &["outcome"])
            .unwrap();
    pub static ref DECISIONS: IntCounterVec = register_int_counter_vec!(
        opts!("rightsizer_decisions_total", "Scaling decisions by direction"),
        &["container_resource", "direction"]
    )
    .unwrap();
    pub static ref RESIZES_ATTEMPTED: IntCounterVec = register_int_counter_vec!(
        opts!("rightsizer_resizes_attempted_total", "Resize apply attempts"),
        &["resource"]
    )
    .unwrap();
    pub static ref RESIZES_APPLIED: IntCounterVec = register_int_counter_vec!(
        opts!("rightsizer_resizes_applied_total", "Resize apply outcomes"),
        &["resource", "outcome"]
    )
    .unwrap();
    pub static ref VALIDATION_FAILURES: IntCounterVec = register_int_counter_vec!(
        opts!("rightsizer_validation_failures_total", "Validation rule failures"),
        &["rule"]
    )
    .unwrap();
    pub static ref COOLDOWN_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        opts!("rightsizer_cooldown_rejections_total", "Proposals rejected by the governor"),
        &["reason"]
    )
    .unwrap();
    pub static ref SELF_PROTECTION_SKIPS: IntCounterVec = register_int_counter_vec!(
        opts!("rightsizer_self_protection_skips_total", "Pods filtered by the self-protection guard"),
        &["reason"]
    )
    .unwrap();
    pub static ref CIRCUIT_BREAKER_STATE: IntGauge =
        register_int_gauge!("rightsizer_circuit_breaker_open", "1 when the cluster-API circuit breaker is open").unwrap();
    pub static ref TICK_DURATION: HistogramVec = register_histogram_vec!(
        "rightsizer_tick_duration_seconds",
        "Wall-clock time of one reconciliation tick",
        &["phase"]
    )
    .unwrap();
    pub static ref LAST_TICK_UNIX: Gauge =
        register_gauge!("rightsizer_last_tick_unix_seconds", "Unix timestamp of the last completed tick").unwrap();
}

async fn liveness() -> impl IntoResponse {
    "ok"
}

async fn readiness(Extension(health): Extension<HealthState>) -> impl axum::response::IntoResponse {
    if health.is_ready() {
        (axum::http::StatusCode::OK, "ready")
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn live_probe(Extension(health): Extension<HealthState>) -> impl axum::response::IntoResponse {
    if health.is_live(Duration::from_secs(300)) {
        (axum::http::StatusCode::OK, "live")
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "stale heartbeat")
    }
}

async fn metrics() -> Result<String, axum::http::StatusCode> {
    let metric_families = prometheus::gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serves liveness/readiness on `health_port` and the Prometheus text-format
/// scrape endpoint on `metrics_port` (spec.md §6). Both listeners run for
/// the life of the process; `main` races this task against the reconciler
/// so either one exiting brings the agent down.
pub async fn serve(health_port: u16, metrics_port: u16, health: HealthState) -> Result<()> {
    let health_app = Router::new()
        .route("/healthz", get(live_probe))
        .route("/readyz", get(readiness))
        .route("/", get(liveness))
        .layer(Extension(health));

    let metrics_app = Router::new().route("/metrics", get(metrics));

    let health_addr = ([0, 0, 0, 0], health_port).into();
    let metrics_addr = ([0, 0, 0, 0], metrics_port).into();

    tracing::info!(%health_port, %metrics_port, "observability endpoints listening");

    tokio::try_join!(
        async {
            axum::Server::bind(&health_addr)
                .serve(health_app.into_make_service())
                .await
                .context("health server exited")
        },
        async {
            axum::Server::bind(&metrics_addr)
                .serve(metrics_app.into_make_service())
                .await
                .context("metrics server exited")
        }
    )?;

    Ok(())
}
