//! Probe and metrics endpoints
//!
//! Serves `/healthz` (liveness), `/readyz` (readiness) and `/metrics`
//! (Prometheus text format) over axum. The server runs for the whole
//! process lifetime, including while the operator is waiting to become
//! leader, so probes keep working on standby replicas.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;

/// Port the probe server binds on
pub const HEALTH_PORT: u16 = 8080;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResourceLabels {
    namespace: String,
    name: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct StateLabels {
    state: String,
}

/// Counters and histograms describing the reconcile loop
pub struct OperatorMetrics {
    reconciles: Family<ResourceLabels, Counter>,
    reconcile_failures: Family<ResourceLabels, Counter>,
    reconcile_seconds: Family<ResourceLabels, Histogram>,
    states_entered: Family<StateLabels, Counter>,
    registry: Registry,
}

impl OperatorMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("kafka_rebalance_operator");

        let reconciles = Family::<ResourceLabels, Counter>::default();
        registry.register(
            "reconciliations",
            "Reconciliations that completed without error",
            reconciles.clone(),
        );

        let reconcile_failures = Family::<ResourceLabels, Counter>::default();
        registry.register(
            "reconciliation_errors",
            "Reconciliations that were projected into a NotReady status",
            reconcile_failures.clone(),
        );

        let reconcile_seconds = Family::<ResourceLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.005, 2.0, 12))
        });
        registry.register(
            "reconcile_duration_seconds",
            "Wall-clock duration of a reconciliation, polling included",
            reconcile_seconds.clone(),
        );

        let states_entered = Family::<StateLabels, Counter>::default();
        registry.register(
            "state_transitions",
            "Status writes that set a rebalance state condition",
            states_entered.clone(),
        );

        Self {
            reconciles,
            reconcile_failures,
            reconcile_seconds,
            states_entered,
            registry,
        }
    }

    pub fn observe_reconcile(&self, namespace: &str, name: &str, seconds: f64) {
        let labels = ResourceLabels {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        };
        self.reconciles.get_or_create(&labels).inc();
        self.reconcile_seconds.get_or_create(&labels).observe(seconds);
    }

    pub fn observe_failure(&self, namespace: &str, name: &str) {
        let labels = ResourceLabels {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        };
        self.reconcile_failures.get_or_create(&labels).inc();
    }

    pub fn observe_state(&self, state: &str) {
        self.states_entered
            .get_or_create(&StateLabels {
                state: state.to_owned(),
            })
            .inc();
    }

    fn render(&self) -> String {
        let mut out = String::new();
        if let Err(e) = encode(&mut out, &self.registry) {
            tracing::error!("Metrics encoding failed: {}", e);
            out.clear();
        }
        out
    }
}

impl Default for OperatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Readiness flag plus the metrics registry, shared with the controller
pub struct HealthState {
    ready: AtomicBool,
    pub metrics: OperatorMetrics,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            metrics: OperatorMetrics::new(),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

async fn readyz(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

pub fn health_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { (StatusCode::OK, "ok") }))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Bind the probe server and serve until the process exits
pub async fn run_health_server(state: Arc<HealthState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", HEALTH_PORT)).await?;
    tracing::info!(port = HEALTH_PORT, "Probe server listening");
    axum::serve(listener, health_router(state)).await
}
