//! Kafka Rebalance Operator
//!
//! A Kubernetes operator for driving partition rebalances through Cruise
//! Control.
//!
//! ## Custom Resources
//!
//! - `KafkaRebalance`: a user-declared rebalance intent, bound to a Kafka
//!   cluster by the `strimzi.io/cluster` label
//! - `Kafka`: consumed only; it must declare `spec.cruiseControl` for a
//!   rebalance to be possible
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: kafka.strimzi.io/v1beta2
//! kind: KafkaRebalance
//! metadata:
//!   name: my-rebalance
//!   labels:
//!     strimzi.io/cluster: my-cluster
//! spec:
//!   goals:
//!     - RackAwareGoal
//!     - DiskCapacityGoal
//! ```
//!
//! The flow is reflected in the status: a new resource gets a dry-run
//! proposal (`PendingProposal` → `ProposalReady`), the user approves it with
//! the `strimzi.io/rebalance=approve` annotation (`Rebalancing` → `Ready`),
//! and can stop or refresh it with the same annotation key.

pub mod config;
pub mod controller;
pub mod crd;
pub mod cruise_control;
pub mod health;

pub use config::OperatorConfig;
pub use controller::{Context, Error, Result, reconcile_rebalance};
pub use crd::{Kafka, KafkaRebalance, KafkaRebalanceStatus, RebalanceState};
pub use cruise_control::CruiseControlClient;

use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::api::ListParams;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher;
use kube::{Api, Client};

use controller::lock::ResourceKey;
use controller::reconciler::resource_key;

/// Run the rebalance controller: a watch subscription plus a periodic
/// listing sweep, both dispatching into the per-resource reconcile loop.
///
/// This runs until the process exits; on shutdown the caller cancels the
/// poller table through the shared [`Context`].
pub async fn run_rebalance_controller(ctx: Arc<Context>) {
    tracing::info!("Starting controller for KafkaRebalance resources");
    tokio::join!(watch_rebalances(ctx.clone()), sweep_rebalances(ctx));
}

fn rebalance_api(ctx: &Context) -> Api<KafkaRebalance> {
    match ctx.config.watch_namespace.as_deref() {
        Some(ns) => Api::namespaced(ctx.client.clone(), ns),
        None => Api::all(ctx.client.clone()),
    }
}

/// Subscribe to create/update/delete events on rebalance resources.
///
/// Deletes are delivered to the reconciler as `None`. Watch errors are
/// logged and the subscription resumes with backoff; the stream itself
/// never ends.
async fn watch_rebalances(ctx: Arc<Context>) {
    let api = rebalance_api(&ctx);
    let mut config = watcher::Config::default().any_semantic();
    if let Some(selector) = ctx.config.label_selector() {
        config = config.labels(&selector);
    }

    let mut stream = pin!(watcher(api, config).default_backoff());
    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Apply(rebalance)) | Ok(watcher::Event::InitApply(rebalance)) => {
                dispatch(ctx.clone(), resource_key(&rebalance), Some(rebalance));
            }
            Ok(watcher::Event::Delete(rebalance)) => {
                let key = resource_key(&rebalance);
                // Deletion cancels any active poll before the reconcile runs
                ctx.poller.cancel(&key);
                dispatch(ctx.clone(), key, None);
            }
            Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => {}
            Err(e) => {
                tracing::error!("Rebalance watch failed, resubscribing: {}", e);
            }
        }
    }
    tracing::error!("Rebalance watch stream ended unexpectedly");
}

/// Periodically list all matching resources and reconcile them, picking up
/// anything a dropped event or a lock timeout left behind.
async fn sweep_rebalances(ctx: Arc<Context>) {
    let api = rebalance_api(&ctx);
    let mut params = ListParams::default();
    if let Some(selector) = ctx.config.label_selector() {
        params = params.labels(&selector);
    }

    let mut ticker = tokio::time::interval(ctx.config.resync_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick completes immediately

    loop {
        ticker.tick().await;
        match api.list(&params).await {
            Ok(rebalances) => {
                tracing::debug!(count = rebalances.items.len(), "Periodic rebalance sweep");
                for rebalance in rebalances.items {
                    dispatch(ctx.clone(), resource_key(&rebalance), Some(rebalance));
                }
            }
            Err(e) => {
                tracing::warn!("Periodic rebalance sweep failed to list resources: {}", e);
            }
        }
    }
}

/// Run one reconciliation under the per-resource lock.
///
/// Events racing for the same key queue on the lock; a caller that cannot
/// acquire it in time drops its event and leaves the work to the next sweep.
fn dispatch(ctx: Arc<Context>, key: ResourceKey, rebalance: Option<KafkaRebalance>) {
    tokio::spawn(dispatch_one(ctx, key, rebalance));
}

async fn dispatch_one(ctx: Arc<Context>, key: ResourceKey, rebalance: Option<KafkaRebalance>) {
    let _guard = match ctx.locks.acquire(&key).await {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!(%key, "Dropping event: {}", e);
            return;
        }
    };
    reconcile_rebalance(&ctx, &key, rebalance).await;
}

/// Convenience constructor wiring a default context for tests and `main`
pub fn build_context(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<health::HealthState>>,
) -> Arc<Context> {
    Arc::new(Context::new(client, config, health_state))
}
