use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use kafka_rebalance_operator::health::{HealthState, run_health_server};
use kafka_rebalance_operator::{Context, OperatorConfig, build_context, run_rebalance_controller};

const LEASE_NAME: &str = "kafka-rebalance-operator-leader";
const LEASE_TTL: Duration = Duration::from_secs(15);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// How long in-flight reconciliations get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    info!("Starting kafka-rebalance-operator");

    let config = OperatorConfig::from_env().map_err(std::io::Error::other)?;
    let client = Client::try_default().await?;
    info!("Connected to the Kubernetes API");

    let health_state = Arc::new(HealthState::new());
    let probes = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Probe server failed: {}", e);
            }
        })
    };

    // Only the leaseholder reconciles; standby replicas keep serving probes
    let (holder_id, lease_namespace) = pod_identity();
    let lease = lease_lock(&client, &lease_namespace, &holder_id);
    wait_for_leadership(&lease).await;
    let renewal = spawn_lease_renewal(lease_lock(&client, &lease_namespace, &holder_id));

    info!("Watching KafkaRebalance resources (apiVersion: kafka.strimzi.io/v1beta2)");
    let ctx = build_context(client, config, Some(health_state.clone()));
    health_state.set_ready(true);

    let controller = {
        let ctx = ctx.clone();
        tokio::spawn(run_rebalance_controller(ctx))
    };

    tokio::select! {
        result = controller => {
            if let Err(e) = result {
                error!("Rebalance controller panicked: {}", e);
            }
        }
        result = probes => {
            if let Err(e) = result {
                error!("Probe server panicked: {}", e);
            }
        }
        // Renewal only returns by panicking; losing the lease exits the
        // process so Kubernetes restarts us into a fresh election
        Err(e) = renewal => {
            error!("Lease renewal panicked: {}", e);
        }
        _ = shutdown_signal() => {
            graceful_shutdown(&health_state, &ctx).await;
        }
    }

    info!("Operator stopped");
    Ok(())
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kafka_rebalance_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .init();
    Ok(())
}

/// Identity used for the leader lease: the pod name and namespace, falling
/// back to the hostname outside a cluster
fn pod_identity() -> (String, String) {
    let holder = std::env::var("POD_NAME").unwrap_or_else(|_| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| {
        warn!("POD_NAMESPACE not set, using 'default'");
        "default".to_string()
    });
    (holder, namespace)
}

fn lease_lock(client: &Client, namespace: &str, holder_id: &str) -> LeaseLock {
    LeaseLock::new(
        client.clone(),
        namespace,
        LeaseLockParams {
            holder_id: holder_id.to_string(),
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: LEASE_TTL,
        },
    )
}

/// Block until this replica holds the leader lease
async fn wait_for_leadership(lease: &LeaseLock) {
    info!(lease = LEASE_NAME, "Waiting to acquire leadership");
    loop {
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {
                info!("Acquired leadership");
                return;
            }
            Ok(_) => info!("Another replica holds the lease, waiting"),
            Err(e) => warn!("Lease acquisition failed: {}, retrying", e),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Keep renewing the lease; exit the process if it is ever lost
fn spawn_lease_renewal(lease: LeaseLock) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
            match lease.try_acquire_or_renew().await {
                Ok(result) if result.acquired_lease => {}
                Ok(_) => {
                    error!("Lost leadership, exiting");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!("Lease renewal failed: {}, exiting", e);
                    std::process::exit(1);
                }
            }
        }
    })
}

async fn graceful_shutdown(health_state: &HealthState, ctx: &Arc<Context>) {
    info!("Received shutdown signal, draining");
    health_state.set_ready(false);
    ctx.poller.shutdown();
    info!(
        "Waiting {}s for in-flight reconciliations to finish",
        SHUTDOWN_GRACE.as_secs()
    );
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}

/// Resolves on SIGTERM or SIGINT
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
