//! Shared context for the KafkaRebalance controller

use std::sync::Arc;

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource};

use crate::config::OperatorConfig;
use crate::controller::lock::LockRegistry;
use crate::controller::poller::PollController;
use crate::crd::{Kafka, KafkaRebalance};
use crate::cruise_control::CruiseControlClient;
use crate::health::HealthState;

/// Field manager name for the operator
pub(crate) const FIELD_MANAGER: &str = "kafka-rebalance-operator";

/// Shared state for the controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Operator configuration
    pub config: OperatorConfig,
    /// Per-resource locks serializing reconciliations
    pub locks: LockRegistry,
    /// Per-resource polling timers
    pub poller: PollController,
    /// Event reporter identity
    reporter: Reporter,
    /// Health state for metrics (optional for tests)
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a new context with the given Kubernetes client
    pub fn new(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        let locks = LockRegistry::new(config.lock_timeout);
        let poller = PollController::new(config.polling_interval);
        Self {
            client,
            config,
            locks,
            poller,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
            health_state,
        }
    }

    /// Api handle for KafkaRebalance resources in a namespace
    pub fn rebalances(&self, namespace: &str) -> Api<KafkaRebalance> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Api handle for Kafka cluster resources in a namespace
    pub fn kafkas(&self, namespace: &str) -> Api<Kafka> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Cruise Control client for the named Kafka cluster
    pub fn cruise_control_client(
        &self,
        cluster_name: &str,
        namespace: &str,
    ) -> crate::cruise_control::client::Result<CruiseControlClient> {
        CruiseControlClient::for_cluster(
            cluster_name,
            namespace,
            self.config.cruise_control_port,
            self.config.api_timeout,
        )
    }

    /// Record a successful reconciliation in metrics
    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        if let Some(ref state) = self.health_state {
            state
                .metrics
                .observe_reconcile(namespace, name, duration_secs);
        }
    }

    /// Record a failed reconciliation in metrics
    pub fn record_error(&self, namespace: &str, name: &str) {
        if let Some(ref state) = self.health_state {
            state.metrics.observe_failure(namespace, name);
        }
    }

    /// Record the state a resource ended the reconciliation in
    pub fn record_state(&self, state: &str) {
        if let Some(ref health) = self.health_state {
            health.metrics.observe_state(state);
        }
    }

    /// Publish a Kubernetes event for a rebalance resource.
    ///
    /// Event delivery is best-effort; a failed publish is logged and
    /// swallowed so it can never fail a reconciliation.
    pub async fn publish_event(
        &self,
        rebalance: &KafkaRebalance,
        type_: EventType,
        reason: &str,
        note: Option<String>,
    ) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone());
        let event = Event {
            type_,
            reason: reason.into(),
            note,
            action: "Reconcile".into(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(&event, &rebalance.object_ref(&())).await {
            tracing::warn!(reason, "Failed to publish event: {}", e);
        }
    }
}
