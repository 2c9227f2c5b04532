//! Test fixtures and builders for KafkaRebalance resources
//!
//! # Quick Start
//!
//! For simple tests, use the convenience functions:
//! ```rust,ignore
//! let rebalance = create_test_rebalance("my-rebalance", "default");
//! ```
//!
//! For more complex configurations, use the builder pattern:
//! ```rust,ignore
//! let rebalance = KafkaRebalanceBuilder::new("my-rebalance", "default")
//!     .with_annotation("strimzi.io/rebalance", "approve")
//!     .with_state(RebalanceState::ProposalReady, Some("t-1"))
//!     .build();
//! ```

use std::collections::BTreeMap;

use kafka_rebalance_operator::controller::status::{
    build_rebalance_condition, build_warning_condition,
};
use kafka_rebalance_operator::crd::{
    CLUSTER_LABEL, KafkaRebalance, KafkaRebalanceSpec, KafkaRebalanceStatus, RebalanceState,
};

/// A rebalance bound to cluster `c1` with an empty spec
pub fn create_test_rebalance(name: &str, namespace: &str) -> KafkaRebalance {
    KafkaRebalanceBuilder::new(name, namespace).build()
}

/// A small but realistic optimization proposal summary
pub fn sample_summary() -> BTreeMap<String, serde_json::Value> {
    let mut summary = BTreeMap::new();
    summary.insert("numReplicaMovements".to_string(), serde_json::json!(24));
    summary.insert("numLeaderMovements".to_string(), serde_json::json!(8));
    summary.insert(
        "dataToMoveMB".to_string(),
        serde_json::json!(1024),
    );
    summary.insert("recentWindows".to_string(), serde_json::json!(5));
    summary
}

/// A status carrying the given state condition and session id
pub fn state_status(state: RebalanceState, session: Option<&str>) -> KafkaRebalanceStatus {
    KafkaRebalanceStatus {
        conditions: vec![build_rebalance_condition(state)],
        session_id: session.map(str::to_string),
        optimization_result: None,
        observed_generation: Some(1),
    }
}

/// Builder for KafkaRebalance test resources
pub struct KafkaRebalanceBuilder {
    name: String,
    namespace: String,
    cluster_label: Option<String>,
    annotations: BTreeMap<String, String>,
    spec: KafkaRebalanceSpec,
    status: Option<KafkaRebalanceStatus>,
    generation: Option<i64>,
}

impl KafkaRebalanceBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            cluster_label: Some("c1".to_string()),
            annotations: BTreeMap::new(),
            spec: KafkaRebalanceSpec::default(),
            status: None,
            generation: Some(1),
        }
    }

    pub fn without_cluster_label(mut self) -> Self {
        self.cluster_label = None;
        self
    }

    pub fn with_cluster(mut self, cluster: &str) -> Self {
        self.cluster_label = Some(cluster.to_string());
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_spec(mut self, spec: KafkaRebalanceSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_state(mut self, state: RebalanceState, session: Option<&str>) -> Self {
        self.status = Some(state_status(state, session));
        self
    }

    pub fn with_status(mut self, status: KafkaRebalanceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_warning(mut self, reason: &str, message: &str) -> Self {
        let status = self.status.get_or_insert_default();
        status.conditions.push(build_warning_condition(reason, message));
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn build(self) -> KafkaRebalance {
        let mut rebalance = KafkaRebalance::new(&self.name, self.spec);
        rebalance.metadata.namespace = Some(self.namespace);
        rebalance.metadata.generation = self.generation;
        if let Some(cluster) = self.cluster_label {
            rebalance
                .metadata
                .labels
                .get_or_insert_default()
                .insert(CLUSTER_LABEL.to_string(), cluster);
        }
        if !self.annotations.is_empty() {
            rebalance.metadata.annotations = Some(self.annotations);
        }
        rebalance.status = self.status;
        rebalance
    }
}
