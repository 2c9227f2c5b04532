use std::collections::BTreeMap;
use std::str::FromStr;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// KafkaRebalance is the Schema for the kafkarebalances API
///
/// A user creates one of these to request a partition rebalance of the Kafka
/// cluster named by the `strimzi.io/cluster` label. The operator drives the
/// resource through a state machine reflected in `status.conditions` and
/// reacts to the `strimzi.io/rebalance` annotation.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "kafka.strimzi.io",
    version = "v1beta2",
    kind = "KafkaRebalance",
    plural = "kafkarebalances",
    shortname = "kr",
    namespaced,
    status = "KafkaRebalanceStatus",
    printcolumn = r#"{"name":"Cluster", "type":"string", "jsonPath":".metadata.labels.strimzi\\.io/cluster"}"#,
    printcolumn = r#"{"name":"Session", "type":"string", "jsonPath":".status.sessionId"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaRebalanceSpec {
    /// Ordered list of optimization goal class names to use, overriding the
    /// server-side defaults. The order expresses goal priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<String>>,

    /// Skip the check that the provided goals cover all configured hard goals
    #[serde(default)]
    pub skip_hard_goal_check: bool,

    /// Regular expression matching topics excluded from the rebalance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_topics: Option<String>,

    /// Upper bound of ongoing partition replica movements per broker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_partition_movements_per_broker: Option<i32>,

    /// Upper bound of ongoing intra-broker disk movements per broker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_intra_broker_partition_movements: Option<i32>,

    /// Upper bound of ongoing partition leadership movements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_leader_movements: Option<i32>,

    /// Replication bandwidth cap in bytes per second while moving replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_throttle: Option<i64>,

    /// Replica movement strategy class names, in order of preference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_movement_strategies: Option<Vec<String>>,

    /// Fields this operator version does not recognize. Kept so newer specs
    /// round-trip, and reported as Warning conditions.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unknown_fields: BTreeMap<String, serde_json::Value>,
}

/// Status of a KafkaRebalance: the only durable state of the rebalance
/// state machine. Exactly one condition carries a [`RebalanceState`] type.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KafkaRebalanceStatus {
    /// Kubernetes-style conditions: one state condition plus any warnings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// User task id correlating polls with an in-flight Cruise Control task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// The optimization proposal summary as returned by Cruise Control
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_result: Option<BTreeMap<String, serde_json::Value>>,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition: a state name, "ReconciliationPaused" or "Warning"
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,
}

/// Condition type marking a paused resource
pub const CONDITION_RECONCILIATION_PAUSED: &str = "ReconciliationPaused";

/// Condition type for validation warnings
pub const CONDITION_WARNING: &str = "Warning";

/// State of the rebalance flow, persisted as the type of the single state
/// condition in `status.conditions`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RebalanceState {
    /// No recognized state condition yet; first observation
    New,
    /// A dry-run proposal was requested and Cruise Control is computing it
    PendingProposal,
    /// A proposal is in the status awaiting user approval
    ProposalReady,
    /// A full (non-dry-run) rebalance is in progress
    Rebalancing,
    /// The rebalance finished successfully
    Ready,
    /// The proposal or rebalance was cancelled by user request
    Stopped,
    /// The last reconciliation failed; waits for a refresh or a fix
    NotReady,
}

impl RebalanceState {
    /// All states, in flow order
    pub const ALL: [RebalanceState; 7] = [
        RebalanceState::New,
        RebalanceState::PendingProposal,
        RebalanceState::ProposalReady,
        RebalanceState::Rebalancing,
        RebalanceState::Ready,
        RebalanceState::Stopped,
        RebalanceState::NotReady,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceState::New => "New",
            RebalanceState::PendingProposal => "PendingProposal",
            RebalanceState::ProposalReady => "ProposalReady",
            RebalanceState::Rebalancing => "Rebalancing",
            RebalanceState::Ready => "Ready",
            RebalanceState::Stopped => "Stopped",
            RebalanceState::NotReady => "NotReady",
        }
    }
}

impl std::fmt::Display for RebalanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebalanceState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RebalanceState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or(())
    }
}
