use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Label binding a KafkaRebalance to the Kafka cluster it targets
pub const CLUSTER_LABEL: &str = "strimzi.io/cluster";

/// Kafka is the cluster resource a KafkaRebalance points at via the
/// `strimzi.io/cluster` label.
///
/// This operator only consumes it: the resource must exist in the same
/// namespace and declare `spec.cruiseControl` before a rebalance can run.
/// Everything else in the spec is managed elsewhere and carried opaquely.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug)]
#[kube(
    group = "kafka.strimzi.io",
    version = "v1beta2",
    kind = "Kafka",
    plural = "kafkas",
    shortname = "k",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaSpec {
    /// Cruise Control deployment declaration; its presence gates rebalancing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cruise_control: Option<CruiseControlSpec>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// The subset of the Cruise Control declaration this operator reads
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CruiseControlSpec {
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl Kafka {
    /// Whether the cluster declares a Cruise Control deployment
    pub fn has_cruise_control(&self) -> bool {
        self.spec.cruise_control.is_some()
    }
}

/// In-cluster DNS name of the Cruise Control service for the named cluster
pub fn cruise_control_service_name(cluster_name: &str, namespace: &str) -> String {
    format!("{}-cruise-control.{}.svc", cluster_name, namespace)
}
