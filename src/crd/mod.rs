pub mod kafka_cluster;
pub mod kafka_rebalance;

pub use kafka_cluster::{CLUSTER_LABEL, Kafka, KafkaSpec, cruise_control_service_name};
pub use kafka_rebalance::{
    CONDITION_RECONCILIATION_PAUSED, CONDITION_WARNING, Condition, KafkaRebalance,
    KafkaRebalanceSpec, KafkaRebalanceStatus, RebalanceState,
};
