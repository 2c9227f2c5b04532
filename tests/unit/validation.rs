//! Tests for validation warnings

use kafka_rebalance_operator::controller::annotations::REBALANCE_ANNOTATION;
use kafka_rebalance_operator::controller::validation::validate;
use kafka_rebalance_operator::crd::KafkaRebalanceSpec;

use crate::common::KafkaRebalanceBuilder;

fn spec(value: serde_json::Value) -> KafkaRebalanceSpec {
    serde_json::from_value(value).unwrap()
}

#[test]
fn well_formed_resource_has_no_warnings() {
    let rebalance = KafkaRebalanceBuilder::new("r", "ns")
        .with_spec(spec(serde_json::json!({
            "goals": ["RackAwareGoal"],
            "excludedTopics": "kafka-internal-.*",
            "concurrentLeaderMovements": 2
        })))
        .build();
    assert!(validate(&rebalance).is_empty());
}

#[test]
fn warnings_accumulate_across_sources() {
    let rebalance = KafkaRebalanceBuilder::new("r", "ns")
        .with_spec(spec(serde_json::json!({
            "excludedTopics": "(",
            "rebalanceDisk": true
        })))
        .with_annotation(REBALANCE_ANNOTATION, "pause")
        .build();

    let warnings = validate(&rebalance);
    assert_eq!(warnings.len(), 3);
    assert!(warnings.iter().all(|w| w.type_ == "Warning" && w.status == "True"));

    let reasons: Vec<&str> = warnings.iter().map(|w| w.reason.as_str()).collect();
    assert!(reasons.contains(&"UnknownFields"));
    assert!(reasons.contains(&"InvalidExcludedTopics"));
    assert!(reasons.contains(&"InvalidAnnotation"));
}

#[test]
fn known_annotation_values_do_not_warn() {
    for value in ["approve", "refresh", "stop"] {
        let rebalance = KafkaRebalanceBuilder::new("r", "ns")
            .with_annotation(REBALANCE_ANNOTATION, value)
            .build();
        assert!(validate(&rebalance).is_empty(), "{} should not warn", value);
    }
}

#[test]
fn validation_is_deterministic() {
    let rebalance = KafkaRebalanceBuilder::new("r", "ns")
        .with_spec(spec(serde_json::json!({ "mode": "full" })))
        .build();
    let first = validate(&rebalance);
    let second = validate(&rebalance);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.reason, b.reason);
        assert_eq!(a.message, b.message);
    }
}
