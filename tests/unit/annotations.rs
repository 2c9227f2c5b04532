//! Tests for the annotation protocol

use kafka_rebalance_operator::controller::annotations::{
    PAUSE_RECONCILIATION_ANNOTATION, REBALANCE_ANNOTATION, RebalanceAnnotation,
    is_reconciliation_paused, rebalance_annotation,
};

use crate::common::KafkaRebalanceBuilder;

#[test]
fn absent_annotation_decodes_to_none() {
    let rebalance = KafkaRebalanceBuilder::new("r", "ns").build();
    assert_eq!(rebalance_annotation(&rebalance), RebalanceAnnotation::None);
}

#[test]
fn control_values_decode() {
    for (raw, expected) in [
        ("approve", RebalanceAnnotation::Approve),
        ("refresh", RebalanceAnnotation::Refresh),
        ("stop", RebalanceAnnotation::Stop),
    ] {
        let rebalance = KafkaRebalanceBuilder::new("r", "ns")
            .with_annotation(REBALANCE_ANNOTATION, raw)
            .build();
        assert_eq!(rebalance_annotation(&rebalance), expected);
    }
}

#[test]
fn unrecognized_values_decode_to_unknown() {
    let rebalance = KafkaRebalanceBuilder::new("r", "ns")
        .with_annotation(REBALANCE_ANNOTATION, "go-faster")
        .build();
    assert_eq!(rebalance_annotation(&rebalance), RebalanceAnnotation::Unknown);
}

#[test]
fn other_annotations_are_ignored() {
    let rebalance = KafkaRebalanceBuilder::new("r", "ns")
        .with_annotation("example.com/owner", "data-team")
        .build();
    assert_eq!(rebalance_annotation(&rebalance), RebalanceAnnotation::None);
}

#[test]
fn pause_requires_the_literal_true() {
    let paused = KafkaRebalanceBuilder::new("r", "ns")
        .with_annotation(PAUSE_RECONCILIATION_ANNOTATION, "true")
        .build();
    assert!(is_reconciliation_paused(&paused));

    let not_paused = KafkaRebalanceBuilder::new("r", "ns")
        .with_annotation(PAUSE_RECONCILIATION_ANNOTATION, "yes")
        .build();
    assert!(!is_reconciliation_paused(&not_paused));

    let unset = KafkaRebalanceBuilder::new("r", "ns").build();
    assert!(!is_reconciliation_paused(&unset));
}
