//! Validation warnings for KafkaRebalance resources
//!
//! Warnings never block a transition. They are recomputed before every step
//! and appended to whatever conditions the step produces, so a resource with
//! a suspect spec still shows its state plus the outstanding notices.

use crate::controller::annotations::{RebalanceAnnotation, raw_rebalance_annotation, rebalance_annotation};
use crate::controller::status::build_warning_condition;
use crate::crd::{Condition, KafkaRebalance};

/// Compute the warning conditions for a resource.
///
/// Covers fields this operator version does not recognize, an excluded-topics
/// pattern that is not a valid regex, and a control annotation value outside
/// the known alphabet (which is kept on the resource, not stripped).
pub fn validate(rebalance: &KafkaRebalance) -> Vec<Condition> {
    let mut warnings = Vec::new();

    for field in rebalance.spec.unknown_fields.keys() {
        warnings.push(build_warning_condition(
            "UnknownFields",
            &format!("Contains object at path spec.{} with an unknown property", field),
        ));
    }

    if let Some(pattern) = &rebalance.spec.excluded_topics {
        if let Err(e) = regex::Regex::new(pattern) {
            warnings.push(build_warning_condition(
                "InvalidExcludedTopics",
                &format!("excludedTopics is not a valid regular expression: {}", e),
            ));
        }
    }

    if rebalance_annotation(rebalance) == RebalanceAnnotation::Unknown {
        let raw = raw_rebalance_annotation(rebalance).unwrap_or_default();
        warnings.push(build_warning_condition(
            "InvalidAnnotation",
            &format!(
                "Wrong annotation value: {}={}; valid values are approve, refresh and stop",
                crate::controller::annotations::REBALANCE_ANNOTATION,
                raw
            ),
        ));
    }

    warnings
}
