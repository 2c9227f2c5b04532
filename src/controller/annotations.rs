//! The annotation protocol on KafkaRebalance resources
//!
//! Users drive state transitions through a single control annotation; a
//! second annotation pauses reconciliation entirely. Consumed annotation
//! values are stripped after the status write they triggered; unrecognized
//! values are left in place and reported as a Warning condition.

use kube::ResourceExt;
use kube::api::{Patch, PatchParams};
use kube::Api;

use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::Result;
use crate::crd::KafkaRebalance;

/// Control annotation driving the state machine
pub const REBALANCE_ANNOTATION: &str = "strimzi.io/rebalance";

/// Annotation pausing reconciliation of the resource
pub const PAUSE_RECONCILIATION_ANNOTATION: &str = "strimzi.io/pause-reconciliation";

/// Decoded value of the control annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceAnnotation {
    /// No annotation set
    None,
    /// Approve the ready proposal and execute the rebalance
    Approve,
    /// Request a fresh proposal
    Refresh,
    /// Stop an in-flight proposal computation or rebalance
    Stop,
    /// The annotation is set to something this operator does not recognize
    Unknown,
}

impl RebalanceAnnotation {
    /// Whether a transition acting on this value consumes it
    pub fn is_consumable(&self) -> bool {
        matches!(
            self,
            RebalanceAnnotation::Approve | RebalanceAnnotation::Refresh | RebalanceAnnotation::Stop
        )
    }
}

/// Raw value of the control annotation, if present
pub fn raw_rebalance_annotation(rebalance: &KafkaRebalance) -> Option<&str> {
    rebalance
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(REBALANCE_ANNOTATION))
        .map(String::as_str)
}

/// Decode the control annotation on the resource
pub fn rebalance_annotation(rebalance: &KafkaRebalance) -> RebalanceAnnotation {
    decode(raw_rebalance_annotation(rebalance))
}

/// Map a raw annotation value to the control alphabet
pub fn decode(raw: Option<&str>) -> RebalanceAnnotation {
    match raw {
        None => RebalanceAnnotation::None,
        Some("approve") => RebalanceAnnotation::Approve,
        Some("refresh") => RebalanceAnnotation::Refresh,
        Some("stop") => RebalanceAnnotation::Stop,
        Some(_) => RebalanceAnnotation::Unknown,
    }
}

/// Whether the resource carries the pause annotation with value "true"
pub fn is_reconciliation_paused(rebalance: &KafkaRebalance) -> bool {
    rebalance
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(PAUSE_RECONCILIATION_ANNOTATION))
        .is_some_and(|value| value == "true")
}

/// Remove the control annotation from the resource's metadata.
///
/// Called after the status write that acted on the annotation. Not atomic
/// with the write: a crash in between leaves the annotation present, and the
/// idempotent transition table makes the next reconciliation re-strip it.
pub async fn strip_rebalance_annotation(
    api: &Api<KafkaRebalance>,
    rebalance: &KafkaRebalance,
) -> Result<()> {
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                REBALANCE_ANNOTATION: null
            }
        }
    });
    api.patch(
        &rebalance.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}
