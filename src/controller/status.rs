//! Status construction and diffing for KafkaRebalance resources
//!
//! The status subresource is the state machine's only persistence: every
//! reconciliation derives the current state from the condition list and
//! writes at most one new status. Writes are elided when the desired status
//! differs from the stored one only by condition timestamps.

use std::collections::BTreeMap;

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};

use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::{Error, Result};
use crate::crd::{
    CONDITION_RECONCILIATION_PAUSED, Condition, KafkaRebalance, KafkaRebalanceStatus,
    RebalanceState,
};

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Build the single state condition for `state`
pub fn build_rebalance_condition(state: RebalanceState) -> Condition {
    Condition {
        type_: state.to_string(),
        status: condition_status::TRUE.to_string(),
        reason: String::new(),
        message: String::new(),
        last_transition_time: Utc::now().to_rfc3339(),
    }
}

/// Build a Warning condition with the given reason and message
pub fn build_warning_condition(reason: &str, message: &str) -> Condition {
    Condition {
        type_: crate::crd::CONDITION_WARNING.to_string(),
        status: condition_status::TRUE.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: Utc::now().to_rfc3339(),
    }
}

/// Build the condition marking a paused resource
pub fn build_paused_condition() -> Condition {
    Condition {
        type_: CONDITION_RECONCILIATION_PAUSED.to_string(),
        status: condition_status::TRUE.to_string(),
        reason: "ReconciliationPaused".to_string(),
        message: "Reconciliation is paused".to_string(),
        last_transition_time: Utc::now().to_rfc3339(),
    }
}

/// Build a status carrying a state condition, the session id correlating
/// with the external service, and optionally the optimization proposal
pub fn build_rebalance_status(
    session_id: Option<String>,
    state: RebalanceState,
    optimization_result: Option<BTreeMap<String, serde_json::Value>>,
    warnings: Vec<Condition>,
) -> KafkaRebalanceStatus {
    let mut conditions = vec![build_rebalance_condition(state)];
    conditions.extend(warnings);
    KafkaRebalanceStatus {
        conditions,
        session_id,
        optimization_result,
        observed_generation: None,
    }
}

/// Rebuild the stored status with fresh warnings, keeping the state
/// condition, session id and optimization result as they are
pub fn carry_over_status(
    current: &KafkaRebalanceStatus,
    warnings: Vec<Condition>,
) -> Result<KafkaRebalanceStatus> {
    let state_condition = rebalance_state_condition(current)?
        .cloned()
        .ok_or_else(|| Error::InternalError("status has no state condition to carry over".into()))?;

    let mut conditions = vec![state_condition];
    conditions.extend(warnings);
    Ok(KafkaRebalanceStatus {
        conditions,
        session_id: current.session_id.clone(),
        optimization_result: current.optimization_result.clone(),
        observed_generation: current.observed_generation,
    })
}

/// Build the NotReady status for a Cruise Control task that completed with
/// an error.
///
/// The service exposes no error detail through the task endpoint, so the
/// session id is kept in the status and named in the message to let
/// operators diagnose against the service directly.
pub fn build_failed_task_status(
    session_id: &str,
    optimization_result: Option<BTreeMap<String, serde_json::Value>>,
    warnings: Vec<Condition>,
) -> KafkaRebalanceStatus {
    let mut conditions = vec![Condition {
        type_: RebalanceState::NotReady.to_string(),
        status: condition_status::TRUE.to_string(),
        reason: "RebalanceTaskFailed".to_string(),
        message: format!(
            "Cruise Control task {} completed with error; check the Cruise Control logs for details",
            session_id
        ),
        last_transition_time: Utc::now().to_rfc3339(),
    }];
    conditions.extend(warnings);
    KafkaRebalanceStatus {
        conditions,
        session_id: Some(session_id.to_string()),
        optimization_result,
        observed_generation: None,
    }
}

/// Build the status projected from a reconciliation error
pub fn error_status(error: &Error, warnings: Vec<Condition>) -> KafkaRebalanceStatus {
    let mut conditions = vec![Condition {
        type_: RebalanceState::NotReady.to_string(),
        status: condition_status::TRUE.to_string(),
        reason: error.reason().to_string(),
        message: error.to_string(),
        last_transition_time: Utc::now().to_rfc3339(),
    }];
    conditions.extend(warnings);
    KafkaRebalanceStatus {
        conditions,
        ..Default::default()
    }
}

/// Find the condition whose type is a state name.
///
/// More than one is a broken invariant and reported as an internal error;
/// none is a legal first observation.
pub fn rebalance_state_condition(status: &KafkaRebalanceStatus) -> Result<Option<&Condition>> {
    let mut state_conditions = status
        .conditions
        .iter()
        .filter(|c| c.type_.parse::<RebalanceState>().is_ok());

    let first = state_conditions.next();
    if state_conditions.next().is_some() {
        return Err(Error::InternalError(
            "Multiple rebalance state conditions were present in the KafkaRebalance status".into(),
        ));
    }
    Ok(first)
}

/// Derive the current state of the machine from the resource's status.
///
/// No status, no state condition, or a ReconciliationPaused condition all
/// mean the machine starts over from New.
pub fn current_state(rebalance: &KafkaRebalance) -> Result<RebalanceState> {
    let Some(status) = rebalance.status.as_ref() else {
        return Ok(RebalanceState::New);
    };
    if status
        .conditions
        .iter()
        .any(|c| c.type_ == CONDITION_RECONCILIATION_PAUSED)
    {
        return Ok(RebalanceState::New);
    }
    match rebalance_state_condition(status)? {
        Some(condition) => condition
            .type_
            .parse::<RebalanceState>()
            .map_err(|()| Error::InternalError(format!("unexpected state {}", condition.type_))),
        None => Ok(RebalanceState::New),
    }
}

/// Whether `desired` differs from `current` in anything but condition
/// timestamps
pub fn status_diff_is_empty(
    current: Option<&KafkaRebalanceStatus>,
    desired: &KafkaRebalanceStatus,
) -> bool {
    match current {
        Some(current) => normalize(current) == normalize(desired),
        None => false,
    }
}

fn normalize(status: &KafkaRebalanceStatus) -> serde_json::Value {
    let mut value = serde_json::to_value(status).unwrap_or(serde_json::Value::Null);
    if let Some(conditions) = value.get_mut("conditions").and_then(|c| c.as_array_mut()) {
        for condition in conditions.iter_mut() {
            if let Some(map) = condition.as_object_mut() {
                map.remove("lastTransitionTime");
            }
        }
        conditions.sort_by_key(|c| {
            (
                c.get("type").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
                c.get("reason").and_then(|r| r.as_str()).unwrap_or_default().to_string(),
            )
        });
    }
    value
}

/// Writes KafkaRebalance statuses, eliding no-op updates
pub struct StatusManager<'a> {
    api: &'a Api<KafkaRebalance>,
}

impl<'a> StatusManager<'a> {
    pub fn new(api: &'a Api<KafkaRebalance>) -> Self {
        Self { api }
    }

    /// Write `desired` to the status subresource of `rebalance`.
    ///
    /// Stamps the observed generation, keeps condition transition times
    /// stable where type and status did not change, and skips the write when
    /// the result equals the stored status. Returns whether a write
    /// happened.
    pub async fn update(
        &self,
        rebalance: &KafkaRebalance,
        mut desired: KafkaRebalanceStatus,
    ) -> Result<bool> {
        desired.observed_generation = rebalance.metadata.generation;

        if let Some(current) = rebalance.status.as_ref() {
            preserve_transition_times(current, &mut desired);
        }

        if status_diff_is_empty(rebalance.status.as_ref(), &desired) {
            return Ok(false);
        }

        let patch = serde_json::json!({ "status": desired });
        self.api
            .patch_status(
                &rebalance.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(true)
    }
}

/// Keep the stored transition time for conditions whose type and status are
/// unchanged
fn preserve_transition_times(current: &KafkaRebalanceStatus, desired: &mut KafkaRebalanceStatus) {
    for condition in desired.conditions.iter_mut() {
        if let Some(existing) = current
            .conditions
            .iter()
            .find(|c| c.type_ == condition.type_ && c.status == condition.status)
        {
            condition.last_transition_time = existing.last_transition_time.clone();
        }
    }
}
