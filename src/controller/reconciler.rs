//! Reconciliation loop for KafkaRebalance resources
//!
//! One invocation per watch event or sweep entry, under the per-resource
//! lock. Errors never escape: every failure is projected into a NotReady
//! status condition. Each successful invocation performs at most one status
//! write; a desired status equal to the stored one (up to condition
//! timestamps) elides the write.

use std::time::Instant;

use kube::ResourceExt;
use kube::runtime::events::EventType;
use tracing::{debug, error, info, instrument};

use crate::controller::annotations::{
    self, is_reconciliation_paused, rebalance_annotation, strip_rebalance_annotation,
};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::lock::ResourceKey;
use crate::controller::state_machine::compute_next_status;
use crate::controller::status::{
    StatusManager, build_paused_condition, current_state, error_status,
};
use crate::controller::validation::validate;
use crate::crd::{CLUSTER_LABEL, KafkaRebalance, KafkaRebalanceStatus};

/// Reconcile one KafkaRebalance; `None` means the resource was deleted.
///
/// The caller holds the per-resource lock for the whole call.
#[instrument(skip(ctx, rebalance), fields(key = %key))]
pub async fn reconcile_rebalance(ctx: &Context, key: &ResourceKey, rebalance: Option<KafkaRebalance>) {
    let started = Instant::now();

    let Some(rebalance) = rebalance else {
        info!("Rebalance resource deleted");
        ctx.poller.cancel(key);
        return;
    };

    match reconcile_inner(ctx, key, &rebalance).await {
        Ok(()) => {
            ctx.record_reconcile(&key.namespace, &key.name, started.elapsed().as_secs_f64());
        }
        Err(err) => {
            error!(error = %err, "Status updated to [NotReady] due to error");
            ctx.record_error(&key.namespace, &key.name);
            let status = error_status(&err, validate(&rebalance));
            if let Err(write_err) = write_status(ctx, key, status).await {
                error!(error = %write_err, "Failed to write NotReady status");
            }
            ctx.publish_event(&rebalance, EventType::Warning, err.reason(), Some(err.to_string()))
                .await;
        }
    }
}

async fn reconcile_inner(ctx: &Context, key: &ResourceKey, rebalance: &KafkaRebalance) -> Result<()> {
    // The cluster binding must be valid before anything talks to the service
    let cluster_name = rebalance
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(CLUSTER_LABEL))
        .cloned()
        .ok_or_else(|| {
            Error::ValidationError(format!(
                "Resource lacks label '{}': no cluster related to a possible rebalance",
                CLUSTER_LABEL
            ))
        })?;

    let kafka = ctx
        .kafkas(&key.namespace)
        .get_opt(&cluster_name)
        .await?
        .ok_or_else(|| {
            Error::NoSuchClusterError(format!(
                "Kafka resource '{}' identified by label '{}' does not exist in namespace {}",
                cluster_name, CLUSTER_LABEL, key.namespace
            ))
        })?;

    if !ctx.config.matches_cluster_selector(&kafka) {
        debug!(
            cluster = %cluster_name,
            "Kafka cluster does not match the operator selector, ignoring"
        );
        return Ok(());
    }

    if !kafka.has_cruise_control() {
        return Err(Error::ValidationError(
            "Kafka resource lacks a 'cruiseControl' declaration: no deployed Cruise Control for doing a rebalance".to_string(),
        ));
    }

    let cc = ctx.cruise_control_client(&cluster_name, &key.namespace)?;
    let api = ctx.rebalances(&key.namespace);

    // The watch event may be stale; the state machine must run against the
    // latest stored resource
    let Some(current) = api.get_opt(&key.name).await? else {
        debug!("Rebalance resource disappeared before reconciliation");
        return Ok(());
    };

    if is_reconciliation_paused(&current) {
        let mut conditions = validate(&current);
        conditions.push(build_paused_condition());
        let status = KafkaRebalanceStatus {
            conditions,
            ..Default::default()
        };
        StatusManager::new(&api).update(&current, status).await?;
        return Ok(());
    }

    let state = current_state(&current)?;
    let annotation = rebalance_annotation(&current);

    let desired = compute_next_status(ctx, &api, &cc, key, &current, state, annotation).await?;

    // A long poll may have held the lock for a while; re-read so the write
    // and the annotation strip act on the freshest copy
    let Some(latest) = api.get_opt(&key.name).await? else {
        debug!("Rebalance resource deleted while reconciling");
        return Ok(());
    };

    if let Some(desired) = desired {
        let written = StatusManager::new(&api).update(&latest, desired.clone()).await?;
        if written {
            if let Some(state) = crate::controller::status::rebalance_state_condition(&desired)
                .ok()
                .flatten()
            {
                info!(state = %state.type_, "State updated");
                ctx.record_state(&state.type_);
                ctx.publish_event(
                    &latest,
                    EventType::Normal,
                    &state.type_,
                    Some(format!("Rebalance state is now {}", state.type_)),
                )
                .await;
            }
        }
    }

    // Consumed annotations come off once the transition is durable; unknown
    // values stay put and keep their Warning condition
    if rebalance_annotation(&latest).is_consumable() {
        debug!(
            annotation = ?annotations::raw_rebalance_annotation(&latest),
            "Removing consumed rebalance annotation"
        );
        strip_rebalance_annotation(&api, &latest).await?;
    }

    Ok(())
}

/// Best-effort status write used on the error path
async fn write_status(ctx: &Context, key: &ResourceKey, status: KafkaRebalanceStatus) -> Result<()> {
    let api = ctx.rebalances(&key.namespace);
    let Some(latest) = api.get_opt(&key.name).await? else {
        return Ok(());
    };
    StatusManager::new(&api).update(&latest, status).await?;
    Ok(())
}

/// Resource identity of a rebalance observed by the watch
pub fn resource_key(rebalance: &KafkaRebalance) -> ResourceKey {
    ResourceKey::new(rebalance.namespace().unwrap_or_default(), rebalance.name_any())
}
