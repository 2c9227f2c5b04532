//! The rebalance state machine
//!
//! Given the current state (derived from the status), the control annotation
//! and the resource spec, compute the next desired status, issuing Cruise
//! Control requests and polling as needed. Waiting states (PendingProposal,
//! Rebalancing) are driven by a per-resource timer that re-reads the
//! resource on every tick, so user actions taken mid-flight (stop, deletion)
//! are observed before the next request goes out.
//!
//! Transition table, with `⊥` meaning "no status change":
//!
//! | State \ Annotation | none            | approve      | refresh      | stop         | unknown |
//! |--------------------|-----------------|--------------|--------------|--------------|---------|
//! | New                | dry-run request | as none      | as none      | ⊥            | as none |
//! | PendingProposal    | poll proposal   | ⊥            | ⊥            | → Stopped    | ⊥       |
//! | ProposalReady      | ⊥               | full request | dry-run req. | ⊥            | ⊥       |
//! | Rebalancing        | poll task       | ⊥            | ⊥            | stop+Stopped | ⊥       |
//! | Stopped            | ⊥               | ⊥            | dry-run req. | ⊥            | ⊥       |
//! | Ready              | ⊥               | ⊥            | dry-run req. | ⊥            | ⊥       |
//! | NotReady           | ⊥               | ⊥            | dry-run req. | ⊥            | ⊥       |

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use kube::Api;
use tracing::{debug, info, warn};

use crate::controller::annotations::{RebalanceAnnotation, rebalance_annotation};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::lock::ResourceKey;
use crate::controller::poller::{MAX_API_RETRIES, PollEnd};
use crate::controller::status::{
    build_failed_task_status, build_rebalance_status, carry_over_status, current_state,
};
use crate::controller::validation::validate;
use crate::crd::{Condition, KafkaRebalance, KafkaRebalanceStatus, RebalanceState};
use crate::cruise_control::{CruiseControlClient, ProposalOutcome, RebalanceOptions, UserTaskState, UserTaskStatus};

/// Compute the next desired status for a resource.
///
/// `Ok(None)` means the stored status stays as it is. The per-resource lock
/// is held by the caller for the whole computation, including any polling.
pub async fn compute_next_status(
    ctx: &Context,
    api: &Api<KafkaRebalance>,
    cc: &CruiseControlClient,
    key: &ResourceKey,
    rebalance: &KafkaRebalance,
    state: RebalanceState,
    annotation: RebalanceAnnotation,
) -> Result<Option<KafkaRebalanceStatus>> {
    info!(%key, %state, ?annotation, "Rebalance action");
    match state {
        RebalanceState::New => on_new(cc, rebalance, annotation).await,
        RebalanceState::PendingProposal => {
            on_pending_proposal(ctx, api, cc, key, rebalance, annotation).await
        }
        RebalanceState::ProposalReady => on_proposal_ready(cc, rebalance, annotation).await,
        RebalanceState::Rebalancing => {
            on_rebalancing(ctx, api, cc, key, rebalance, annotation).await
        }
        RebalanceState::Stopped => on_stopped(cc, rebalance, annotation).await,
        RebalanceState::Ready => on_ready(cc, rebalance, annotation).await,
        RebalanceState::NotReady => on_not_ready(cc, rebalance, annotation).await,
    }
}

/// Map a `/rebalance` outcome to the status it produces, for both the
/// dry-run and the full-run request.
pub fn proposal_status(
    outcome: ProposalOutcome,
    dry_run: bool,
    warnings: Vec<Condition>,
) -> KafkaRebalanceStatus {
    match outcome {
        // Not enough metric windows yet: re-request later, without a task id
        ProposalOutcome::NotEnoughData => {
            build_rebalance_status(None, RebalanceState::PendingProposal, None, warnings)
        }
        ProposalOutcome::StillCalculating { user_task_id } => {
            if dry_run {
                build_rebalance_status(
                    Some(user_task_id),
                    RebalanceState::PendingProposal,
                    None,
                    warnings,
                )
            } else {
                // The rebalance starts as soon as the proposal is done; the
                // summary is merged in by a later task-status poll
                build_rebalance_status(
                    Some(user_task_id),
                    RebalanceState::Rebalancing,
                    None,
                    warnings,
                )
            }
        }
        ProposalOutcome::Ready {
            user_task_id,
            summary,
        } => {
            let next = if dry_run {
                RebalanceState::ProposalReady
            } else {
                RebalanceState::Rebalancing
            };
            build_rebalance_status(user_task_id, next, Some(summary), warnings)
        }
    }
}

/// What a task-status response means for the Rebalancing poll
#[derive(Debug, Clone, PartialEq)]
pub enum TaskDecision {
    /// The task is progressing; poll again next tick
    KeepPolling,
    /// The execution summary became available and the status lacks it;
    /// stop the timer so the merge is written out
    MergeProposal(BTreeMap<String, serde_json::Value>),
    /// The rebalance finished
    Finished(Option<BTreeMap<String, serde_json::Value>>),
    /// The task failed on the service side
    TaskFailed,
}

/// Decide what to do with a task-status response, given whether the stored
/// status already carries an optimization result.
pub fn task_decision(has_result: bool, task: &UserTaskState) -> TaskDecision {
    match task.status {
        UserTaskStatus::Active => TaskDecision::KeepPolling,
        UserTaskStatus::InExecution => match (&task.summary, has_result) {
            (Some(summary), false) => TaskDecision::MergeProposal(summary.clone()),
            _ => TaskDecision::KeepPolling,
        },
        UserTaskStatus::Completed => TaskDecision::Finished(task.summary.clone()),
        UserTaskStatus::CompletedWithError => TaskDecision::TaskFailed,
    }
}

/// Handling for an annotation the current state does not act on.
///
/// Recognized but inapplicable values (approve on a pending proposal, stop
/// on a stopped resource) change nothing. An unknown value is kept on the
/// resource, so the status is rebuilt to carry its Warning condition.
pub fn ignored_annotation_status(
    rebalance: &KafkaRebalance,
    annotation: RebalanceAnnotation,
) -> Result<Option<KafkaRebalanceStatus>> {
    if annotation == RebalanceAnnotation::Unknown {
        refresh_warnings(rebalance)
    } else {
        Ok(None)
    }
}

/// Issue a proposal (or execution) request and map the outcome
async fn request_rebalance(
    cc: &CruiseControlClient,
    rebalance: &KafkaRebalance,
    full_run: bool,
    user_task_id: Option<&str>,
) -> Result<Option<KafkaRebalanceStatus>> {
    info!(dryrun = !full_run, "Requesting Cruise Control rebalance");
    let mut options = RebalanceOptions::from_spec(&rebalance.spec);
    if full_run {
        options = options.with_full_run();
    }
    let outcome = cc.rebalance(&options, user_task_id).await?;
    Ok(Some(proposal_status(outcome, !full_run, validate(rebalance))))
}

/// A new resource requests a dry-run proposal, whatever annotation it
/// carries; only `stop` makes no sense here and leaves the status alone.
async fn on_new(
    cc: &CruiseControlClient,
    rebalance: &KafkaRebalance,
    annotation: RebalanceAnnotation,
) -> Result<Option<KafkaRebalanceStatus>> {
    if annotation == RebalanceAnnotation::Stop {
        debug!("Nothing to stop for a new resource");
        return Ok(None);
    }
    request_rebalance(cc, rebalance, false, None).await
}

/// Poll the pending proposal until it is ready, the user stops it, or the
/// transport retry budget runs out.
async fn on_pending_proposal(
    ctx: &Context,
    api: &Api<KafkaRebalance>,
    cc: &CruiseControlClient,
    key: &ResourceKey,
    rebalance: &KafkaRebalance,
    annotation: RebalanceAnnotation,
) -> Result<Option<KafkaRebalanceStatus>> {
    match annotation {
        RebalanceAnnotation::Stop => {
            return Ok(Some(build_rebalance_status(
                None,
                RebalanceState::Stopped,
                None,
                validate(rebalance),
            )));
        }
        RebalanceAnnotation::None => {}
        other => {
            warn!(?other, "Ignoring annotation while the proposal is pending");
            return ignored_annotation_status(rebalance, other);
        }
    }

    let Some(mut guard) = ctx.poller.try_begin(key) else {
        debug!(%key, "Proposal poll already active");
        return Ok(None);
    };
    debug!(%key, "Starting Cruise Control proposal request timer");

    let options = RebalanceOptions::from_spec(&rebalance.spec);
    let mut session = rebalance.status.as_ref().and_then(|s| s.session_id.clone());
    let mut consecutive_errors: u32 = 0;

    let end = ctx
        .poller
        .run(&mut guard, || Box::pin(async {
            // The resource is re-read on every tick: a stop annotation or a
            // deletion between ticks must win over the cached copy
            let Some(current) = api.get_opt(&key.name).await? else {
                debug!(%key, "Rebalance resource was deleted, stopping the proposal poll");
                return Ok(ControlFlow::Break(None));
            };
            if current_state(&current)? != RebalanceState::PendingProposal {
                // Another reconciliation moved the machine on; hand control
                // back without touching the status
                return Ok(ControlFlow::Break(None));
            }
            if rebalance_annotation(&current) == RebalanceAnnotation::Stop {
                debug!(%key, "Stopping the proposal request timer");
                return Ok(ControlFlow::Break(Some(build_rebalance_status(
                    None,
                    RebalanceState::Stopped,
                    None,
                    validate(&current),
                ))));
            }

            match cc.rebalance(&options, session.as_deref()).await {
                Ok(ProposalOutcome::Ready { user_task_id, summary }) => {
                    debug!(%key, "Optimization proposal ready");
                    Ok(ControlFlow::Break(Some(build_rebalance_status(
                        user_task_id.or_else(|| session.clone()),
                        RebalanceState::ProposalReady,
                        Some(summary),
                        validate(&current),
                    ))))
                }
                Ok(ProposalOutcome::StillCalculating { user_task_id }) => {
                    debug!(%key, "Waiting for the optimization proposal to be ready");
                    consecutive_errors = 0;
                    session = Some(user_task_id);
                    Ok(ControlFlow::Continue(()))
                }
                Ok(ProposalOutcome::NotEnoughData) => {
                    debug!(%key, "Not enough data for a proposal yet");
                    consecutive_errors = 0;
                    session = None;
                    Ok(ControlFlow::Continue(()))
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if e.is_retryable() && consecutive_errors < MAX_API_RETRIES {
                        warn!(%key, error = %e, attempt = consecutive_errors, "Proposal request failed, will retry");
                        Ok(ControlFlow::Continue(()))
                    } else if e.is_retryable() {
                        Err(Error::RetriesExhaustedError {
                            attempts: MAX_API_RETRIES,
                        })
                    } else {
                        Err(e.into())
                    }
                }
            }
        }))
        .await?;

    match end {
        PollEnd::Completed(status) => Ok(status),
        PollEnd::Cancelled => Ok(None),
    }
}

/// A ready proposal waits for the user: approve executes it, refresh
/// recomputes it, everything else leaves it in place.
async fn on_proposal_ready(
    cc: &CruiseControlClient,
    rebalance: &KafkaRebalance,
    annotation: RebalanceAnnotation,
) -> Result<Option<KafkaRebalanceStatus>> {
    match annotation {
        RebalanceAnnotation::Approve => request_rebalance(cc, rebalance, true, None).await,
        RebalanceAnnotation::Refresh => request_rebalance(cc, rebalance, false, None).await,
        other => {
            if other != RebalanceAnnotation::None {
                warn!(?other, "Ignoring annotation on a ready proposal");
            }
            refresh_warnings(rebalance)
        }
    }
}

/// Poll the running task until it completes, fails, or the user stops it
async fn on_rebalancing(
    ctx: &Context,
    api: &Api<KafkaRebalance>,
    cc: &CruiseControlClient,
    key: &ResourceKey,
    rebalance: &KafkaRebalance,
    annotation: RebalanceAnnotation,
) -> Result<Option<KafkaRebalanceStatus>> {
    match annotation {
        RebalanceAnnotation::Stop => {
            info!(%key, "Stopping the Cruise Control rebalance");
            cc.stop_execution().await?;
            return Ok(Some(build_rebalance_status(
                None,
                RebalanceState::Stopped,
                None,
                validate(rebalance),
            )));
        }
        RebalanceAnnotation::None => {}
        other => {
            warn!(?other, "Ignoring annotation while rebalancing");
            return ignored_annotation_status(rebalance, other);
        }
    }

    let session = rebalance
        .status
        .as_ref()
        .and_then(|s| s.session_id.clone())
        .ok_or_else(|| {
            Error::InternalError("Rebalancing status carries no session id".to_string())
        })?;

    let Some(mut guard) = ctx.poller.try_begin(key) else {
        debug!(%key, "Task status poll already active");
        return Ok(None);
    };
    info!(%key, %session, "Starting Cruise Control user task status timer");

    let mut consecutive_errors: u32 = 0;

    let end = ctx
        .poller
        .run(&mut guard, || Box::pin(async {
            let Some(current) = api.get_opt(&key.name).await? else {
                debug!(%key, "Rebalance resource was deleted, stopping the task status poll");
                return Ok(ControlFlow::Break(None));
            };
            if current_state(&current)? != RebalanceState::Rebalancing {
                return Ok(ControlFlow::Break(None));
            }
            if rebalance_annotation(&current) == RebalanceAnnotation::Stop {
                info!(%key, "Stopping the Cruise Control rebalance user task");
                cc.stop_execution().await?;
                return Ok(ControlFlow::Break(Some(build_rebalance_status(
                    None,
                    RebalanceState::Stopped,
                    None,
                    validate(&current),
                ))));
            }

            let current_result = current
                .status
                .as_ref()
                .and_then(|s| s.optimization_result.clone());
            let has_result = current_result.as_ref().is_some_and(|m| !m.is_empty());

            match cc.user_task_status(&session).await {
                Ok(task) => {
                    consecutive_errors = 0;
                    match task_decision(has_result, &task) {
                        TaskDecision::KeepPolling => Ok(ControlFlow::Continue(())),
                        TaskDecision::MergeProposal(summary) => {
                            info!(%key, %session, "Optimization proposal is ready and added to the status");
                            Ok(ControlFlow::Break(Some(build_rebalance_status(
                                Some(session.clone()),
                                RebalanceState::Rebalancing,
                                Some(summary),
                                validate(&current),
                            ))))
                        }
                        TaskDecision::Finished(summary) => {
                            info!(%key, %session, "Rebalance is now complete");
                            Ok(ControlFlow::Break(Some(build_rebalance_status(
                                None,
                                RebalanceState::Ready,
                                summary.or(current_result),
                                validate(&current),
                            ))))
                        }
                        TaskDecision::TaskFailed => {
                            warn!(%key, %session, "Rebalance optimization proposal has failed to complete");
                            Ok(ControlFlow::Break(Some(build_failed_task_status(
                                &session,
                                current_result,
                                validate(&current),
                            ))))
                        }
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if e.is_retryable() && consecutive_errors < MAX_API_RETRIES {
                        warn!(%key, error = %e, attempt = consecutive_errors, "Task status request failed, will retry");
                        Ok(ControlFlow::Continue(()))
                    } else if e.is_retryable() {
                        Err(Error::RetriesExhaustedError {
                            attempts: MAX_API_RETRIES,
                        })
                    } else {
                        Err(e.into())
                    }
                }
            }
        }))
        .await?;

    match end {
        PollEnd::Completed(status) => Ok(status),
        PollEnd::Cancelled => Ok(None),
    }
}

/// A stopped resource waits for a refresh
async fn on_stopped(
    cc: &CruiseControlClient,
    rebalance: &KafkaRebalance,
    annotation: RebalanceAnnotation,
) -> Result<Option<KafkaRebalanceStatus>> {
    match annotation {
        RebalanceAnnotation::Refresh => request_rebalance(cc, rebalance, false, None).await,
        RebalanceAnnotation::None => refresh_warnings(rebalance),
        other => {
            warn!(?other, "Ignoring annotation on a stopped rebalance");
            refresh_warnings(rebalance)
        }
    }
}

/// A finished rebalance stays Ready until the user asks for a new proposal
async fn on_ready(
    cc: &CruiseControlClient,
    rebalance: &KafkaRebalance,
    annotation: RebalanceAnnotation,
) -> Result<Option<KafkaRebalanceStatus>> {
    match annotation {
        RebalanceAnnotation::Refresh => request_rebalance(cc, rebalance, false, None).await,
        _ => refresh_warnings(rebalance),
    }
}

/// A failed resource stays NotReady until the user fixes it and refreshes
async fn on_not_ready(
    cc: &CruiseControlClient,
    rebalance: &KafkaRebalance,
    annotation: RebalanceAnnotation,
) -> Result<Option<KafkaRebalanceStatus>> {
    match annotation {
        RebalanceAnnotation::Refresh => request_rebalance(cc, rebalance, false, None).await,
        other => ignored_annotation_status(rebalance, other),
    }
}

/// Rebuild the stored status with the current validation warnings; the diff
/// check elides the write when nothing changed
fn refresh_warnings(rebalance: &KafkaRebalance) -> Result<Option<KafkaRebalanceStatus>> {
    match rebalance.status.as_ref() {
        Some(status) => Ok(Some(carry_over_status(status, validate(rebalance))?)),
        None => Ok(None),
    }
}
