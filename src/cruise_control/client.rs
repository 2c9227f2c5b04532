//! HTTP client for the Cruise Control REST API
//!
//! A thin transport over the three endpoints the rebalance flow needs:
//! `/rebalance`, `/user_tasks` and `/stop_proposal_execution`. Responses are
//! mapped to the structured outcomes in [`super::types`]; anything the
//! operator cannot interpret surfaces as a tagged [`Error`].

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use crate::crd::cruise_control_service_name;

use super::types::{ProposalOutcome, RebalanceOptions, UserTaskState, UserTaskStatus};

/// REST API port of the Cruise Control deployment
pub const DEFAULT_API_PORT: u16 = 9090;

/// Path prefix of every Cruise Control endpoint
pub const API_PREFIX: &str = "/kafkacruisecontrol";

/// Response header carrying the user task id
const USER_TASK_ID_HEADER: &str = "User-Task-ID";

/// Marker in error bodies meaning the service lacks metric windows
const NOT_ENOUGH_DATA_MARKER: &str = "NotEnoughValidWindows";

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors talking to the Cruise Control REST API
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Cruise Control transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Cruise Control returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed Cruise Control response: {0}")]
    Protocol(String),
}

impl Error {
    /// Whether a retry at the next poll tick makes sense
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Http { status, .. } => *status >= 500,
            Error::Protocol(_) => false,
        }
    }
}

/// Client for the Cruise Control REST API of one Kafka cluster
#[derive(Debug, Clone)]
pub struct CruiseControlClient {
    http: reqwest::Client,
    base_url: String,
}

impl CruiseControlClient {
    /// Create a client for an explicit base URL (host and port, no path)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { http, base_url })
    }

    /// Create a client addressing the in-cluster Cruise Control service of
    /// the named Kafka cluster
    pub fn for_cluster(
        cluster_name: &str,
        namespace: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self> {
        let host = cruise_control_service_name(cluster_name, namespace);
        Self::new(format!("http://{}:{}", host, port), timeout)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// Request a rebalance proposal, or its execution when
    /// `options.full_run` is set. Passing the task id of an earlier request
    /// polls that computation instead of starting a new one.
    pub async fn rebalance(
        &self,
        options: &RebalanceOptions,
        user_task_id: Option<&str>,
    ) -> Result<ProposalOutcome> {
        let url = self.endpoint("/rebalance");
        debug!(%url, dryrun = !options.full_run, ?user_task_id, "Requesting rebalance");

        let response = self
            .http
            .post(&url)
            .query(&options.to_query(user_task_id))
            .send()
            .await?;

        let status = response.status();
        let task_id = header_task_id(&response);

        if status.as_u16() == 202 {
            // The proposal is still being computed; the task id correlates
            // the next poll with this computation.
            let user_task_id = task_id.ok_or_else(|| {
                Error::Protocol("202 response without a User-Task-ID header".to_string())
            })?;
            return Ok(ProposalOutcome::StillCalculating { user_task_id });
        }

        let body = response.text().await?;

        if !status.is_success() {
            if body.contains(NOT_ENOUGH_DATA_MARKER) {
                return Ok(ProposalOutcome::NotEnoughData);
            }
            return Err(Error::Http {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| Error::Protocol(format!("rebalance response is not JSON: {}", e)))?;
        let summary = extract_summary(&json).ok_or_else(|| {
            Error::Protocol(format!("rebalance returned unknown response: {}", truncate(&body)))
        })?;

        Ok(ProposalOutcome::Ready {
            user_task_id: task_id,
            summary,
        })
    }

    /// Fetch the status of a previously started user task
    pub async fn user_task_status(&self, user_task_id: &str) -> Result<UserTaskState> {
        let url = self.endpoint("/user_tasks");
        debug!(%url, %user_task_id, "Fetching user task status");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("user_task_ids", user_task_id),
                ("json", "true"),
                ("fetch_completed_task", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| Error::Protocol(format!("user_tasks response is not JSON: {}", e)))?;

        let raw_status = json
            .get("Status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Protocol("user_tasks response lacks a Status field".to_string()))?;
        let status: UserTaskStatus = raw_status
            .parse()
            .map_err(|()| Error::Protocol(format!("unknown task status: {}", raw_status)))?;

        Ok(UserTaskState {
            status,
            summary: extract_summary(&json),
        })
    }

    /// Stop the execution of the active proposal
    pub async fn stop_execution(&self) -> Result<()> {
        let url = self.endpoint("/stop_proposal_execution");
        debug!(%url, "Stopping proposal execution");

        let response = self.http.post(&url).query(&[("json", "true")]).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }
        Ok(())
    }
}

fn header_task_id(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(USER_TASK_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Pull the proposal summary object out of a response document
fn extract_summary(json: &serde_json::Value) -> Option<BTreeMap<String, serde_json::Value>> {
    json.get("summary")
        .and_then(|v| v.as_object())
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn truncate(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() > MAX {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}
