//! Request and response types for the Cruise Control REST API

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::crd::KafkaRebalanceSpec;

/// Options for a `/rebalance` request, mirroring the rebalance spec.
///
/// Built from a [`KafkaRebalanceSpec`]; unset fields fall back to the
/// server-side defaults and are omitted from the query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebalanceOptions {
    pub goals: Option<Vec<String>>,
    pub skip_hard_goal_check: bool,
    pub excluded_topics: Option<String>,
    pub concurrent_partition_movements_per_broker: Option<i32>,
    pub concurrent_intra_broker_partition_movements: Option<i32>,
    pub concurrent_leader_movements: Option<i32>,
    pub replication_throttle: Option<i64>,
    pub replica_movement_strategies: Option<Vec<String>>,
    /// false requests a dry-run proposal, true executes the rebalance
    pub full_run: bool,
}

impl RebalanceOptions {
    pub fn from_spec(spec: &KafkaRebalanceSpec) -> Self {
        Self {
            goals: spec.goals.clone(),
            skip_hard_goal_check: spec.skip_hard_goal_check,
            excluded_topics: spec.excluded_topics.clone(),
            concurrent_partition_movements_per_broker: spec
                .concurrent_partition_movements_per_broker
                .filter(|n| *n > 0),
            concurrent_intra_broker_partition_movements: spec
                .concurrent_intra_broker_partition_movements
                .filter(|n| *n > 0),
            concurrent_leader_movements: spec.concurrent_leader_movements.filter(|n| *n > 0),
            replication_throttle: spec.replication_throttle.filter(|n| *n > 0),
            replica_movement_strategies: spec.replica_movement_strategies.clone(),
            full_run: false,
        }
    }

    pub fn with_full_run(mut self) -> Self {
        self.full_run = true;
        self
    }

    /// Render the options as `/rebalance` query parameters
    pub fn to_query(&self, user_task_id: Option<&str>) -> Vec<(String, String)> {
        let mut params = vec![
            ("json".to_string(), "true".to_string()),
            ("dryrun".to_string(), (!self.full_run).to_string()),
            ("verbose".to_string(), "true".to_string()),
        ];
        if let Some(goals) = &self.goals {
            params.push(("goals".to_string(), goals.join(",")));
        }
        if self.skip_hard_goal_check {
            params.push(("skip_hard_goal_check".to_string(), "true".to_string()));
        }
        if let Some(regex) = &self.excluded_topics {
            params.push(("excluded_topics".to_string(), regex.clone()));
        }
        if let Some(n) = self.concurrent_partition_movements_per_broker {
            params.push((
                "concurrent_partition_movements_per_broker".to_string(),
                n.to_string(),
            ));
        }
        if let Some(n) = self.concurrent_intra_broker_partition_movements {
            params.push((
                "concurrent_intra_broker_partition_movements".to_string(),
                n.to_string(),
            ));
        }
        if let Some(n) = self.concurrent_leader_movements {
            params.push(("concurrent_leader_movements".to_string(), n.to_string()));
        }
        if let Some(n) = self.replication_throttle {
            params.push(("replication_throttle".to_string(), n.to_string()));
        }
        if let Some(strategies) = &self.replica_movement_strategies {
            params.push((
                "replica_movement_strategies".to_string(),
                strategies.join(","),
            ));
        }
        if let Some(id) = user_task_id {
            params.push(("user_task_id".to_string(), id.to_string()));
        }
        params
    }
}

/// Outcome of a `/rebalance` request
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalOutcome {
    /// The service has not gathered enough metric windows yet; retry later
    /// without a task id
    NotEnoughData,
    /// The proposal is still being computed under the returned task id
    StillCalculating { user_task_id: String },
    /// The proposal (or execution plan) is ready
    Ready {
        user_task_id: Option<String>,
        summary: BTreeMap<String, serde_json::Value>,
    },
}

/// Status of a user task as reported by `/user_tasks`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTaskStatus {
    /// The proposal behind the task is still being computed
    Active,
    /// The rebalance is being executed
    InExecution,
    /// The task finished successfully
    Completed,
    /// The task finished with an error on the service side
    CompletedWithError,
}

impl UserTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserTaskStatus::Active => "Active",
            UserTaskStatus::InExecution => "InExecution",
            UserTaskStatus::Completed => "Completed",
            UserTaskStatus::CompletedWithError => "CompletedWithError",
        }
    }
}

impl std::fmt::Display for UserTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserTaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(UserTaskStatus::Active),
            "InExecution" => Ok(UserTaskStatus::InExecution),
            "Completed" => Ok(UserTaskStatus::Completed),
            "CompletedWithError" => Ok(UserTaskStatus::CompletedWithError),
            _ => Err(()),
        }
    }
}

/// A `/user_tasks` response: the task status plus the proposal summary when
/// the service has one
#[derive(Debug, Clone, PartialEq)]
pub struct UserTaskState {
    pub status: UserTaskStatus,
    pub summary: Option<BTreeMap<String, serde_json::Value>>,
}
