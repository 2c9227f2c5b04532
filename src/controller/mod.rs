pub mod annotations;
pub mod context;
pub mod error;
pub mod lock;
pub mod poller;
pub mod reconciler;
pub mod state_machine;
pub mod status;
pub mod validation;

pub use annotations::{
    PAUSE_RECONCILIATION_ANNOTATION, REBALANCE_ANNOTATION, RebalanceAnnotation,
};
pub use context::Context;
pub use error::{Error, Result};
pub use lock::{LOCK_TIMEOUT_MS, LockRegistry, ResourceKey};
pub use poller::{MAX_API_RETRIES, PollController, PollEnd, REBALANCE_POLLING_TIMER_MS};
pub use reconciler::reconcile_rebalance;
pub use state_machine::{
    TaskDecision, compute_next_status, ignored_annotation_status, proposal_status, task_decision,
};
pub use status::{StatusManager, current_state, status_diff_is_empty};
pub use validation::validate;
