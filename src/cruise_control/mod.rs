//! Client-side view of the Cruise Control optimization service

pub mod client;
pub mod types;

pub use client::{API_PREFIX, CruiseControlClient, DEFAULT_API_PORT, Error};
pub use types::{ProposalOutcome, RebalanceOptions, UserTaskState, UserTaskStatus};
