//! Tests for status derivation and diffing

use kafka_rebalance_operator::controller::status::{
    build_paused_condition, build_rebalance_condition, build_warning_condition, current_state,
    status_diff_is_empty,
};
use kafka_rebalance_operator::crd::{KafkaRebalanceStatus, RebalanceState};

use crate::common::{KafkaRebalanceBuilder, sample_summary, state_status};

mod state_derivation {
    use super::*;

    #[test]
    fn no_status_is_new() {
        let rebalance = KafkaRebalanceBuilder::new("r", "ns").build();
        assert_eq!(current_state(&rebalance).unwrap(), RebalanceState::New);
    }

    #[test]
    fn status_without_state_condition_is_new() {
        let rebalance = KafkaRebalanceBuilder::new("r", "ns")
            .with_status(KafkaRebalanceStatus::default())
            .with_warning("UnknownFields", "spec.foo")
            .build();
        assert_eq!(current_state(&rebalance).unwrap(), RebalanceState::New);
    }

    #[test]
    fn each_state_condition_round_trips() {
        for state in RebalanceState::ALL {
            let rebalance = KafkaRebalanceBuilder::new("r", "ns")
                .with_state(state, Some("t-1"))
                .build();
            assert_eq!(current_state(&rebalance).unwrap(), state);
        }
    }

    #[test]
    fn paused_condition_resets_to_new() {
        let mut status = state_status(RebalanceState::ProposalReady, Some("t-1"));
        status.conditions.push(build_paused_condition());
        let rebalance = KafkaRebalanceBuilder::new("r", "ns").with_status(status).build();
        assert_eq!(current_state(&rebalance).unwrap(), RebalanceState::New);
    }

    #[test]
    fn multiple_state_conditions_are_an_internal_error() {
        let mut status = state_status(RebalanceState::Rebalancing, Some("t-1"));
        status
            .conditions
            .push(build_rebalance_condition(RebalanceState::Ready));
        let rebalance = KafkaRebalanceBuilder::new("r", "ns").with_status(status).build();
        assert!(current_state(&rebalance).is_err());
    }

    #[test]
    fn warning_conditions_do_not_shadow_the_state() {
        let mut status = state_status(RebalanceState::Stopped, None);
        status
            .conditions
            .push(build_warning_condition("InvalidAnnotation", "bad value"));
        let rebalance = KafkaRebalanceBuilder::new("r", "ns").with_status(status).build();
        assert_eq!(current_state(&rebalance).unwrap(), RebalanceState::Stopped);
    }
}

mod diffing {
    use super::*;

    #[test]
    fn identical_statuses_elide_the_write() {
        let current = state_status(RebalanceState::Ready, None);
        let desired = state_status(RebalanceState::Ready, None);
        assert!(status_diff_is_empty(Some(&current), &desired));
    }

    #[test]
    fn condition_order_does_not_matter() {
        let mut current = state_status(RebalanceState::Ready, None);
        current
            .conditions
            .insert(0, build_warning_condition("UnknownFields", "spec.foo"));

        let mut desired = state_status(RebalanceState::Ready, None);
        desired
            .conditions
            .push(build_warning_condition("UnknownFields", "spec.foo"));

        assert!(status_diff_is_empty(Some(&current), &desired));
    }

    #[test]
    fn optimization_result_change_is_a_diff() {
        let current = state_status(RebalanceState::Rebalancing, Some("t-1"));
        let mut desired = state_status(RebalanceState::Rebalancing, Some("t-1"));
        desired.optimization_result = Some(sample_summary());
        assert!(!status_diff_is_empty(Some(&current), &desired));
    }

    #[test]
    fn observed_generation_change_is_a_diff() {
        let current = state_status(RebalanceState::Ready, None);
        let mut desired = state_status(RebalanceState::Ready, None);
        desired.observed_generation = Some(current.observed_generation.unwrap() + 1);
        assert!(!status_diff_is_empty(Some(&current), &desired));
    }

    #[test]
    fn added_warning_is_a_diff() {
        let current = state_status(RebalanceState::Ready, None);
        let mut desired = state_status(RebalanceState::Ready, None);
        desired
            .conditions
            .push(build_warning_condition("InvalidExcludedTopics", "bad regex"));
        assert!(!status_diff_is_empty(Some(&current), &desired));
    }
}
