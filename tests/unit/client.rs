//! Tests for the Cruise Control REST client against a mock server

use std::time::Duration;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kafka_rebalance_operator::cruise_control::{
    CruiseControlClient, Error, ProposalOutcome, RebalanceOptions, UserTaskStatus,
};

fn client(server: &MockServer) -> CruiseControlClient {
    CruiseControlClient::new(server.uri(), Duration::from_secs(2)).unwrap()
}

fn summary_body() -> serde_json::Value {
    serde_json::json!({
        "summary": {
            "numReplicaMovements": 24,
            "dataToMoveMB": 1024
        },
        "goalSummary": []
    })
}

mod rebalance {
    use super::*;

    #[tokio::test]
    async fn summary_response_is_ready() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/kafkacruisecontrol/rebalance"))
            .and(query_param("dryrun", "true"))
            .and(query_param("json", "true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("User-Task-ID", "t-1")
                    .set_body_json(summary_body()),
            )
            .mount(&server)
            .await;

        let outcome = client(&server)
            .rebalance(&RebalanceOptions::default(), None)
            .await
            .unwrap();

        match outcome {
            ProposalOutcome::Ready { user_task_id, summary } => {
                assert_eq!(user_task_id.as_deref(), Some("t-1"));
                assert_eq!(summary.get("numReplicaMovements"), Some(&serde_json::json!(24)));
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn accepted_response_is_still_calculating() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/kafkacruisecontrol/rebalance"))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("User-Task-ID", "t-2")
                    .set_body_json(serde_json::json!({"progress": "pending"})),
            )
            .mount(&server)
            .await;

        let outcome = client(&server)
            .rebalance(&RebalanceOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProposalOutcome::StillCalculating {
                user_task_id: "t-2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn accepted_without_task_id_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/kafkacruisecontrol/rebalance"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let err = client(&server)
            .rebalance(&RebalanceOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn not_enough_windows_error_maps_to_not_enough_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/kafkacruisecontrol/rebalance"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "errorMessage": "com.linkedin.cruisecontrol.exception.NotEnoughValidWindowsException: \
                                 There is no window available in range"
            })))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .rebalance(&RebalanceOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(outcome, ProposalOutcome::NotEnoughData);
    }

    #[tokio::test]
    async fn other_server_errors_surface_as_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/kafkacruisecontrol/rebalance"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"errorMessage": "broker fell over"})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .rebalance(&RebalanceOptions::default(), None)
            .await
            .unwrap_err();
        match &err {
            Error::Http { status, message } => {
                assert_eq!(*status, 500);
                assert!(message.contains("broker fell over"));
            }
            other => panic!("expected Http, got {:?}", other),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn success_without_summary_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/kafkacruisecontrol/rebalance"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"unexpected": true})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .rebalance(&RebalanceOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn user_task_id_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/kafkacruisecontrol/rebalance"))
            .and(query_param("user_task_id", "t-7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("User-Task-ID", "t-7")
                    .set_body_json(summary_body()),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .rebalance(&RebalanceOptions::default(), Some("t-7"))
            .await
            .unwrap();
    }
}

mod user_tasks {
    use super::*;

    #[tokio::test]
    async fn status_and_summary_are_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kafkacruisecontrol/user_tasks"))
            .and(query_param("user_task_ids", "t-3"))
            .and(query_param("fetch_completed_task", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Status": "InExecution",
                "summary": { "numReplicaMovements": 12 }
            })))
            .mount(&server)
            .await;

        let task = client(&server).user_task_status("t-3").await.unwrap();
        assert_eq!(task.status, UserTaskStatus::InExecution);
        assert_eq!(
            task.summary.unwrap().get("numReplicaMovements"),
            Some(&serde_json::json!(12))
        );
    }

    #[tokio::test]
    async fn summary_is_optional() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kafkacruisecontrol/user_tasks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"Status": "Active"})),
            )
            .mount(&server)
            .await;

        let task = client(&server).user_task_status("t-3").await.unwrap();
        assert_eq!(task.status, UserTaskStatus::Active);
        assert!(task.summary.is_none());
    }

    #[tokio::test]
    async fn missing_status_field_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kafkacruisecontrol/user_tasks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"userTasks": []})),
            )
            .mount(&server)
            .await;

        let err = client(&server).user_task_status("t-3").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn unknown_status_string_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kafkacruisecontrol/user_tasks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"Status": "Paused"})),
            )
            .mount(&server)
            .await;

        let err = client(&server).user_task_status("t-3").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}

mod stop_execution {
    use super::*;

    #[tokio::test]
    async fn ok_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/kafkacruisecontrol/stop_proposal_execution"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).stop_execution().await.unwrap();
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/kafkacruisecontrol/stop_proposal_execution"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).stop_execution().await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 503, .. }));
    }
}

mod transport {
    use super::*;

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        // Nothing listens on this port
        let client =
            CruiseControlClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = client
            .rebalance(&RebalanceOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.is_retryable());
    }
}
