//! Integration tests for the gateway collaborator using wiremock
//!
//! These tests drive the resource handlers, the termination pipeline and the
//! client registry against mocked gateway endpoints.

use cloud_reaper::aws::{gateway_factory, ClientRegistry};
use cloud_reaper::error::ApiError;
use cloud_reaper::resource::{FetchContext, ResourceFactory, ResourceKind, Usage};
use cloud_reaper::terminate::{Action, Interceptors, TerminationPipeline, TerminationRequest};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{bearer_token, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn factory(server: &MockServer) -> ResourceFactory {
    let clients = ClientRegistry::new(&server.uri(), "test-token").expect("registry");
    gateway_factory(Arc::new(clients))
}

fn ctx() -> FetchContext {
    FetchContext::new("us-east-1", None)
}

/// Test module for paginated listing
mod listing_tests {
    use super::*;

    /// Test that every page is requested with the previous cursor
    #[tokio::test]
    async fn test_list_follows_next_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sqs/queues"))
            .and(query_param("NextToken", "t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "QueueNames": ["c"]
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/sqs/queues"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "QueueNames": ["a", "b"],
                "NextToken": "t1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let handler = factory(&server).get(ResourceKind::Queue).unwrap();
        let names = handler.list_names(&ctx()).await.unwrap();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    /// Test explicit has-more flag with object items
    #[tokio::test]
    async fn test_list_roles_uses_truncation_flag() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/iam/roles"))
            .and(query_param("Marker", "m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Roles": [{"RoleName": "deployer"}],
                "Marker": "m2",
                "IsTruncated": false
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/iam/roles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Roles": [{"RoleName": "admin"}, {"RoleName": "auditor"}],
                "Marker": "m1",
                "IsTruncated": true
            })))
            .mount(&server)
            .await;

        let handler = factory(&server).get(ResourceKind::Role).unwrap();
        let names = handler.list_names(&ctx()).await.unwrap();
        assert_eq!(names, vec!["admin", "auditor", "deployer"]);
    }

    /// Test that a failing page aborts the enumeration
    #[tokio::test]
    async fn test_list_server_error_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sns/topics"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let handler = factory(&server).get(ResourceKind::Topic).unwrap();
        let err = handler.list_names(&ctx()).await.unwrap_err();
        assert!(matches!(err, ApiError::Transient(ref m) if m.contains("503")));
    }
}

/// Test module for describe and usage calls
mod detail_tests {
    use super::*;

    /// Test that a 404 on describe becomes a note
    #[tokio::test]
    async fn test_describe_not_found_becomes_note() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sqs/queues/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "attributes": {"VisibilityTimeout": 30},
                "relations": {"alarms": ["depth"]}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/sqs/queues/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let handler = factory(&server).get(ResourceKind::Queue).unwrap();
        let outcome = handler
            .fetch_details(&ctx(), &["orders".to_string(), "ghost".to_string()])
            .await;

        assert_eq!(outcome.resources.len(), 1);
        assert_eq!(outcome.resources[0].attribute("VisibilityTimeout"), Some("30"));
        assert_eq!(outcome.notes, vec!["Queue not exists: [ghost]"]);
    }

    /// Test that metric sums are added across metrics
    #[tokio::test]
    async fn test_metric_usage_sums_metrics() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/cloudwatch/metrics/sum"))
            .and(query_param("metric", "NumberOfMessagesSent"))
            .and(query_param("value", "orders"))
            .and(query_param("days", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Sum": 4.0})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/cloudwatch/metrics/sum"))
            .and(query_param("metric", "NumberOfMessagesReceived"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Sum": 2.0})))
            .mount(&server)
            .await;

        let handler = factory(&server).get(ResourceKind::Queue).unwrap();
        let usage = handler.usage(&ctx(), "orders", 7).await.unwrap();
        assert_eq!(usage, Usage::Volume(6.0));
    }

    /// Test last-accessed usage for roles
    #[tokio::test]
    async fn test_last_accessed_usage() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/iam/roles/deployer/last-used"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"LastUsedDate": "2024-03-01T12:00:00Z"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/iam/roles/fresh/last-used"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let handler = factory(&server).get(ResourceKind::Role).unwrap();
        match handler.usage(&ctx(), "deployer", 7).await.unwrap() {
            Usage::LastUsed(at) => assert_eq!(at.to_rfc3339(), "2024-03-01T12:00:00+00:00"),
            other => panic!("unexpected usage {other:?}"),
        }
        assert_eq!(handler.usage(&ctx(), "fresh", 7).await.unwrap(), Usage::None);
    }
}

/// Test module for the termination pipeline over the gateway
mod termination_tests {
    use super::*;

    async fn mount_idle_queue(server: &MockServer, name: &str, encoded: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/sqs/queues/{encoded}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "attributes": {"QueueArn": format!("arn:aws:sqs:us-east-1:1:{name}")}
            })))
            .mount(server)
            .await;
    }

    async fn mount_zero_metrics(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/cloudwatch/metrics/sum"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Sum": 0.0})))
            .mount(server)
            .await;
    }

    /// Test that a dry run never sends a DELETE
    #[tokio::test]
    async fn test_dry_run_sends_no_delete() {
        let server = MockServer::start().await;
        mount_idle_queue(&server, "a", "a").await;
        mount_idle_queue(&server, "b c", "b%20c").await;
        mount_zero_metrics(&server).await;

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let pipeline = TerminationPipeline::new(factory(&server), Arc::new(Interceptors::new()));
        let request = TerminationRequest::new(
            ResourceKind::Queue,
            ctx(),
            cloud_reaper::config::parse_resources("a;b+c"),
        );
        let report = pipeline.run(&request).await.unwrap();

        assert_eq!(report.names(Action::WouldDelete), vec!["a", "b c"]);
    }

    /// Test apply with one vanished and one refused resource
    #[tokio::test]
    async fn test_apply_isolates_failures() {
        let server = MockServer::start().await;
        for name in ["a", "gone", "locked"] {
            mount_idle_queue(&server, name, name).await;
        }
        mount_zero_metrics(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/sqs/queues/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/sqs/queues/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/sqs/queues/locked"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let pipeline = TerminationPipeline::new(factory(&server), Arc::new(Interceptors::new()));
        let mut request = TerminationRequest::new(
            ResourceKind::Queue,
            ctx(),
            vec!["a".into(), "gone".into(), "locked".into()],
        );
        request.apply = true;
        let report = pipeline.run(&request).await.unwrap();

        assert_eq!(report.names(Action::Deleted), vec!["a"]);
        assert_eq!(report.names(Action::Failed), vec!["gone", "locked"]);
        assert!(report.notes.contains(&"Queue not exists: [gone]".to_string()));
    }
}

/// Test module for role assumption
mod credential_tests {
    use super::*;

    /// Test that assumed-role sessions are exchanged once and reused
    #[tokio::test]
    async fn test_assume_role_token_is_cached() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/sts/assume-role"))
            .and(bearer_token("test-token"))
            .and(body_partial_json(json!({"RoleArn": "arn:aws:iam::2:role/reaper"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "SessionToken": "session-1",
                "ExpiresIn": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/sns/topics"))
            .and(bearer_token("session-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Topics": [{"TopicName": "alerts"}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let handler = factory(&server).get(ResourceKind::Topic).unwrap();
        let assumed = FetchContext::new("us-east-1", Some("arn:aws:iam::2:role/reaper"));
        assert_eq!(handler.list_names(&assumed).await.unwrap(), vec!["alerts"]);
        assert_eq!(handler.list_names(&assumed).await.unwrap(), vec!["alerts"]);
    }

    /// Test that the registry keeps one client per context
    #[tokio::test]
    async fn test_registry_keys_by_region_and_role() {
        let registry = ClientRegistry::new("https://gw.{region}.example.com", "t").unwrap();
        let plain = FetchContext::new("us-east-1", None);
        let assumed = FetchContext::new("us-east-1", Some("arn:aws:iam::2:role/reaper"));

        let first = registry.client_for(&plain).await.unwrap();
        let again = registry.client_for(&plain).await.unwrap();
        registry.client_for(&assumed).await.unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.base_url(), "https://gw.us-east-1.example.com");
        assert_eq!(registry.len().await, 2);
    }
}
