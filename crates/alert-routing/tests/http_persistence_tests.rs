//! HTTP persistence backend against a mock console API.

use std::sync::Arc;
use std::time::Duration;

use alert_routing::{
    AlertRule, Catalog, ChannelKind, ConfigSession, Frequency, HttpPersistence, PersistError,
    PersistencePort, RetryPolicy, RoutingEngine, RuleSetEntry, Snapshot,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stored_snapshot() -> Snapshot {
    Snapshot {
        scope: vec!["cdn-refresh".to_string()],
        rules: vec![RuleSetEntry {
            node_key: "cdn-refresh".to_string(),
            rules: vec![AlertRule::new("client", Frequency::TwelveHours)],
        }],
        ..Snapshot::default()
    }
}

#[tokio::test]
async fn test_save_puts_subtree_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/alert-routing/nodes/server-deploy"))
        .and(header("authorization", "Bearer s3cret"))
        .and(body_partial_json(json!({ "node_key": "server-deploy" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpPersistence::new(format!("{}/api", server.uri())).with_token("s3cret");
    let engine = RoutingEngine::from_catalog(&Catalog::builtin());
    let snapshot = engine.snapshot_for("server-deploy").unwrap();

    backend.save("server-deploy", &snapshot).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body["snapshot"]["scope"],
        json!([
            "server-deploy",
            "server-deploy-started",
            "server-deploy-failed",
            "server-deploy-rollback"
        ])
    );
}

#[tokio::test]
async fn test_load_reads_full_configuration() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alert-routing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_snapshot()))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpPersistence::new(server.uri());
    let loaded = backend.load().await.unwrap();
    assert_eq!(loaded, stored_snapshot());
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let backend = HttpPersistence::new(server.uri());
    let err = backend.load().await.unwrap_err();
    assert!(matches!(err, PersistError::RateLimited { retry_after_secs: 7 }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_rejections_keep_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unknown node"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let backend = HttpPersistence::new(server.uri());

    let err = backend
        .save("cdn", &Snapshot::default())
        .await
        .unwrap_err();
    assert!(matches!(&err, PersistError::Rejected { status: 422, body } if body == "unknown node"));
    assert!(!err.is_retryable());

    let err = backend.load().await.unwrap_err();
    assert!(matches!(err, PersistError::Rejected { status: 500, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_body_is_a_serialization_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let backend = HttpPersistence::new(server.uri());
    assert!(matches!(
        backend.load().await,
        Err(PersistError::Serialization(_))
    ));
}

#[tokio::test]
async fn test_session_retries_through_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/alert-routing/nodes/client"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/alert-routing/nodes/client"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        attempt_timeout: Duration::from_secs(5),
    };
    let backend = Arc::new(HttpPersistence::new(server.uri()));
    let mut session = ConfigSession::new(
        RoutingEngine::from_catalog(&Catalog::builtin()),
        backend,
        retry,
    );

    session
        .engine_mut()
        .set_channel_cascade("client", ChannelKind::SmallPackage, true)
        .unwrap();
    session.save("client").await.unwrap();
    assert!(!session.engine().is_dirty());
}
