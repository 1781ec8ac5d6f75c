//! Tests for the operational endpoints.
//!
//! The health registry is process-global, so tests here use distinct
//! worker names and keep each component toggle inside one test.

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration as ChronoDuration, Utc};
use integration_tests::setup::{TestContext, PREFIX};
use redpanda::{all_queue_specs, killmail_queue, QueuePublisher};
use std::time::Duration;
use sync_core::{EntityKind, Store};
use telemetry::health;

fn server(ctx: &TestContext) -> TestServer {
    TestServer::new(ctx.router.clone()).expect("Failed to create test server")
}

#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new();
    let response = server(&ctx).get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    for field in [
        "status",
        "redpanda_connected",
        "postgres_connected",
        "esi_connected",
        "workers_alive",
        "components",
    ] {
        assert!(body.get(field).is_some(), "Response should have '{}' field", field);
    }

    let status = body["status"].as_str().unwrap_or("");
    assert!(
        status == "healthy" || status == "degraded" || status == "unhealthy",
        "unexpected status '{}'",
        status
    );
    assert_eq!(body["components"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_liveness_check() {
    let ctx = TestContext::new();
    server(&ctx).get("/health/live").await.assert_status_ok();
}

#[tokio::test]
async fn test_readiness_follows_broker_and_store() {
    let ctx = TestContext::new();
    let server = server(&ctx);

    health().redpanda.set_healthy();
    health().postgres.set_healthy();
    server.get("/health/ready").await.assert_status_ok();

    health().postgres.set_unhealthy("connection refused");
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["postgres_connected"], false);

    health().postgres.set_healthy();
    server.get("/health/ready").await.assert_status_ok();
}

#[tokio::test]
async fn test_workers_endpoint_flags_quiet_workers() {
    let ctx = TestContext::new();
    let server = server(&ctx);

    health()
        .workers
        .beat("entity.alliance", Duration::from_secs(30));
    let response = server.get("/health/workers").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let names: Vec<&str> = body["workers"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|w| w["name"].as_str())
        .collect();
    assert!(names.contains(&"entity.alliance"));

    health().workers.beat_at(
        "entity.group",
        Duration::from_secs(1),
        Utc::now() - ChronoDuration::seconds(60),
    );
    server
        .get("/health/workers")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    health().workers.remove("entity.group");
    health().workers.remove("entity.alliance");
}

#[tokio::test]
async fn test_queues_report_pending_and_consumers() {
    let ctx = TestContext::new();
    let queue = killmail_queue(PREFIX);
    for _ in 0..3 {
        ctx.broker.publish(&queue, b"{}".to_vec(), 0).await.unwrap();
    }
    ctx.store.save_queue_offset(&queue, 1).await.unwrap();
    health().workers.beat("killmails", Duration::from_secs(30));

    let response = server(&ctx).get("/queues").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let queues = body["queues"].as_array().unwrap();
    assert_eq!(queues.len(), all_queue_specs(PREFIX).len());

    let killmails = queues
        .iter()
        .find(|q| q["queue"] == queue.as_str())
        .unwrap();
    assert_eq!(killmails["pending"], 2);
    assert_eq!(killmails["consumers"], 1);

    let regions = queues
        .iter()
        .find(|q| q["queue"] == format!("{}.entity.{}", PREFIX, EntityKind::Region))
        .unwrap();
    assert_eq!(regions["pending"], 0);

    health().workers.remove("killmails");
}

#[tokio::test]
async fn test_queues_unavailable_when_store_is_down() {
    let ctx = TestContext::new();
    ctx.store.set_unavailable(true);
    server(&ctx)
        .get("/queues")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_refresh_endpoint() {
    let ctx = TestContext::new();
    let server = server(&ctx);

    let first: serde_json::Value = server.post("/refresh/character/7").await.json();
    assert_eq!(first["result"], "queued");
    assert_eq!(first["kind"], "character");

    let second: serde_json::Value = server.post("/refresh/character/7").await.json();
    assert_eq!(second["result"], "suppressed");

    server
        .post("/refresh/type/34")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .post("/refresh/starbase/1")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
