//! Killmail ingestion: feed references through to stored killmails.

use integration_tests::fixtures::{
    attacker, jita_geography, killmail, killmail_ref, victim, THE_FORGE,
};
use integration_tests::mocks::{FakeEsi, FakeFeed};
use integration_tests::setup::{eventually, TestContext, PREFIX};
use redpanda::{dead_letter_queue, killmail_queue, QueuePublisher};
use std::sync::Arc;
use std::time::Duration;
use sync_core::KillmailRef;
use tokio::sync::watch;
use worker::{FeedListener, KillmailIngestHandler};

const WAIT: Duration = Duration::from_secs(5);

async fn publish_refs(ctx: &TestContext, ids: &[i64]) {
    let queue = killmail_queue(PREFIX);
    for id in ids {
        let payload = killmail_ref(*id).to_bytes().unwrap();
        ctx.broker.publish(&queue, payload, 0).await.unwrap();
    }
}

fn handler(ctx: &TestContext) -> KillmailIngestHandler {
    KillmailIngestHandler::new(ctx.esi_arc(), ctx.store_arc())
}

#[tokio::test]
async fn test_killmail_is_written_with_region_resolved() {
    let km = killmail(100, victim(1, 587), vec![attacker(2, 11198), attacker(3, 11198)]);
    let ctx = TestContext::with_esi(FakeEsi::new().with_killmail(km));
    for record in jita_geography() {
        ctx.store.seed_entity(record);
    }
    publish_refs(&ctx, &[100]).await;

    let worker = ctx.spawn_worker("killmails", &killmail_queue(PREFIX), handler(&ctx));
    let store = ctx.store.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            async move { store.killmail(100).is_some() }
        })
        .await
    );
    worker.stop().await;

    let stored = ctx.store.killmail(100).unwrap();
    assert_eq!(stored.region_id, Some(THE_FORGE));
    assert_eq!(stored.attackers.len(), 2);
    assert_eq!(stored.items.len(), 1);
}

#[tokio::test]
async fn test_zero_attacker_killmail_leaves_no_rows() {
    let km = killmail(200, victim(1, 587), Vec::new());
    let ctx = TestContext::with_esi(FakeEsi::new().with_killmail(km));
    publish_refs(&ctx, &[200]).await;

    let queue = killmail_queue(PREFIX);
    let dead = dead_letter_queue(&queue);
    let worker = ctx.spawn_worker("killmails", &queue, handler(&ctx));
    let broker = ctx.broker.clone();
    assert!(
        eventually(WAIT, || {
            let broker = broker.clone();
            let dead = dead.clone();
            async move { broker.len(&dead) == 1 }
        })
        .await
    );
    worker.stop().await;

    assert_eq!(ctx.store.killmail_count(), 0);
    assert_eq!(ctx.esi.killmail_calls(200), 1);
    let reason = ctx.broker.messages(&dead)[0].dead_reason.clone().unwrap();
    assert!(reason.contains("VALID_001"), "unexpected reason {}", reason);
}

#[tokio::test]
async fn test_repeated_reference_is_fetched_once() {
    let km = killmail(300, victim(1, 587), vec![attacker(2, 11198)]);
    let ctx = TestContext::with_esi(FakeEsi::new().with_killmail(km));
    publish_refs(&ctx, &[300, 300]).await;

    let queue = killmail_queue(PREFIX);
    let worker = ctx.spawn_worker("killmails", &queue, handler(&ctx));
    let store = ctx.store.clone();
    let q = queue.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let q = q.clone();
            async move { store.offset(&q) == Some(2) }
        })
        .await
    );
    worker.stop().await;

    assert_eq!(ctx.store.killmail_count(), 1);
    assert_eq!(ctx.esi.killmail_calls(300), 1);

    // A later redelivery of the same reference is a no-op.
    publish_refs(&ctx, &[300]).await;
    let worker = ctx.spawn_worker("killmails", &queue, handler(&ctx));
    let store = ctx.store.clone();
    let q = queue.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let q = q.clone();
            async move { store.offset(&q) == Some(3) }
        })
        .await
    );
    worker.stop().await;
    assert_eq!(ctx.esi.killmail_calls(300), 1);
}

#[tokio::test]
async fn test_transport_failure_is_retried() {
    let km = killmail(400, victim(1, 587), vec![attacker(2, 11198)]);
    let ctx = TestContext::with_esi(FakeEsi::new().with_killmail(km));
    ctx.esi.fail_killmail(400, 1);
    publish_refs(&ctx, &[400]).await;

    let worker = ctx.spawn_worker("killmails", &killmail_queue(PREFIX), handler(&ctx));
    let store = ctx.store.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            async move { store.killmail(400).is_some() }
        })
        .await
    );
    worker.stop().await;

    assert_eq!(ctx.esi.killmail_calls(400), 2);
}

#[tokio::test]
async fn test_unknown_killmail_is_acked() {
    let ctx = TestContext::new();
    publish_refs(&ctx, &[500]).await;

    let queue = killmail_queue(PREFIX);
    let worker = ctx.spawn_worker("killmails", &queue, handler(&ctx));
    let store = ctx.store.clone();
    let q = queue.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let q = q.clone();
            async move { store.offset(&q) == Some(1) }
        })
        .await
    );
    worker.stop().await;

    assert!(ctx.broker.is_empty(&dead_letter_queue(&queue)));
    assert_eq!(ctx.store.killmail_count(), 0);
}

#[tokio::test]
async fn test_feed_listener_forwards_references() {
    let ctx = TestContext::new();
    let feed = FakeFeed::new(vec![killmail_ref(1), killmail_ref(2)]);
    let listener = FeedListener::new(
        Arc::new(feed.clone()),
        ctx.publisher_arc(),
        PREFIX,
        Duration::from_secs(1),
    );

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(listener.run(rx));

    let queue = killmail_queue(PREFIX);
    let broker = ctx.broker.clone();
    let q = queue.clone();
    assert!(
        eventually(WAIT, || {
            let broker = broker.clone();
            let q = q.clone();
            async move { broker.len(&q) == 2 }
        })
        .await
    );
    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(feed.remaining(), 0);
    assert!(ctx.broker.declared(&queue).is_some());
    let ids: Vec<i64> = ctx
        .broker
        .payloads::<KillmailRef>(&queue)
        .iter()
        .map(|r| r.killmail_id)
        .collect();
    assert_eq!(ids, vec![1, 2]);
}
