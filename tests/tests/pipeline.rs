//! Full pipeline through the scheduler: feed, killmail worker, entity
//! workers and projections wired the way the binary wires them.

use integration_tests::fixtures::{attacker, character, killmail, killmail_ref, victim};
use integration_tests::mocks::{FakeEsi, FakeFeed};
use integration_tests::setup::{eventually, TestContext, PREFIX};
use std::sync::Arc;
use std::time::Duration;
use sync_core::EntityKind;
use tokio::sync::watch;
use worker::{Role, SyncProducer, WorkerDeps, WorkerScheduler};

#[tokio::test]
async fn test_feed_to_entities() {
    let km = killmail(1, victim(10, 587), vec![attacker(20, 11198)]);
    let esi = FakeEsi::new()
        .with_killmail(km)
        .with_entity(character(10, "Victim"))
        .with_entity(character(20, "Shooter"));
    let ctx = TestContext::with_esi(esi);
    let feed = FakeFeed::new(vec![killmail_ref(1)]);

    let mut config = ctx.config.clone();
    config.roles = vec![Role::Entities, Role::Killmails, Role::Feed, Role::Projections];
    config.staleness_threshold = 0;

    let scheduler = WorkerScheduler::new(
        config,
        PREFIX,
        WorkerDeps {
            esi: ctx.esi_arc(),
            store: ctx.store_arc(),
            publisher: ctx.publisher_arc(),
            connector: Arc::new(ctx.broker.clone()),
            feed: Some(Arc::new(feed)),
        },
    );
    let (tx, rx) = watch::channel(false);
    let handles = scheduler.start(rx).await.unwrap();
    assert_eq!(handles.len(), EntityKind::ALL.len() + 3);

    let store = ctx.store.clone();
    assert!(
        eventually(Duration::from_secs(5), || {
            let store = store.clone();
            async move { store.killmail(1).is_some() }
        })
        .await
    );

    // Characters seen on the killmail become syncable.
    let producer = SyncProducer::new(ctx.esi_arc(), ctx.store_arc(), ctx.publisher_arc(), PREFIX);
    let summary = producer.publish_all(EntityKind::Character).await.unwrap();
    assert_eq!(summary.published, 2);

    assert!(
        eventually(Duration::from_secs(5), || {
            let store = store.clone();
            async move { store.entity_count(EntityKind::Character) == 2 }
        })
        .await
    );

    tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("task did not stop")
            .unwrap();
    }
}

#[tokio::test]
async fn test_only_configured_roles_start() {
    let ctx = TestContext::new();
    let mut config = ctx.config.clone();
    config.roles = vec![Role::Killmails];

    let scheduler = WorkerScheduler::new(
        config,
        PREFIX,
        WorkerDeps {
            esi: ctx.esi_arc(),
            store: ctx.store_arc(),
            publisher: ctx.publisher_arc(),
            connector: Arc::new(ctx.broker.clone()),
            feed: None,
        },
    );
    let (tx, rx) = watch::channel(false);
    let handles = scheduler.start(rx).await.unwrap();
    assert_eq!(handles.len(), 1);
    assert!(ctx
        .broker
        .declared(&redpanda::killmail_queue(PREFIX))
        .is_some());

    tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}
