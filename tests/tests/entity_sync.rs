//! Entity sync: producer enumeration, worker convergence and redelivery.

use integration_tests::fixtures::{character, item_type};
use integration_tests::mocks::FakeEsi;
use integration_tests::setup::{eventually, TestContext, PREFIX};
use redpanda::{dead_letter_queue, entity_queue, QueuePublisher, MAX_PRIORITY};
use std::time::Duration;
use sync_core::{source, EntityKind, QueueMessage, Store};
use worker::{EntitySyncHandler, SyncProducer};

const WAIT: Duration = Duration::from_secs(5);

async fn publish_ids(ctx: &TestContext, kind: EntityKind, ids: &[i64]) {
    let queue = entity_queue(PREFIX, kind);
    for id in ids {
        let payload = QueueMessage::new(*id, source::SYNC).to_bytes().unwrap();
        ctx.broker.publish(&queue, payload, 0).await.unwrap();
    }
}

fn handler(ctx: &TestContext, kind: EntityKind) -> EntitySyncHandler {
    EntitySyncHandler::new(kind, ctx.esi_arc(), ctx.store_arc())
}

#[tokio::test]
async fn test_duplicate_ids_converge_to_one_record_each() {
    let esi = FakeEsi::new()
        .with_delay(Duration::from_millis(50))
        .with_entity(item_type(1))
        .with_entity(item_type(2))
        .with_entity(item_type(3));
    let ctx = TestContext::with_esi(esi);
    publish_ids(&ctx, EntityKind::Type, &[1, 2, 2, 3]).await;

    let queue = entity_queue(PREFIX, EntityKind::Type);
    let worker = ctx.spawn_worker("entity.type", &queue, handler(&ctx, EntityKind::Type));
    let store = ctx.store.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let queue = queue.clone();
            async move { store.offset(&queue) == Some(4) }
        })
        .await
    );
    worker.stop().await;

    assert_eq!(ctx.store.entity_count(EntityKind::Type), 3);
    assert_eq!(ctx.esi.entity_calls(EntityKind::Type, 2), 1);
    assert!(ctx.broker.is_empty(&dead_letter_queue(&queue)));
}

#[tokio::test]
async fn test_reference_entities_are_not_refetched() {
    let ctx = TestContext::with_esi(FakeEsi::new().with_entity(item_type(5)));
    ctx.store.seed_entity(item_type(5));
    publish_ids(&ctx, EntityKind::Type, &[5]).await;

    let queue = entity_queue(PREFIX, EntityKind::Type);
    let worker = ctx.spawn_worker("entity.type", &queue, handler(&ctx, EntityKind::Type));
    let store = ctx.store.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let queue = queue.clone();
            async move { store.offset(&queue) == Some(1) }
        })
        .await
    );
    worker.stop().await;

    assert_eq!(ctx.esi.total_entity_calls(), 0);
    assert_eq!(ctx.store.upserts(), 0);
}

#[tokio::test]
async fn test_mutable_entities_are_overwritten() {
    let ctx = TestContext::with_esi(FakeEsi::new().with_entity(character(7, "After")));
    ctx.store.seed_entity(character(7, "Stale"));
    publish_ids(&ctx, EntityKind::Character, &[7]).await;

    let queue = entity_queue(PREFIX, EntityKind::Character);
    let worker = ctx.spawn_worker(
        "entity.character",
        &queue,
        handler(&ctx, EntityKind::Character),
    );
    let store = ctx.store.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            async move { store.upserts() == 1 }
        })
        .await
    );
    worker.stop().await;

    let stored = ctx.store.entity(EntityKind::Character, 7).unwrap();
    assert_eq!(stored.name(), "After");
}

#[tokio::test]
async fn test_gone_upstream_is_acked_without_write() {
    let ctx = TestContext::new();
    publish_ids(&ctx, EntityKind::Alliance, &[404]).await;

    let queue = entity_queue(PREFIX, EntityKind::Alliance);
    let worker = ctx.spawn_worker(
        "entity.alliance",
        &queue,
        handler(&ctx, EntityKind::Alliance),
    );
    let store = ctx.store.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let queue = queue.clone();
            async move { store.offset(&queue) == Some(1) }
        })
        .await
    );
    worker.stop().await;

    assert_eq!(ctx.esi.entity_calls(EntityKind::Alliance, 404), 1);
    assert_eq!(ctx.store.upserts(), 0);
    assert_eq!(ctx.broker.len(&queue), 1);
    assert!(ctx.broker.is_empty(&dead_letter_queue(&queue)));
}

#[tokio::test]
async fn test_transient_failure_is_requeued_until_it_succeeds() {
    let ctx = TestContext::with_esi(FakeEsi::new().with_entity(character(9, "Flaky")));
    ctx.esi.fail_entity(EntityKind::Character, 9, 2);
    publish_ids(&ctx, EntityKind::Character, &[9]).await;

    let queue = entity_queue(PREFIX, EntityKind::Character);
    let worker = ctx.spawn_worker(
        "entity.character",
        &queue,
        handler(&ctx, EntityKind::Character),
    );
    let store = ctx.store.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            async move { store.entity(EntityKind::Character, 9).is_some() }
        })
        .await
    );
    worker.stop().await;

    assert_eq!(ctx.esi.entity_calls(EntityKind::Character, 9), 3);
    let attempts: Vec<u32> = ctx.broker.messages(&queue).iter().map(|m| m.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_duplicate_of_failing_id_is_skipped_and_owner_requeues() {
    let esi = FakeEsi::new()
        .with_delay(Duration::from_millis(50))
        .with_entity(character(21, "Twice"));
    let ctx = TestContext::with_esi(esi);
    ctx.esi.fail_entity(EntityKind::Character, 21, 1);
    publish_ids(&ctx, EntityKind::Character, &[21, 21]).await;

    let queue = entity_queue(PREFIX, EntityKind::Character);
    let worker = ctx.spawn_worker(
        "entity.character",
        &queue,
        handler(&ctx, EntityKind::Character),
    );
    let store = ctx.store.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let queue = queue.clone();
            async move { store.offset(&queue) == Some(3) }
        })
        .await
    );
    worker.stop().await;

    // One copy was acked as a skip; the owner's requeued copy carried the id.
    assert!(ctx.store.entity(EntityKind::Character, 21).is_some());
    assert_eq!(ctx.esi.entity_calls(EntityKind::Character, 21), 2);
    let attempts: Vec<u32> = ctx.broker.messages(&queue).iter().map(|m| m.attempt).collect();
    assert_eq!(attempts, vec![1, 1, 2]);
    assert!(ctx.broker.is_empty(&dead_letter_queue(&queue)));
}

#[tokio::test]
async fn test_rejected_requeue_is_retried_until_checkpoint_advances() {
    let esi = FakeEsi::new()
        .with_entity(character(13, "Flaky"))
        .with_entity(character(14, "Steady"));
    let ctx = TestContext::with_esi(esi);
    ctx.esi.fail_entity(EntityKind::Character, 13, 1);
    publish_ids(&ctx, EntityKind::Character, &[13, 14]).await;
    ctx.broker.set_fail_publish(true);

    let queue = entity_queue(PREFIX, EntityKind::Character);
    let worker = ctx.spawn_worker(
        "entity.character",
        &queue,
        handler(&ctx, EntityKind::Character),
    );
    let store = ctx.store.clone();
    let esi = ctx.esi.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let esi = esi.clone();
            async move {
                store.entity(EntityKind::Character, 14).is_some()
                    && esi.entity_calls(EntityKind::Character, 13) == 1
            }
        })
        .await
    );

    // The requeue of offset 0 keeps failing, so nothing past it is committed.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(ctx.store.offset(&queue).unwrap_or(0), 0);
    assert_eq!(ctx.broker.len(&queue), 2);

    ctx.broker.set_fail_publish(false);
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let queue = queue.clone();
            async move { store.offset(&queue) == Some(3) }
        })
        .await
    );
    worker.stop().await;

    assert!(ctx.store.entity(EntityKind::Character, 13).is_some());
    assert_eq!(ctx.esi.entity_calls(EntityKind::Character, 13), 2);
    assert!(ctx.broker.is_empty(&dead_letter_queue(&queue)));
}

#[tokio::test]
async fn test_dead_letter_after_max_attempts() {
    let ctx = TestContext::with_esi(FakeEsi::new().with_entity(character(11, "Down")));
    ctx.esi.fail_entity(EntityKind::Character, 11, 100);
    publish_ids(&ctx, EntityKind::Character, &[11]).await;

    let queue = entity_queue(PREFIX, EntityKind::Character);
    let dead = dead_letter_queue(&queue);
    let worker = ctx.spawn_worker(
        "entity.character",
        &queue,
        handler(&ctx, EntityKind::Character),
    );
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

    assert_eq!(
        ctx.esi.entity_calls(EntityKind::Character, 11),
        ctx.config.max_attempts as usize
    );
    let parked = &ctx.broker.messages(&dead)[0];
    assert_eq!(parked.attempt, ctx.config.max_attempts);
    assert!(parked.dead_reason.as_deref().unwrap().contains("gave up"));
    assert!(ctx.store.entity(EntityKind::Character, 11).is_none());
}

#[tokio::test]
async fn test_malformed_message_is_dead_lettered_immediately() {
    let ctx = TestContext::new();
    let queue = entity_queue(PREFIX, EntityKind::Region);
    ctx.broker
        .publish(&queue, b"{\"entityId\":\"nope\"}".to_vec(), 0)
        .await
        .unwrap();

    let dead = dead_letter_queue(&queue);
    let worker = ctx.spawn_worker("entity.region", &queue, handler(&ctx, EntityKind::Region));
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

    assert_eq!(ctx.esi.total_entity_calls(), 0);
    assert_eq!(ctx.broker.messages(&dead)[0].attempt, 1);
}

#[tokio::test]
async fn test_restart_resumes_from_checkpoint() {
    let esi = FakeEsi::new()
        .with_entity(item_type(1))
        .with_entity(item_type(2));
    let ctx = TestContext::with_esi(esi);
    let queue = entity_queue(PREFIX, EntityKind::Type);

    publish_ids(&ctx, EntityKind::Type, &[1]).await;
    let worker = ctx.spawn_worker("entity.type", &queue, handler(&ctx, EntityKind::Type));
    let store = ctx.store.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let queue = queue.clone();
            async move { store.offset(&queue) == Some(1) }
        })
        .await
    );
    worker.stop().await;

    publish_ids(&ctx, EntityKind::Type, &[2]).await;
    let worker = ctx.spawn_worker("entity.type", &queue, handler(&ctx, EntityKind::Type));
    let store = ctx.store.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let queue = queue.clone();
            async move { store.offset(&queue) == Some(2) }
        })
        .await
    );
    worker.stop().await;

    assert_eq!(ctx.esi.entity_calls(EntityKind::Type, 1), 1);
    assert_eq!(ctx.esi.entity_calls(EntityKind::Type, 2), 1);
}

#[tokio::test]
async fn test_producer_queues_listed_ids() {
    let ctx = TestContext::with_esi(FakeEsi::new().with_list(EntityKind::Region, vec![1, 2, 3]));
    let producer = SyncProducer::new(ctx.esi_arc(), ctx.store_arc(), ctx.publisher_arc(), PREFIX);

    let summary = producer.publish_all(EntityKind::Region).await.unwrap();
    assert_eq!(summary.requested, 3);
    assert_eq!(summary.published, 3);
    assert_eq!(summary.failed, 0);

    let queue = entity_queue(PREFIX, EntityKind::Region);
    let messages: Vec<QueueMessage> = ctx.broker.payloads(&queue);
    let ids: Vec<i64> = messages.iter().map(|m| m.entity_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(messages.iter().all(|m| m.source == source::SYNC));
    assert_eq!(ctx.broker.declared(&queue).unwrap().max_priority, MAX_PRIORITY);
}

#[tokio::test]
async fn test_producer_enumerates_characters_from_killmails() {
    use integration_tests::fixtures::{attacker, killmail, victim};

    let ctx = TestContext::new();
    ctx.store
        .insert_killmail(&killmail(1, victim(11, 587), vec![attacker(21, 11198), attacker(22, 11198)]))
        .await
        .unwrap();
    let producer = SyncProducer::new(ctx.esi_arc(), ctx.store_arc(), ctx.publisher_arc(), PREFIX);

    let summary = producer.publish_all(EntityKind::Character).await.unwrap();
    assert_eq!(summary.requested, 3);
    let ids: Vec<i64> = ctx
        .broker
        .payloads::<QueueMessage>(&entity_queue(PREFIX, EntityKind::Character))
        .iter()
        .map(|m| m.entity_id)
        .collect();
    assert_eq!(ids, vec![11, 21, 22]);
}

#[tokio::test]
async fn test_producer_counts_failed_publishes() {
    let ctx = TestContext::with_esi(FakeEsi::new().with_list(EntityKind::Category, vec![4, 6]));
    ctx.broker.set_fail_publish(true);
    let producer = SyncProducer::new(ctx.esi_arc(), ctx.store_arc(), ctx.publisher_arc(), PREFIX);

    let summary = producer.publish_all(EntityKind::Category).await.unwrap();
    assert_eq!(summary.requested, 2);
    assert_eq!(summary.published, 0);
    assert_eq!(summary.failed, 2);
}

#[tokio::test]
async fn test_producer_aborts_when_enumeration_fails() {
    let ctx = TestContext::new();
    let producer = SyncProducer::new(ctx.esi_arc(), ctx.store_arc(), ctx.publisher_arc(), PREFIX);

    assert!(producer.publish_all(EntityKind::Group).await.is_err());
    assert!(ctx
        .broker
        .declared(&entity_queue(PREFIX, EntityKind::Group))
        .is_none());
}
