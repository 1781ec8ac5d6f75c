//! Cached query service: listings, entity detail, invalidation and refresh requests.

use api::RefreshRequest;
use integration_tests::fixtures::{attacker, character, item_type, killmail, victim};
use integration_tests::setup::{TestContext, PREFIX};
use redpanda::{entity_queue, MAX_PRIORITY};
use sync_core::{source, EntityKind, ErrorClass, KillFilter, Page, QueryMode, QueueMessage, Store};

async fn seed_killmails(ctx: &TestContext, ids: &[i64]) {
    for id in ids {
        ctx.store
            .insert_killmail(&killmail(*id, victim(1, 587), vec![attacker(2, 11198)]))
            .await
            .unwrap();
    }
}

fn by_character(id: i64) -> KillFilter {
    KillFilter {
        character_id: Some(id),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_listing_is_served_from_cache() {
    let ctx = TestContext::new();
    seed_killmails(&ctx, &[1, 2]).await;

    let first = ctx
        .queries
        .killmails(by_character(1), None, Page::default())
        .await
        .unwrap();
    let second = ctx
        .queries
        .killmails(by_character(1), None, Page::default())
        .await
        .unwrap();
    assert_eq!(first, vec![2, 1]);
    assert_eq!(first, second);
    assert_eq!(ctx.store.find_calls(), 1);

    // A different page is a different query.
    ctx.queries
        .killmails(by_character(1), None, Page::new(1))
        .await
        .unwrap();
    assert_eq!(ctx.store.find_calls(), 2);
}

#[tokio::test]
async fn test_listing_invalidation_picks_up_new_killmails() {
    let ctx = TestContext::new();
    seed_killmails(&ctx, &[1]).await;

    let before = ctx
        .queries
        .killmails(by_character(2), Some(QueryMode::Join), Page::default())
        .await
        .unwrap();
    assert_eq!(before, vec![1]);

    seed_killmails(&ctx, &[5]).await;
    let stale = ctx
        .queries
        .killmails(by_character(2), Some(QueryMode::Join), Page::default())
        .await
        .unwrap();
    assert_eq!(stale, vec![1]);

    assert_eq!(ctx.queries.invalidate_killmail_lists().await, 1);
    let fresh = ctx
        .queries
        .killmails(by_character(2), Some(QueryMode::Join), Page::default())
        .await
        .unwrap();
    assert_eq!(fresh, vec![5, 1]);
}

#[tokio::test]
async fn test_mode_follows_filter_breadth() {
    let ctx = TestContext::new();
    seed_killmails(&ctx, &[1]).await;

    // Pinned actor: live relation, sees the unrefreshed write.
    let pinned = ctx
        .queries
        .killmails(by_character(1), None, Page::default())
        .await
        .unwrap();
    assert_eq!(pinned, vec![1]);

    // Broad filter: projection, empty until refreshed.
    let broad = KillFilter {
        ship_type_id: Some(587),
        ..Default::default()
    };
    let listed = ctx
        .queries
        .killmails(broad, None, Page::default())
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_invalid_filter_is_not_cached() {
    let ctx = TestContext::new();
    let filter = KillFilter {
        min_attackers: Some(9),
        max_attackers: Some(1),
        ..Default::default()
    };
    let err = ctx
        .queries
        .killmails(filter, None, Page::default())
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
    assert_eq!(ctx.queries.cache().entry_count(), 0);
    assert_eq!(ctx.store.find_calls(), 0);
}

#[tokio::test]
async fn test_entity_detail_cache_and_invalidation() {
    let ctx = TestContext::new();
    assert!(ctx
        .queries
        .entity(EntityKind::Character, 7)
        .await
        .unwrap()
        .is_none());

    ctx.store.upsert_entity(&character(7, "Pilot")).await.unwrap();
    // Still the cached miss.
    assert!(ctx
        .queries
        .entity(EntityKind::Character, 7)
        .await
        .unwrap()
        .is_none());

    ctx.queries.invalidate_entity(EntityKind::Character, 7).await;
    let found = ctx
        .queries
        .entity(EntityKind::Character, 7)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.name(), "Pilot");
}

#[tokio::test]
async fn test_store_errors_are_not_cached() {
    let ctx = TestContext::new();
    ctx.store.seed_entity(item_type(34));
    ctx.store.set_unavailable(true);
    let err = ctx.queries.entity(EntityKind::Type, 34).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transient);

    ctx.store.set_unavailable(false);
    assert!(ctx
        .queries
        .entity(EntityKind::Type, 34)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_daily_activity_window_bounds() {
    let ctx = TestContext::new();
    for days in [0, 367, -1] {
        let err = ctx.queries.daily_activity(1, days).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);
    }
    assert!(ctx.queries.daily_activity(1, 30).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_daily_invalidation_is_scoped_to_one_character() {
    let ctx = TestContext::new();
    for (character_id, days) in [(1, 7), (1, 30), (12, 7)] {
        assert!(ctx
            .queries
            .daily_activity(character_id, days)
            .await
            .unwrap()
            .is_empty());
    }

    ctx.store
        .insert_killmail(&killmail(50, victim(12, 587), vec![attacker(1, 11198)]))
        .await
        .unwrap();
    ctx.store.refresh_daily_activity().await.unwrap();
    // Both characters still read their cached empty windows.
    assert!(ctx.queries.daily_activity(1, 7).await.unwrap().is_empty());
    assert!(ctx.queries.daily_activity(12, 7).await.unwrap().is_empty());

    assert_eq!(ctx.queries.invalidate_daily(1).await, 2);
    for days in [7, 30] {
        let rows = ctx.queries.daily_activity(1, days).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kills, 1);
    }
    // Character 12 shares the "1" prefix but keeps its entry.
    assert!(ctx.queries.daily_activity(12, 7).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_request_is_queued_at_top_priority() {
    let ctx = TestContext::new();
    let result = ctx
        .queries
        .request_refresh(EntityKind::Character, 7)
        .await
        .unwrap();
    assert_eq!(result, RefreshRequest::Queued);

    let queue = entity_queue(PREFIX, EntityKind::Character);
    let stored = ctx.broker.messages(&queue);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].priority, MAX_PRIORITY);
    let message: QueueMessage = serde_json::from_slice(&stored[0].payload).unwrap();
    assert_eq!(message.entity_id, 7);
    assert_eq!(message.source, source::REFRESH);
}

#[tokio::test]
async fn test_refreshed_entity_is_visible_once_written() {
    let ctx = TestContext::new();
    ctx.store.seed_entity(character(7, "Old"));
    let name = |ctx: &TestContext| {
        let queries = ctx.queries.clone();
        async move {
            queries
                .entity(EntityKind::Character, 7)
                .await
                .unwrap()
                .map(|r| r.name().to_string())
        }
    };
    assert_eq!(name(&ctx).await.as_deref(), Some("Old"));

    let result = ctx
        .queries
        .request_refresh(EntityKind::Character, 7)
        .await
        .unwrap();
    assert_eq!(result, RefreshRequest::Queued);
    // Read between the request and the worker's write.
    assert_eq!(name(&ctx).await.as_deref(), Some("Old"));

    ctx.store.upsert_entity(&character(7, "New")).await.unwrap();
    assert_eq!(name(&ctx).await.as_deref(), Some("New"));
}

#[tokio::test]
async fn test_refresh_request_cooldown_suppresses_repeats() {
    let ctx = TestContext::new();
    let first = ctx
        .queries
        .request_refresh(EntityKind::Corporation, 98000001)
        .await
        .unwrap();
    let second = ctx
        .queries
        .request_refresh(EntityKind::Corporation, 98000001)
        .await
        .unwrap();
    assert_eq!(first, RefreshRequest::Queued);
    assert_eq!(second, RefreshRequest::Suppressed);

    // Cooldowns are per entity.
    let other = ctx
        .queries
        .request_refresh(EntityKind::Corporation, 98000002)
        .await
        .unwrap();
    assert_eq!(other, RefreshRequest::Queued);
    assert_eq!(
        ctx.broker
            .len(&entity_queue(PREFIX, EntityKind::Corporation)),
        2
    );
}

#[tokio::test]
async fn test_refresh_request_rejects_reference_kinds() {
    let ctx = TestContext::new();
    let err = ctx
        .queries
        .request_refresh(EntityKind::SolarSystem, 30000142)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
    assert!(ctx
        .broker
        .is_empty(&entity_queue(PREFIX, EntityKind::SolarSystem)));
}

#[tokio::test]
async fn test_failed_refresh_publish_releases_cooldown() {
    let ctx = TestContext::new();
    ctx.broker.set_fail_publish(true);
    assert!(ctx
        .queries
        .request_refresh(EntityKind::Alliance, 99000001)
        .await
        .is_err());

    ctx.broker.set_fail_publish(false);
    let retried = ctx
        .queries
        .request_refresh(EntityKind::Alliance, 99000001)
        .await
        .unwrap();
    assert_eq!(retried, RefreshRequest::Queued);
}
