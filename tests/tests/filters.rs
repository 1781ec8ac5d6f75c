//! Filter compilation against stored killmails in both query modes.

use integration_tests::fixtures::{attacker, jita_geography, killmail, victim, JITA, THE_FORGE};
use integration_tests::mocks::{FakeEsi, MemoryStore};
use integration_tests::setup::{eventually, fast_worker_config, TestContext, PREFIX};
use redpanda::{killmail_queue, QueuePublisher};
use std::sync::Arc;
use std::time::Duration;
use sync_core::{Attacker, KillFilter, KillmailQuery, Page, QueryMode, Store};
use worker::{KillmailIngestHandler, ProjectionRefresher};

const VICTIM_SHIP: i64 = 587;
const ATTACKER_SHIP_1: i64 = 11198;
const ATTACKER_SHIP_2: i64 = 17738;

async fn both_modes(store: &MemoryStore, filter: &KillFilter) -> (Vec<i64>, Vec<i64>) {
    let join = store
        .find_killmails(&KillmailQuery::new(filter.clone(), QueryMode::Join))
        .await
        .unwrap();
    let projection = store
        .find_killmails(&KillmailQuery::new(filter.clone(), QueryMode::Projection))
        .await
        .unwrap();
    (join, projection)
}

async fn refresh(store: &MemoryStore) {
    let config = worker::WorkerConfig {
        staleness_threshold: 0,
        ..fast_worker_config()
    };
    ProjectionRefresher::new(Arc::new(store.clone()), config)
        .check_staleness()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_ship_type_role_scoping_end_to_end() {
    let km = killmail(
        1,
        victim(90, VICTIM_SHIP),
        vec![attacker(91, ATTACKER_SHIP_1), attacker(92, ATTACKER_SHIP_2)],
    );
    let ctx = TestContext::with_esi(FakeEsi::new().with_killmail(km));
    let queue = killmail_queue(PREFIX);
    ctx.broker
        .publish(
            &queue,
            integration_tests::fixtures::killmail_ref(1).to_bytes().unwrap(),
            0,
        )
        .await
        .unwrap();

    let worker = ctx.spawn_worker(
        "killmails",
        &queue,
        KillmailIngestHandler::new(ctx.esi_arc(), ctx.store_arc()),
    );
    let store = ctx.store.clone();
    assert!(
        eventually(Duration::from_secs(5), || {
            let store = store.clone();
            async move { store.killmail(1).is_some() }
        })
        .await
    );
    worker.stop().await;
    refresh(&ctx.store).await;

    let victim_ship = KillFilter {
        ship_type_id: Some(VICTIM_SHIP),
        victim: true,
        ..Default::default()
    };
    let attacker_ship = KillFilter {
        ship_type_id: Some(ATTACKER_SHIP_1),
        attacker: true,
        ..Default::default()
    };
    let attacker_ship_as_victim = KillFilter {
        ship_type_id: Some(ATTACKER_SHIP_1),
        victim: true,
        ..Default::default()
    };

    assert_eq!(both_modes(&ctx.store, &victim_ship).await, (vec![1], vec![1]));
    assert_eq!(both_modes(&ctx.store, &attacker_ship).await, (vec![1], vec![1]));
    assert_eq!(
        both_modes(&ctx.store, &attacker_ship_as_victim).await,
        (vec![], vec![])
    );
}

fn corpus() -> Vec<sync_core::Killmail> {
    let wing = |ids: &[i64], ship: i64| -> Vec<Attacker> {
        ids.iter().map(|id| attacker(*id, ship)).collect()
    };
    let mut kms = vec![
        killmail(10, victim(1, 587), wing(&[2, 3], 11198)),
        killmail(11, victim(2, 11198), wing(&[1], 587)),
        killmail(12, victim(3, 670), wing(&[1, 2, 4, 5, 6], 17738)),
        killmail(13, victim(4, 587), wing(&[4], 587)),
        killmail(14, victim(5, 33468), wing(&[7, 8, 9], 11198)),
    ];
    // One killmail in a system without synced geography.
    kms[4].solar_system_id = 30002187;
    // Shared alliance on one side only.
    kms[2].attackers[0].alliance_id = Some(99000001);
    kms[0].victim.alliance_id = Some(99000001);
    kms
}

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    for record in jita_geography() {
        store.seed_entity(record);
    }
    for km in corpus() {
        store.insert_killmail(&km).await.unwrap();
    }
    refresh(&store).await;
    store
}

#[tokio::test]
async fn test_join_and_projection_agree_after_refresh() {
    let store = seeded_store().await;

    let filters = vec![
        KillFilter::default(),
        KillFilter {
            ship_type_id: Some(587),
            ..Default::default()
        },
        KillFilter {
            ship_type_id: Some(587),
            attacker: true,
            ..Default::default()
        },
        KillFilter {
            character_id: Some(1),
            ..Default::default()
        },
        KillFilter {
            character_id: Some(1),
            victim: true,
            ..Default::default()
        },
        KillFilter {
            corporation_id: Some(1_002),
            attacker: true,
            ..Default::default()
        },
        KillFilter {
            alliance_id: Some(99000001),
            ..Default::default()
        },
        KillFilter {
            alliance_id: Some(99000001),
            attacker: true,
            ..Default::default()
        },
        KillFilter {
            region_id: Some(THE_FORGE),
            ..Default::default()
        },
        KillFilter {
            system_id: Some(JITA),
            min_attackers: Some(2),
            ..Default::default()
        },
        KillFilter {
            min_attackers: Some(2),
            max_attackers: Some(3),
            ..Default::default()
        },
        KillFilter {
            ship_type_id: Some(11198),
            character_id: Some(7),
            attacker: true,
            ..Default::default()
        },
    ];

    for filter in filters {
        let (join, projection) = both_modes(&store, &filter).await;
        assert_eq!(join, projection, "modes disagree for {}", filter.fingerprint());
    }
}

#[tokio::test]
async fn test_expected_ids_for_known_filters() {
    let store = seeded_store().await;

    let in_forge = KillFilter {
        region_id: Some(THE_FORGE),
        ..Default::default()
    };
    assert_eq!(both_modes(&store, &in_forge).await.0, vec![13, 12, 11, 10]);

    let char_one = KillFilter {
        character_id: Some(1),
        ..Default::default()
    };
    assert_eq!(both_modes(&store, &char_one).await.0, vec![12, 11, 10]);

    let char_one_lost = KillFilter {
        character_id: Some(1),
        victim: true,
        ..Default::default()
    };
    assert_eq!(both_modes(&store, &char_one_lost).await.0, vec![10]);

    let gangs = KillFilter {
        min_attackers: Some(3),
        ..Default::default()
    };
    assert_eq!(both_modes(&store, &gangs).await.1, vec![14, 12]);
}

#[tokio::test]
async fn test_pagination_is_newest_first_keyset() {
    let store = seeded_store().await;
    let query = |page: Page| KillmailQuery::new(KillFilter::default(), QueryMode::Join).with_page(page);

    let first = store.find_killmails(&query(Page::new(2))).await.unwrap();
    assert_eq!(first, vec![14, 13]);
    let second = store
        .find_killmails(&query(Page::new(2).before(13)))
        .await
        .unwrap();
    assert_eq!(second, vec![12, 11]);
}

#[tokio::test]
async fn test_projection_lags_until_refreshed() {
    let store = seeded_store().await;
    store
        .insert_killmail(&killmail(20, victim(30, 587), vec![attacker(31, 587)]))
        .await
        .unwrap();

    let filter = KillFilter {
        character_id: Some(30),
        ..Default::default()
    };
    assert_eq!(both_modes(&store, &filter).await, (vec![20], vec![]));

    refresh(&store).await;
    assert_eq!(both_modes(&store, &filter).await, (vec![20], vec![20]));
}

#[tokio::test]
async fn test_inconsistent_filter_is_rejected() {
    let store = seeded_store().await;
    let filter = KillFilter {
        min_attackers: Some(5),
        max_attackers: Some(2),
        ..Default::default()
    };
    let err = store
        .find_killmails(&KillmailQuery::new(filter, QueryMode::Join))
        .await
        .unwrap_err();
    assert_eq!(err.class(), sync_core::ErrorClass::Validation);
}
