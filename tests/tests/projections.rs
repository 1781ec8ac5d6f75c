//! Projection refresh scheduling, daily activity and the attackerless sweep.

use chrono::Utc;
use integration_tests::fixtures::{attacker, killmail, victim};
use integration_tests::mocks::MemoryStore;
use integration_tests::setup::fast_worker_config;
use std::sync::Arc;
use std::time::Duration;
use sync_core::Store;
use tokio::sync::watch;
use worker::{ProjectionRefresher, WorkerConfig};

async fn store_with(n: i64) -> MemoryStore {
    let store = MemoryStore::new();
    for id in 1..=n {
        store
            .insert_killmail(&killmail(id, victim(100 + id, 587), vec![attacker(1, 11198)]))
            .await
            .unwrap();
    }
    store
}

fn refresher(store: &MemoryStore, threshold: i64) -> ProjectionRefresher {
    let config = WorkerConfig {
        staleness_threshold: threshold,
        ..fast_worker_config()
    };
    ProjectionRefresher::new(Arc::new(store.clone()), config)
}

#[tokio::test]
async fn test_drift_within_threshold_skips_refresh() {
    let store = store_with(3).await;
    assert!(!refresher(&store, 3).check_staleness().await.unwrap());
    assert_eq!(store.filter_refreshes(), 0);
}

#[tokio::test]
async fn test_drift_over_threshold_refreshes_once() {
    let store = store_with(3).await;
    let refresher = refresher(&store, 2);

    assert!(refresher.check_staleness().await.unwrap());
    assert_eq!(store.filter_refreshes(), 1);
    let counts = store.projection_counts().await.unwrap();
    assert_eq!(counts.drift(), 0);

    assert!(!refresher.check_staleness().await.unwrap());
    assert_eq!(store.filter_refreshes(), 1);
}

#[tokio::test]
async fn test_store_failure_surfaces() {
    let store = store_with(1).await;
    store.set_unavailable(true);
    assert!(refresher(&store, 0).check_staleness().await.is_err());
}

#[tokio::test]
async fn test_daily_activity_counts_kills_and_losses() {
    let store = store_with(3).await;
    refresher(&store, 100).refresh_daily().await.unwrap();

    let today = Utc::now().date_naive();
    let shooter = store.daily_activity(1, 7).await.unwrap();
    assert_eq!(shooter.len(), 1);
    assert_eq!(shooter[0].day, today);
    assert_eq!((shooter[0].kills, shooter[0].losses), (3, 0));

    let lost = store.daily_activity(102, 7).await.unwrap();
    assert_eq!((lost[0].kills, lost[0].losses), (0, 1));

    assert!(store.daily_activity(999, 7).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_removes_attackerless_killmails() {
    let store = store_with(2).await;
    store.insert_raw(killmail(50, victim(5, 587), Vec::new()));
    assert_eq!(store.killmail_count(), 3);

    let removed = refresher(&store, 100).sweep().await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.killmail_count(), 2);
    assert!(store.killmail(50).is_none());

    assert_eq!(refresher(&store, 100).sweep().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_runs_every_job_on_start() {
    let store = store_with(2).await;
    store.insert_raw(killmail(60, victim(5, 587), Vec::new()));

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(refresher(&store, 0).run(rx));
    tokio::time::sleep(Duration::from_millis(10)).await;

    tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(store.filter_refreshes() >= 1);
    assert!(store.daily_refreshes() >= 1);
    assert!(store.killmail(60).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_recovers_after_store_outage() {
    let store = store_with(3).await;
    store.set_unavailable(true);

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(refresher(&store, 0).run(rx));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.filter_refreshes(), 0);
    assert_eq!(store.daily_refreshes(), 0);

    // The next staleness tick, 60 s later, succeeds.
    store.set_unavailable(false);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(!handle.is_finished());
    assert_eq!(store.filter_refreshes(), 1);

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slow_projection_refresh_does_not_hold_back_other_timers() {
    let store = store_with(3).await;
    store.set_refresh_delay(Duration::from_secs(3_600));

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(refresher(&store, 0).run(rx));

    // Daily ticks at 0, 300 and 600 s while the first filter refresh is still running.
    tokio::time::sleep(Duration::from_secs(601)).await;
    assert_eq!(store.filter_refreshes(), 0);
    assert_eq!(store.daily_refreshes(), 3);

    // Shutdown abandons the running refresh instead of waiting it out.
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(store.filter_refreshes(), 0);
}
