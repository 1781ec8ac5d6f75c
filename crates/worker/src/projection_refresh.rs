//! Projection refresh scheduler.
//!
//! Three independent timers, each on its own task so a slow refresh
//! never delays the other two:
//! - staleness: compare live and projected row counts, refresh the filter
//!   projection when they drift apart by more than the threshold
//! - daily: refresh the per-character daily aggregate unconditionally
//! - sweep: delete killmails that ended up without attackers
//!
//! Failures are logged and retried on the next tick. Nothing here can
//! stop ingestion. Shutdown abandons a job that is still running.

use std::sync::Arc;
use std::time::Instant;
use sync_core::{Result, Store};
use telemetry::{health, metrics};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;

const WORKER_NAME: &str = "projections";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Staleness,
    Daily,
    Sweep,
}

impl Job {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Staleness => "staleness",
            Self::Daily => "daily",
            Self::Sweep => "sweep",
        }
    }
}

pub struct ProjectionRefresher {
    store: Arc<dyn Store>,
    config: WorkerConfig,
}

impl ProjectionRefresher {
    pub fn new(store: Arc<dyn Store>, config: WorkerConfig) -> Self {
        Self { store, config }
    }

    /// Refresh the filter projection if it drifted past the threshold.
    /// Returns whether a refresh ran.
    pub async fn check_staleness(&self) -> Result<bool> {
        let counts = self.store.projection_counts().await?;
        let drift = counts.drift();
        metrics().projection_drift.set(drift as u64);

        if drift <= self.config.staleness_threshold {
            debug!(
                killmails = counts.killmails,
                projected = counts.projected,
                "Filter projection fresh"
            );
            return Ok(false);
        }

        let start = Instant::now();
        self.store.refresh_filter_projection().await?;
        let elapsed = start.elapsed().as_millis() as u64;
        metrics().projection_refreshes.inc();
        metrics().projection_refresh_ms.observe(elapsed);
        info!(
            drift = drift,
            threshold = self.config.staleness_threshold,
            duration_ms = elapsed,
            "Filter projection refreshed"
        );
        Ok(true)
    }

    pub async fn refresh_daily(&self) -> Result<()> {
        let start = Instant::now();
        self.store.refresh_daily_activity().await?;
        metrics().daily_refreshes.inc();
        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Daily activity refreshed"
        );
        Ok(())
    }

    pub async fn sweep(&self) -> Result<u64> {
        let removed = self.store.sweep_attackerless().await?;
        metrics().attackerless_swept.inc_by(removed);
        if removed > 0 {
            info!(removed = removed, "Swept killmails without attackers");
        }
        Ok(removed)
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!("Projection refresh scheduler starting");
        let this = Arc::new(self);
        let timers = [
            (Job::Staleness, this.config.staleness_check_interval()),
            (Job::Daily, this.config.daily_refresh_interval()),
            (Job::Sweep, this.config.sweep_interval()),
        ];

        let mut tasks = JoinSet::new();
        for (job, period) in timers {
            tasks.spawn(this.clone().timer(job, period, shutdown.clone()));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Projection timer task failed: {}", e);
            }
        }

        health().workers.remove(WORKER_NAME);
        info!("Projection refresh scheduler stopped");
    }

    async fn timer(self: Arc<Self>, job: Job, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    health()
                        .workers
                        .beat(WORKER_NAME, self.config.staleness_check_interval());
                    tokio::select! {
                        biased;
                        _ = shutdown.wait_for(|stop| *stop) => {
                            warn!(job = job.as_str(), "Abandoning projection job on shutdown");
                            break;
                        }
                        _ = self.run_job(job) => {}
                    }
                }
            }
        }
    }

    async fn run_job(&self, job: Job) {
        match job {
            Job::Staleness => {
                if let Err(e) = self.check_staleness().await {
                    metrics().projection_refresh_errors.inc();
                    error!("Filter projection refresh failed: {}", e);
                }
            }
            Job::Daily => {
                if let Err(e) = self.refresh_daily().await {
                    metrics().projection_refresh_errors.inc();
                    error!("Daily activity refresh failed: {}", e);
                }
            }
            Job::Sweep => {
                if let Err(e) = self.sweep().await {
                    error!("Attackerless sweep failed: {}", e);
                }
            }
        }
    }
}
