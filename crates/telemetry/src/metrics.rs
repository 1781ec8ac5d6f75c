//! In-process metrics.
//!
//! Counters are logged periodically by the metrics loop. Nothing is pushed
//! to an external system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the sync pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Upstream
    pub upstream_requests: Counter,
    pub upstream_errors: Counter,
    pub upstream_not_found: Counter,
    pub upstream_latency_ms: Histogram,
    pub limiter_wait_ms: Histogram,
    pub limiter_in_flight: Gauge,
    pub error_limit_pauses: Counter,

    // Queue
    pub messages_published: Counter,
    pub publish_errors: Counter,
    pub messages_received: Counter,
    pub messages_acked: Counter,
    pub messages_requeued: Counter,
    pub messages_dead_lettered: Counter,
    pub messages_in_flight: Gauge,

    // Entity sync
    pub entities_upserted: Counter,
    pub entities_skipped: Counter,
    pub entities_gone: Counter,

    // Killmail ingestion
    pub killmails_ingested: Counter,
    pub killmails_duplicate: Counter,
    pub killmails_rejected: Counter,
    pub killmail_write_ms: Histogram,

    // Projections
    pub projection_refreshes: Counter,
    pub projection_refresh_errors: Counter,
    pub projection_refresh_ms: Histogram,
    pub daily_refreshes: Counter,
    pub projection_drift: Gauge,
    pub attackerless_swept: Counter,

    // Cache
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub refresh_requests: Counter,
    pub refresh_suppressed: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub upstream_requests: u64,
    pub upstream_errors: u64,
    pub upstream_latency_mean_ms: f64,
    pub limiter_in_flight: u64,
    pub messages_published: u64,
    pub messages_acked: u64,
    pub messages_requeued: u64,
    pub messages_dead_lettered: u64,
    pub messages_in_flight: u64,
    pub entities_upserted: u64,
    pub entities_skipped: u64,
    pub killmails_ingested: u64,
    pub killmails_duplicate: u64,
    pub killmails_rejected: u64,
    pub projection_refreshes: u64,
    pub projection_refresh_errors: u64,
    pub projection_drift: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            upstream_requests: self.upstream_requests.get(),
            upstream_errors: self.upstream_errors.get(),
            upstream_latency_mean_ms: self.upstream_latency_ms.mean(),
            limiter_in_flight: self.limiter_in_flight.get(),
            messages_published: self.messages_published.get(),
            messages_acked: self.messages_acked.get(),
            messages_requeued: self.messages_requeued.get(),
            messages_dead_lettered: self.messages_dead_lettered.get(),
            messages_in_flight: self.messages_in_flight.get(),
            entities_upserted: self.entities_upserted.get(),
            entities_skipped: self.entities_skipped.get(),
            killmails_ingested: self.killmails_ingested.get(),
            killmails_duplicate: self.killmails_duplicate.get(),
            killmails_rejected: self.killmails_rejected.get(),
            projection_refreshes: self.projection_refreshes.get(),
            projection_refresh_errors: self.projection_refresh_errors.get(),
            projection_drift: self.projection_drift.get(),
            cache_hits: self.cache_hits.get(),
            cache_misses: self.cache_misses.get(),
        }
    }

    /// Log a snapshot at info level.
    pub fn log_snapshot(&self) {
        let s = self.snapshot();
        tracing::info!(
            upstream_requests = s.upstream_requests,
            upstream_errors = s.upstream_errors,
            upstream_latency_mean_ms = s.upstream_latency_mean_ms,
            published = s.messages_published,
            acked = s.messages_acked,
            requeued = s.messages_requeued,
            dead_lettered = s.messages_dead_lettered,
            in_flight = s.messages_in_flight,
            upserted = s.entities_upserted,
            skipped = s.entities_skipped,
            killmails = s.killmails_ingested,
            rejected = s.killmails_rejected,
            refreshes = s.projection_refreshes,
            drift = s.projection_drift,
            cache_hits = s.cache_hits,
            cache_misses = s.cache_misses,
            "Metrics snapshot"
        );
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
