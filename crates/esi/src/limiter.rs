//! Upstream rate limiter.
//!
//! Two bounds compose: at most `max_concurrent` calls in flight, and at
//! most `max_per_window` calls started in any sliding `window`. Both
//! admission queues are FIFO (tokio's semaphore and mutex are fair), so a
//! busy worker cannot starve the others.
//!
//! The wrapped task's own failure passes through untouched. Permits are
//! RAII guards, so a task that errors or panics still releases its slot.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sync_core::Error;
use telemetry::metrics;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_concurrent: usize,
    pub max_per_window: usize,
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 20,
            max_per_window: 100,
            window: Duration::from_secs(1),
        }
    }
}

/// Shared upstream call limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    permits: Semaphore,
    /// Start times of calls inside the current window.
    starts: Mutex<VecDeque<Instant>>,
    /// Admission is held until this deadline passes.
    paused_until: parking_lot::Mutex<Option<Instant>>,
    in_flight: AtomicUsize,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let config = RateLimiterConfig {
            max_concurrent: config.max_concurrent.max(1),
            max_per_window: config.max_per_window.max(1),
            window: config.window,
        };
        Self {
            permits: Semaphore::new(config.max_concurrent),
            starts: Mutex::new(VecDeque::with_capacity(config.max_per_window)),
            paused_until: parking_lot::Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            config,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Calls currently holding a concurrency slot.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop admitting new calls until `until`. Calls already running are
    /// unaffected. A later deadline extends an earlier one.
    pub fn pause_until(&self, until: Instant) {
        let extended = {
            let mut slot = self.paused_until.lock();
            match *slot {
                Some(current) if current >= until => false,
                _ => {
                    *slot = Some(until);
                    true
                }
            }
        };
        if extended {
            metrics().error_limit_pauses.inc();
            warn!(
                pause_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Upstream admission paused"
            );
        }
    }

    /// Run `task` once admitted.
    pub async fn execute<F, Fut, T, E>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Error>,
    {
        let queued_at = Instant::now();

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::internal("rate limiter closed"))?;

        self.admit().await;

        let waited = queued_at.elapsed();
        metrics().limiter_wait_ms.observe(waited.as_millis() as u64);
        if waited > self.config.window {
            debug!(waited_ms = waited.as_millis() as u64, "Upstream call delayed by limiter");
        }

        let _guard = InFlight::enter(&self.in_flight);
        task().await
    }

    /// Wait for any pause to lapse, then claim a slot in the sliding window.
    async fn admit(&self) {
        // Holding the lock while sleeping keeps admission strictly FIFO.
        let mut starts = self.starts.lock().await;
        loop {
            let paused = *self.paused_until.lock();
            if let Some(until) = paused {
                if until > Instant::now() {
                    sleep_until(until).await;
                    continue;
                }
            }

            let now = Instant::now();
            while let Some(&front) = starts.front() {
                if now.duration_since(front) >= self.config.window {
                    starts.pop_front();
                } else {
                    break;
                }
            }

            if starts.len() < self.config.max_per_window {
                starts.push_back(now);
                return;
            }

            if let Some(&oldest) = starts.front() {
                sleep_until(oldest + self.config.window).await;
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

/// Decrements the in-flight count on drop, including on unwind.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        metrics().limiter_in_flight.inc();
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
        metrics().limiter_in_flight.dec();
    }
}
