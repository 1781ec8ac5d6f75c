//! Queue consume loop shared by the entity and killmail workers.
//!
//! Receives up to `prefetch` deliveries, runs the handler on each
//! concurrently, and settles every delivery exactly once based on the
//! handler's result:
//!
//! | result                         | settlement                    |
//! |--------------------------------|-------------------------------|
//! | processed / skipped            | ack                           |
//! | not found upstream             | ack                           |
//! | duplicate write                | ack                           |
//! | transient, attempts left       | requeue                       |
//! | transient, attempts exhausted  | dead-letter                   |
//! | validation / fatal             | dead-letter                   |
//!
//! Nothing is acked before the handler finishes. A settlement the broker
//! rejects is retried with backoff, since an unsettled offset holds the
//! checkpoint back. On shutdown the loop stops receiving, gives in-flight
//! handlers and pending settlements a grace period, abandons the rest to
//! redelivery, and writes a final offset checkpoint.

use async_trait::async_trait;
use parking_lot::Mutex;
use redpanda::{Delivery, NackAction, QueueConsumer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{Error, ErrorClass, Result, Store};
use telemetry::{health, metrics};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;

/// What a handler did with a message it did not fail on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Fetched and written.
    Processed,
    /// Already present or already being handled; no upstream call spent.
    Skipped,
}

/// Per-message work. One instance is shared by all concurrent deliveries.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, delivery: &Delivery) -> Result<Outcome>;
}

/// How a finished delivery is settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settle {
    Ack,
    Nack(NackAction),
}

/// Map a handler result onto a settlement.
pub fn disposition(result: &Result<Outcome>, attempt: u32, max_attempts: u32) -> Settle {
    let err = match result {
        Ok(_) => return Settle::Ack,
        Err(e) => e,
    };
    match err.class() {
        ErrorClass::NotFound | ErrorClass::Duplicate => Settle::Ack,
        ErrorClass::Transient if attempt < max_attempts => Settle::Nack(NackAction::Requeue),
        ErrorClass::Transient => Settle::Nack(NackAction::DeadLetter {
            reason: format!("gave up after {} attempts: {}", attempt, err),
        }),
        ErrorClass::Validation | ErrorClass::Fatal => Settle::Nack(NackAction::DeadLetter {
            reason: err.to_string(),
        }),
    }
}

/// IDs currently being handled by this process.
///
/// A second delivery of an ID that is still in flight is acked as a
/// skip: the first delivery either writes it or requeues itself.
#[derive(Debug, Default)]
pub struct InFlightIds {
    ids: Arc<Mutex<HashSet<i64>>>,
}

impl InFlightIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`. `None` if another delivery holds it.
    pub fn claim(&self, id: i64) -> Option<InFlightGuard> {
        if self.ids.lock().insert(id) {
            Some(InFlightGuard {
                ids: self.ids.clone(),
                id,
            })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct InFlightGuard {
    ids: Arc<Mutex<HashSet<i64>>>,
    id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids.lock().remove(&self.id);
    }
}

/// Counters since the last idle summary.
#[derive(Debug, Default, Clone, Copy)]
struct RunStats {
    processed: u64,
    skipped: u64,
    gone: u64,
    requeued: u64,
    dead_lettered: u64,
}

impl RunStats {
    fn total(&self) -> u64 {
        self.processed + self.skipped + self.gone + self.requeued + self.dead_lettered
    }
}

/// A settlement the broker rejected, waiting for its next attempt.
struct PendingSettle {
    delivery: Delivery,
    settle: Settle,
    failures: u32,
    retry_at: Instant,
}

/// Long-lived consumer of one queue.
pub struct QueueWorker<H> {
    name: String,
    consumer: Arc<dyn QueueConsumer>,
    store: Arc<dyn Store>,
    handler: Arc<H>,
    config: WorkerConfig,
    stats: RunStats,
    pending: Vec<PendingSettle>,
    last_checkpoint: Option<(Instant, i64)>,
}

impl<H: MessageHandler> QueueWorker<H> {
    pub fn new(
        name: impl Into<String>,
        consumer: Arc<dyn QueueConsumer>,
        store: Arc<dyn Store>,
        handler: Arc<H>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            consumer,
            store,
            handler,
            config,
            stats: RunStats::default(),
            pending: Vec::new(),
            last_checkpoint: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consume until `shutdown` flips to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let prefetch = self.config.prefetch.max(1);
        let quiet_period = self.config.quiet_period();
        info!(
            worker = %self.name,
            queue = %self.consumer.queue(),
            prefetch = prefetch,
            "Queue worker starting"
        );

        let mut tasks: JoinSet<(Delivery, Result<Outcome>)> = JoinSet::new();
        let mut last_delivery = Instant::now();
        let mut idle_ticker = tokio::time::interval(
            quiet_period
                .min(Duration::from_secs(5))
                .max(Duration::from_millis(10)),
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            // Deliveries awaiting a settle retry still count against prefetch.
            let capacity = prefetch.saturating_sub(tasks.len() + self.pending.len());
            let next_retry = self.next_retry();

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.settle_joined(joined).await;
                }

                _ = tokio::time::sleep_until(next_retry.unwrap_or_else(Instant::now)),
                    if next_retry.is_some() =>
                {
                    self.retry_pending().await;
                }

                received = self.consumer.receive(capacity, self.config.receive_wait()),
                    if capacity > 0 =>
                {
                    match received {
                        Ok(deliveries) => {
                            if !deliveries.is_empty() {
                                last_delivery = Instant::now();
                            }
                            for delivery in deliveries {
                                self.spawn(&mut tasks, delivery);
                            }
                        }
                        Err(e) => {
                            error!(worker = %self.name, error = %e, "Receive failed");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }

                _ = idle_ticker.tick() => {
                    health().workers.beat(&self.name, quiet_period);
                    if tasks.is_empty() && last_delivery.elapsed() >= quiet_period {
                        self.log_idle_summary();
                    }
                }
            }

            self.checkpoint(false).await;
        }

        let deadline = Instant::now() + self.config.shutdown_grace();
        self.drain(tasks, deadline).await;
        self.flush_pending(deadline).await;
        self.checkpoint(true).await;
        health().workers.remove(&self.name);
        info!(worker = %self.name, "Queue worker stopped");
        Ok(())
    }

    fn spawn(&self, tasks: &mut JoinSet<(Delivery, Result<Outcome>)>, delivery: Delivery) {
        let handler = self.handler.clone();
        metrics().messages_in_flight.inc();
        tasks.spawn(async move {
            let result = handler.handle(&delivery).await;
            (delivery, result)
        });
    }

    async fn settle_joined(
        &mut self,
        joined: std::result::Result<(Delivery, Result<Outcome>), tokio::task::JoinError>,
    ) {
        metrics().messages_in_flight.dec();
        match joined {
            Ok((delivery, result)) => self.settle(delivery, result).await,
            // The delivery stays unsettled and is replayed after a restart.
            Err(e) => error!(worker = %self.name, error = %e, "Handler task failed"),
        }
    }

    async fn settle(&mut self, delivery: Delivery, result: Result<Outcome>) {
        let settle = disposition(&result, delivery.attempt, self.config.max_attempts);
        match (&result, &settle) {
            (Ok(Outcome::Processed), _) => self.stats.processed += 1,
            (Ok(Outcome::Skipped), _) => self.stats.skipped += 1,
            (Err(e), Settle::Ack) => {
                debug!(worker = %self.name, offset = delivery.offset, reason = %e, "Acked without write");
                self.stats.gone += 1;
            }
            (Err(e), Settle::Nack(NackAction::Requeue)) => {
                warn!(
                    worker = %self.name,
                    offset = delivery.offset,
                    attempt = delivery.attempt,
                    error = %e,
                    "Requeueing message"
                );
                self.stats.requeued += 1;
            }
            (Err(_), Settle::Nack(NackAction::DeadLetter { .. })) => self.stats.dead_lettered += 1,
        }

        self.apply(delivery, settle, 0).await;
    }

    async fn apply(&mut self, delivery: Delivery, settle: Settle, failures: u32) {
        let settled = match &settle {
            Settle::Ack => self.consumer.ack(&delivery).await,
            Settle::Nack(action) => self.consumer.nack(&delivery, action.clone()).await,
        };
        match settled {
            Ok(()) if failures > 0 => {
                info!(worker = %self.name, offset = delivery.offset, failures = failures, "Settled delivery after retry");
            }
            Ok(()) => {}
            Err(e) => {
                let failures = failures + 1;
                let delay = self.config.settle_backoff().delay(failures);
                error!(
                    worker = %self.name,
                    offset = delivery.offset,
                    failures = failures,
                    retry_ms = delay.as_millis() as u64,
                    error = %e,
                    "Failed to settle delivery"
                );
                self.pending.push(PendingSettle {
                    delivery,
                    settle,
                    failures,
                    retry_at: Instant::now() + delay,
                });
            }
        }
    }

    fn next_retry(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.retry_at).min()
    }

    async fn retry_pending(&mut self) {
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.retry_at <= now);
        self.pending = waiting;
        for p in due {
            self.apply(p.delivery, p.settle, p.failures).await;
        }
    }

    /// Keep retrying rejected settlements until they land or `deadline` passes.
    async fn flush_pending(&mut self, deadline: Instant) {
        while let Some(next) = self.next_retry() {
            if next > deadline {
                // Unsettled: replayed after a restart.
                warn!(
                    worker = %self.name,
                    unsettled = self.pending.len(),
                    "Grace period elapsed, leaving unsettled messages to redelivery"
                );
                self.pending.clear();
                return;
            }
            tokio::time::sleep_until(next).await;
            self.retry_pending().await;
        }
    }

    /// Let in-flight handlers finish within the grace period.
    async fn drain(&mut self, mut tasks: JoinSet<(Delivery, Result<Outcome>)>, deadline: Instant) {
        if tasks.is_empty() {
            return;
        }
        info!(worker = %self.name, in_flight = tasks.len(), "Draining in-flight messages");

        while !tasks.is_empty() {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => self.settle_joined(joined).await,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        worker = %self.name,
                        abandoned = tasks.len(),
                        "Grace period elapsed, abandoning in-flight messages to redelivery"
                    );
                    for _ in 0..tasks.len() {
                        metrics().messages_in_flight.dec();
                    }
                    tasks.abort_all();
                    break;
                }
            }
        }
    }

    async fn checkpoint(&mut self, force: bool) {
        let committed = self.consumer.committed_offset();
        let due = match self.last_checkpoint {
            None => true,
            Some((at, offset)) => {
                offset != committed && (force || at.elapsed() >= self.config.checkpoint_interval())
            }
        };
        if !due {
            return;
        }
        match self.store.save_queue_offset(self.consumer.queue(), committed).await {
            Ok(()) => {
                self.last_checkpoint = Some((Instant::now(), committed));
                debug!(worker = %self.name, offset = committed, "Offset checkpointed");
            }
            Err(e) => warn!(worker = %self.name, error = %e, "Offset checkpoint failed"),
        }
    }

    fn log_idle_summary(&mut self) {
        if self.stats.total() == 0 {
            return;
        }
        let s = std::mem::take(&mut self.stats);
        info!(
            worker = %self.name,
            queue = %self.consumer.queue(),
            processed = s.processed,
            skipped = s.skipped,
            gone = s.gone,
            requeued = s.requeued,
            dead_lettered = s.dead_lettered,
            "Queue drained"
        );
    }
}

/// Log a handler error that will not be retried. Data-quality events
/// (validation failures) are errors; upstream deletions are routine.
pub(crate) fn log_terminal(worker: &str, id: i64, err: &Error) {
    match err.class() {
        ErrorClass::NotFound => debug!(worker = worker, id = id, "Gone upstream"),
        ErrorClass::Duplicate => debug!(worker = worker, id = id, "Written concurrently"),
        ErrorClass::Validation => error!(worker = worker, id = id, error = %err, "Rejected invalid record"),
        ErrorClass::Fatal => error!(worker = worker, id = id, error = %err, "Unrecoverable handler error"),
        ErrorClass::Transient => {}
    }
}
