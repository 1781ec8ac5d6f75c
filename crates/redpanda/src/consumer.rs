//! Queue consumer over rskafka.
//!
//! Redpanda has no per-message acknowledgment, so it is built here:
//! - fetched records are buffered and handed out as [`Delivery`]s,
//!   highest priority first within each fetch
//! - ack and nack both settle the record's offset in an [`AckWindow`];
//!   the committed offset only moves past a contiguous settled run
//! - requeue re-publishes to the same topic with the attempt bumped,
//!   dead-letter publishes to `<queue>.dead`
//!
//! Records still unsettled when the process stops are redelivered after a
//! restart from the committed offset.

use async_trait::async_trait;
use parking_lot::Mutex;
use rskafka::client::partition::OffsetAt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{Error, QueueErrorCode, Result};
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::producer::Producer;
use crate::queue::{
    message_headers, order_by_priority, AckWindow, Delivery, NackAction, QueueConsumer,
    DEAD_REASON_HEADER,
};
use crate::topics::dead_letter_queue;

/// Where a consumer starts when it has no checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    Earliest,
    Latest,
    At(i64),
}

#[derive(Debug)]
struct State {
    /// Next offset to fetch; `None` until resolved against the broker.
    next_fetch: Option<i64>,
    window: AckWindow,
    buffer: VecDeque<Delivery>,
}

/// Consumer for one queue.
pub struct Consumer {
    queue: String,
    start: StartOffset,
    producer: Arc<Producer>,
    state: Mutex<State>,
}

impl Consumer {
    /// Creates a consumer. Requeues and dead-letters go through `producer`.
    pub fn new(queue: impl Into<String>, start: StartOffset, producer: Arc<Producer>) -> Self {
        let queue = queue.into();
        info!(queue = %queue, start = ?start, "Creating queue consumer");

        let initial = match start {
            StartOffset::At(offset) => Some(offset),
            _ => None,
        };

        Self {
            queue,
            start,
            producer,
            state: Mutex::new(State {
                next_fetch: initial,
                window: AckWindow::new(initial.unwrap_or(0)),
                buffer: VecDeque::new(),
            }),
        }
    }

    async fn resolve_start(&self) -> Result<i64> {
        let known = self.state.lock().next_fetch;
        if let Some(offset) = known {
            return Ok(offset);
        }

        let at = match self.start {
            StartOffset::Latest => OffsetAt::Latest,
            _ => OffsetAt::Earliest,
        };
        let partition = self.producer.partition(&self.queue).await?;
        let offset = partition.get_offset(at).await.map_err(|e| {
            Error::queue(
                QueueErrorCode::Unavailable,
                format!("failed to resolve start offset for {}: {}", self.queue, e),
            )
        })?;

        let mut state = self.state.lock();
        if state.next_fetch.is_none() {
            state.next_fetch = Some(offset);
            state.window = AckWindow::new(offset);
            info!(queue = %self.queue, offset = offset, "Consumer initialized at offset");
        }
        Ok(state.next_fetch.unwrap_or(offset))
    }

    fn take_buffered(&self, max: usize) -> Vec<Delivery> {
        let mut state = self.state.lock();
        let n = max.min(state.buffer.len());
        state.buffer.drain(..n).collect()
    }

    async fn fetch(&self, wait: Duration) -> Result<()> {
        let offset = self.resolve_start().await?;
        let partition = self.producer.partition(&self.queue).await?;
        let config = self.producer.config();
        let wait = wait.min(config.fetch_wait());

        let fetched = partition
            .fetch_records(offset, 1..config.fetch_max_bytes, wait.as_millis() as i32)
            .await;
        let (records, high_watermark) = match fetched {
            Ok(r) => r,
            Err(e) => {
                self.producer.forget(&self.queue).await;
                return Err(Error::queue(
                    QueueErrorCode::Unavailable,
                    format!("fetch from {} failed: {}", self.queue, e),
                ));
            }
        };

        let mut deliveries = Vec::with_capacity(records.len());
        let mut empty = Vec::new();
        let mut next = offset;
        for r in records {
            // Compacted batches can return records below the requested offset.
            if r.offset < offset {
                continue;
            }
            next = next.max(r.offset + 1);
            match r.record.value {
                Some(value) => deliveries.push(Delivery::from_parts(
                    self.queue.clone(),
                    r.offset,
                    value,
                    &r.record.headers,
                )),
                None => empty.push(r.offset),
            }
        }
        order_by_priority(&mut deliveries);

        let mut state = self.state.lock();
        state.next_fetch = Some(next);
        for offset in empty {
            state.window.settle(offset);
        }
        metrics().messages_received.inc_by(deliveries.len() as u64);
        debug!(
            queue = %self.queue,
            fetched = deliveries.len(),
            from = offset,
            to = next,
            high_watermark = high_watermark,
            "Fetched deliveries"
        );
        state.buffer.extend(deliveries);
        Ok(())
    }

    fn settle(&self, delivery: &Delivery) {
        let mut state = self.state.lock();
        if state.window.settle(delivery.offset) {
            debug!(
                queue = %self.queue,
                committed = state.window.committed(),
                "Committed offset advanced"
            );
        }
    }
}

#[async_trait]
impl QueueConsumer for Consumer {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let buffered = self.take_buffered(max);
        if !buffered.is_empty() {
            return Ok(buffered);
        }
        self.fetch(wait).await?;
        Ok(self.take_buffered(max))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.settle(delivery);
        metrics().messages_acked.inc();
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, action: NackAction) -> Result<()> {
        match action {
            NackAction::Requeue => {
                let headers = message_headers(delivery.attempt + 1, delivery.priority);
                self.producer
                    .send(&self.queue, delivery.payload.clone(), headers)
                    .await
                    .map_err(|e| {
                        Error::queue(
                            QueueErrorCode::AckFailed,
                            format!("requeue of {}@{} failed: {}", self.queue, delivery.offset, e),
                        )
                    })?;
                metrics().messages_requeued.inc();
            }
            NackAction::DeadLetter { reason } => {
                let mut headers = message_headers(delivery.attempt, delivery.priority);
                headers.insert(DEAD_REASON_HEADER.to_string(), reason.clone().into_bytes());
                let dead = dead_letter_queue(&self.queue);
                self.producer
                    .send(&dead, delivery.payload.clone(), headers)
                    .await
                    .map_err(|e| {
                        Error::queue(
                            QueueErrorCode::AckFailed,
                            format!("dead-letter of {}@{} failed: {}", self.queue, delivery.offset, e),
                        )
                    })?;
                metrics().messages_dead_lettered.inc();
                warn!(
                    queue = %self.queue,
                    offset = delivery.offset,
                    attempt = delivery.attempt,
                    reason = %reason,
                    "Message dead-lettered"
                );
            }
        }
        // The copy is durable; the original can be released.
        self.settle(delivery);
        Ok(())
    }

    fn committed_offset(&self) -> i64 {
        self.state.lock().window.committed()
    }
}
