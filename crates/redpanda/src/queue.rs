//! Queue capability: the traits workers are written against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;
use sync_core::Result;

/// Record header carrying the delivery attempt (1-based).
pub const ATTEMPT_HEADER: &str = "x-attempt";
/// Record header carrying the message priority.
pub const PRIORITY_HEADER: &str = "x-priority";
/// Record header explaining why a message was dead-lettered.
pub const DEAD_REASON_HEADER: &str = "x-dead-reason";

/// Highest priority a queue accepts.
pub const MAX_PRIORITY: u8 = 9;

/// Queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    /// Survives broker restarts. Redpanda topics always are.
    pub durable: bool,
    /// 0 disables priority ordering.
    pub max_priority: u8,
}

impl QueueSpec {
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            max_priority: 0,
        }
    }

    pub fn with_priority(mut self, max_priority: u8) -> Self {
        self.max_priority = max_priority.min(MAX_PRIORITY);
        self
    }
}

/// One claimed message. Must be settled with exactly one ack or nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    pub offset: i64,
    pub payload: Vec<u8>,
    /// 1 on first delivery.
    pub attempt: u32,
    pub priority: u8,
}

impl Delivery {
    /// Read attempt and priority headers, defaulting to a first delivery at priority 0.
    pub fn from_parts(
        queue: impl Into<String>,
        offset: i64,
        payload: Vec<u8>,
        headers: &BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            queue: queue.into(),
            offset,
            payload,
            attempt: header_num(headers, ATTEMPT_HEADER).unwrap_or(1).max(1),
            priority: header_num(headers, PRIORITY_HEADER).unwrap_or(0),
        }
    }
}

fn header_num<T: std::str::FromStr>(headers: &BTreeMap<String, Vec<u8>>, name: &str) -> Option<T> {
    std::str::from_utf8(headers.get(name)?).ok()?.parse().ok()
}

/// Build headers for a publish.
pub fn message_headers(attempt: u32, priority: u8) -> BTreeMap<String, Vec<u8>> {
    let mut headers = BTreeMap::new();
    headers.insert(ATTEMPT_HEADER.to_string(), attempt.to_string().into_bytes());
    headers.insert(PRIORITY_HEADER.to_string(), priority.to_string().into_bytes());
    headers
}

/// What to do with a delivery that was not processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackAction {
    /// Deliver again later with the attempt counter bumped.
    Requeue,
    /// Park in `<queue>.dead`.
    DeadLetter { reason: String },
}

/// Queue depth as reported to monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: String,
    pub pending: u64,
    pub consumers: u64,
}

#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Create the queue and its dead-letter queue if missing.
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<()>;

    async fn publish(&self, queue: &str, payload: Vec<u8>, priority: u8) -> Result<()>;

    /// Offset the next published message will get.
    async fn high_watermark(&self, queue: &str) -> Result<i64>;
}

#[async_trait]
pub trait QueueConsumer: Send + Sync {
    fn queue(&self) -> &str;

    /// Claim up to `max` deliveries, waiting up to `wait` when the queue is
    /// empty. Higher priority first within what is claimed.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    async fn nack(&self, delivery: &Delivery, action: NackAction) -> Result<()>;

    /// Offset to resume from after a restart: everything below it is settled.
    fn committed_offset(&self) -> i64;
}

/// Tracks settled offsets and the contiguous committed frontier.
#[derive(Debug, Clone)]
pub struct AckWindow {
    committed: i64,
    settled: BTreeSet<i64>,
}

impl AckWindow {
    pub fn new(start: i64) -> Self {
        Self {
            committed: start,
            settled: BTreeSet::new(),
        }
    }

    /// Mark one offset settled. Returns true if the frontier moved.
    pub fn settle(&mut self, offset: i64) -> bool {
        if offset < self.committed {
            return false;
        }
        self.settled.insert(offset);
        let before = self.committed;
        while self.settled.remove(&self.committed) {
            self.committed += 1;
        }
        self.committed != before
    }

    pub fn committed(&self) -> i64 {
        self.committed
    }

    /// Settled offsets still waiting on an earlier gap.
    pub fn pending_settled(&self) -> usize {
        self.settled.len()
    }
}

/// Stable sort, highest priority first.
pub fn order_by_priority(deliveries: &mut [Delivery]) {
    deliveries.sort_by(|a, b| b.priority.cmp(&a.priority));
}
