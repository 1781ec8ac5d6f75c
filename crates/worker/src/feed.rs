//! Killmail feed listener: RedisQ references onto the killmail queue.

use esi::KillmailFeed;
use redpanda::{killmail_queue_spec, QueuePublisher};
use std::sync::Arc;
use std::time::Duration;
use sync_core::Result;
use telemetry::health;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const WORKER_NAME: &str = "feed";

/// Pause after a failed poll or publish.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct FeedListener {
    feed: Arc<dyn KillmailFeed>,
    publisher: Arc<dyn QueuePublisher>,
    topic_prefix: String,
    quiet_period: Duration,
}

impl FeedListener {
    pub fn new(
        feed: Arc<dyn KillmailFeed>,
        publisher: Arc<dyn QueuePublisher>,
        topic_prefix: impl Into<String>,
        quiet_period: Duration,
    ) -> Self {
        Self {
            feed,
            publisher,
            topic_prefix: topic_prefix.into(),
            quiet_period,
        }
    }

    /// Poll once and forward what arrives. Returns whether a reference was queued.
    pub async fn poll_once(&self, queue: &str) -> Result<bool> {
        match self.feed.next().await? {
            Some(reference) => {
                self.publisher
                    .publish(queue, reference.to_bytes()?, 0)
                    .await?;
                debug!(killmail_id = reference.killmail_id, "Queued killmail from feed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let spec = killmail_queue_spec(&self.topic_prefix);
        self.publisher.declare_queue(&spec).await?;
        info!(queue = %spec.name, "Feed listener starting");

        let mut queued: u64 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }
            health().workers.beat(WORKER_NAME, self.quiet_period);

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                polled = self.poll_once(&spec.name) => match polled {
                    Ok(true) => queued += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(error = %e, "Feed poll failed");
                        tokio::select! {
                            _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                },
            }
        }

        health().workers.remove(WORKER_NAME);
        info!(queued = queued, "Feed listener stopped");
        Ok(())
    }
}
