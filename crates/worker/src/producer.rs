//! Sync producer: enumerate an entity kind's ID space and queue one
//! message per ID.

use esi::EsiApi;
use redpanda::{entity_queue, entity_queue_spec, QueuePublisher};
use serde::Serialize;
use std::sync::Arc;
use sync_core::{source, EntityKind, QueueMessage, Result, Store};
use tracing::{info, warn};

/// Totals of one `publish_all` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    pub requested: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct SyncProducer {
    esi: Arc<dyn EsiApi>,
    store: Arc<dyn Store>,
    publisher: Arc<dyn QueuePublisher>,
    topic_prefix: String,
}

impl SyncProducer {
    pub fn new(
        esi: Arc<dyn EsiApi>,
        store: Arc<dyn Store>,
        publisher: Arc<dyn QueuePublisher>,
        topic_prefix: impl Into<String>,
    ) -> Self {
        Self {
            esi,
            store,
            publisher,
            topic_prefix: topic_prefix.into(),
        }
    }

    /// The authoritative ID set. Dependent kinds come from local killmail
    /// participants, everything else from the upstream list endpoint.
    pub async fn enumerate(&self, kind: EntityKind) -> Result<Vec<i64>> {
        if kind.is_dependent() {
            self.store.known_entity_ids(kind).await
        } else {
            self.esi.list_ids(kind).await
        }
    }

    /// Queue every ID of `kind`.
    ///
    /// Enumeration failures abort before anything is queued. A failed
    /// publish is logged and counted; the remaining IDs are still sent.
    pub async fn publish_all(&self, kind: EntityKind) -> Result<PublishSummary> {
        let ids = self.enumerate(kind).await?;
        let spec = entity_queue_spec(&self.topic_prefix, kind);
        self.publisher.declare_queue(&spec).await?;
        let queue = entity_queue(&self.topic_prefix, kind);

        let mut summary = PublishSummary {
            requested: ids.len(),
            ..Default::default()
        };
        info!(kind = %kind, queue = %queue, ids = ids.len(), "Publishing sync messages");

        for id in ids {
            let sent = match QueueMessage::new(id, source::SYNC).to_bytes() {
                Ok(payload) => self.publisher.publish(&queue, payload, 0).await,
                Err(e) => Err(e),
            };
            match sent {
                Ok(()) => summary.published += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(kind = %kind, entity_id = id, error = %e, "Failed to queue entity");
                }
            }
        }

        info!(
            kind = %kind,
            requested = summary.requested,
            published = summary.published,
            failed = summary.failed,
            "Sync run queued"
        );
        Ok(summary)
    }
}
