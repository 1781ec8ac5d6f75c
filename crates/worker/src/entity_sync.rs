//! Entity sync: one upstream fetch and upsert per queue message.

use async_trait::async_trait;
use esi::EsiApi;
use redpanda::Delivery;
use std::sync::Arc;
use sync_core::{EntityKind, QueueMessage, Result, Store};
use telemetry::metrics;
use tracing::debug;

use crate::consume::{log_terminal, InFlightIds, MessageHandler, Outcome};

/// Handles `QueueMessage`s for one entity kind.
pub struct EntitySyncHandler {
    kind: EntityKind,
    esi: Arc<dyn EsiApi>,
    store: Arc<dyn Store>,
    in_flight: InFlightIds,
}

impl EntitySyncHandler {
    pub fn new(kind: EntityKind, esi: Arc<dyn EsiApi>, store: Arc<dyn Store>) -> Self {
        Self {
            kind,
            esi,
            store,
            in_flight: InFlightIds::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn sync(&self, entity_id: i64) -> Result<Outcome> {
        if self.kind.is_reference() && self.store.entity_exists(self.kind, entity_id).await? {
            metrics().entities_skipped.inc();
            debug!(kind = %self.kind, entity_id = entity_id, "Reference entity present, skipping");
            return Ok(Outcome::Skipped);
        }

        let record = self.esi.fetch_entity(self.kind, entity_id).await?;
        self.store.upsert_entity(&record).await?;
        metrics().entities_upserted.inc();
        debug!(kind = %self.kind, entity_id = entity_id, name = %record.name(), "Entity synced");
        Ok(Outcome::Processed)
    }
}

#[async_trait]
impl MessageHandler for EntitySyncHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<Outcome> {
        let message = QueueMessage::from_slice(&delivery.payload)?;

        let Some(_claim) = self.in_flight.claim(message.entity_id) else {
            metrics().entities_skipped.inc();
            debug!(kind = %self.kind, entity_id = message.entity_id, "Already in flight, skipping");
            return Ok(Outcome::Skipped);
        };

        let result = self.sync(message.entity_id).await;
        if let Err(e) = &result {
            if e.class() == sync_core::ErrorClass::NotFound {
                metrics().entities_gone.inc();
            }
            log_terminal(self.kind.as_str(), message.entity_id, e);
        }
        result
    }
}
