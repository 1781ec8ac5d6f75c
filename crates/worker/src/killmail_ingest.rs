//! Killmail ingestion: resolve a feed reference into a full killmail
//! and write it with its sub-records in one transaction.

use async_trait::async_trait;
use esi::EsiApi;
use redpanda::Delivery;
use std::sync::Arc;
use sync_core::{ErrorClass, InsertOutcome, KillmailRef, Result, Store};
use telemetry::metrics;
use tracing::debug;

use crate::consume::{log_terminal, InFlightIds, MessageHandler, Outcome};

pub struct KillmailIngestHandler {
    esi: Arc<dyn EsiApi>,
    store: Arc<dyn Store>,
    in_flight: InFlightIds,
}

impl KillmailIngestHandler {
    pub fn new(esi: Arc<dyn EsiApi>, store: Arc<dyn Store>) -> Self {
        Self {
            esi,
            store,
            in_flight: InFlightIds::new(),
        }
    }

    async fn ingest(&self, reference: &KillmailRef) -> Result<Outcome> {
        if self.store.killmail_exists(reference.killmail_id).await? {
            metrics().killmails_duplicate.inc();
            debug!(killmail_id = reference.killmail_id, "Killmail already ingested");
            return Ok(Outcome::Skipped);
        }

        let killmail = self
            .esi
            .fetch_killmail(reference.killmail_id, &reference.hash)
            .await?;

        match self.store.insert_killmail(&killmail).await? {
            InsertOutcome::Inserted => {
                metrics().killmails_ingested.inc();
                debug!(
                    killmail_id = killmail.killmail_id,
                    attackers = killmail.attackers.len(),
                    source = %reference.source,
                    "Killmail ingested"
                );
                Ok(Outcome::Processed)
            }
            InsertOutcome::AlreadyExists => {
                metrics().killmails_duplicate.inc();
                Ok(Outcome::Skipped)
            }
        }
    }
}

#[async_trait]
impl MessageHandler for KillmailIngestHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<Outcome> {
        let reference = KillmailRef::from_slice(&delivery.payload)?;

        let Some(_claim) = self.in_flight.claim(reference.killmail_id) else {
            metrics().killmails_duplicate.inc();
            return Ok(Outcome::Skipped);
        };

        let result = self.ingest(&reference).await;
        if let Err(e) = &result {
            if e.class() == ErrorClass::Validation {
                metrics().killmails_rejected.inc();
            }
            log_terminal("killmails", reference.killmail_id, e);
        }
        result
    }
}
