//! Worker scheduler: starts the configured roles and hands each the
//! shutdown signal.

use async_trait::async_trait;
use esi::{EsiApi, KillmailFeed};
use redpanda::{
    entity_queue_spec, killmail_queue_spec, Consumer, Producer, QueueConsumer, QueuePublisher,
    QueueSpec, StartOffset,
};
use std::sync::Arc;
use sync_core::{EntityKind, Result, Store};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{Role, WorkerConfig};
use crate::consume::{MessageHandler, QueueWorker};
use crate::entity_sync::EntitySyncHandler;
use crate::feed::FeedListener;
use crate::killmail_ingest::KillmailIngestHandler;
use crate::projection_refresh::ProjectionRefresher;

/// Opens consumers. Lets the scheduler run against any queue backend.
#[async_trait]
pub trait QueueConnector: Send + Sync {
    /// A consumer for `queue`, resuming at `resume_from` when a checkpoint exists.
    async fn consumer(&self, queue: &str, resume_from: Option<i64>) -> Result<Arc<dyn QueueConsumer>>;
}

/// Redpanda consumers sharing one producer for requeues and dead-letters.
pub struct RedpandaConnector {
    producer: Arc<Producer>,
}

impl RedpandaConnector {
    pub fn new(producer: Arc<Producer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl QueueConnector for RedpandaConnector {
    async fn consumer(&self, queue: &str, resume_from: Option<i64>) -> Result<Arc<dyn QueueConsumer>> {
        let start = resume_from.map_or(StartOffset::Earliest, StartOffset::At);
        Ok(Arc::new(Consumer::new(queue, start, self.producer.clone())))
    }
}

/// Everything the worker roles need.
pub struct WorkerDeps {
    pub esi: Arc<dyn EsiApi>,
    pub store: Arc<dyn Store>,
    pub publisher: Arc<dyn QueuePublisher>,
    pub connector: Arc<dyn QueueConnector>,
    pub feed: Option<Arc<dyn KillmailFeed>>,
}

pub struct WorkerScheduler {
    config: WorkerConfig,
    topic_prefix: String,
    deps: WorkerDeps,
}

impl WorkerScheduler {
    pub fn new(config: WorkerConfig, topic_prefix: impl Into<String>, deps: WorkerDeps) -> Self {
        Self {
            config,
            topic_prefix: topic_prefix.into(),
            deps,
        }
    }

    /// Starts every configured role. Each task exits when `shutdown` flips.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        if self.config.runs(Role::Entities) {
            for kind in EntityKind::ALL {
                let handler = EntitySyncHandler::new(
                    kind,
                    self.deps.esi.clone(),
                    self.deps.store.clone(),
                );
                let spec = entity_queue_spec(&self.topic_prefix, kind);
                let name = format!("entity.{}", kind);
                handles.push(self.spawn_queue_worker(name, spec, handler, shutdown.clone()).await?);
            }
            info!(kinds = EntityKind::ALL.len(), "Entity sync workers started");
        }

        if self.config.runs(Role::Killmails) {
            let handler =
                KillmailIngestHandler::new(self.deps.esi.clone(), self.deps.store.clone());
            let spec = killmail_queue_spec(&self.topic_prefix);
            handles.push(
                self.spawn_queue_worker("killmails".to_string(), spec, handler, shutdown.clone())
                    .await?,
            );
            info!("Killmail ingestion worker started");
        }

        if self.config.runs(Role::Feed) {
            if let Some(feed) = &self.deps.feed {
                let listener = FeedListener::new(
                    feed.clone(),
                    self.deps.publisher.clone(),
                    self.topic_prefix.clone(),
                    self.config.quiet_period(),
                );
                let rx = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    if let Err(e) = listener.run(rx).await {
                        error!("Feed listener fatal error: {}", e);
                    }
                }));
                info!("Feed listener started");
            }
        }

        if self.config.runs(Role::Projections) {
            let refresher = ProjectionRefresher::new(self.deps.store.clone(), self.config.clone());
            let rx = shutdown.clone();
            handles.push(tokio::spawn(refresher.run(rx)));
            info!("Projection refresh scheduler started");
        }

        info!(tasks = handles.len(), "Background workers started");
        Ok(handles)
    }

    async fn spawn_queue_worker<H: MessageHandler>(
        &self,
        name: String,
        spec: QueueSpec,
        handler: H,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>> {
        self.deps.publisher.declare_queue(&spec).await?;
        let resume_from = self.deps.store.queue_offset(&spec.name).await?;
        let consumer = self.deps.connector.consumer(&spec.name, resume_from).await?;

        let worker = QueueWorker::new(
            name,
            consumer,
            self.deps.store.clone(),
            Arc::new(handler),
            self.config.clone(),
        );
        Ok(tokio::spawn(async move {
            let name = worker.name().to_string();
            if let Err(e) = worker.run(shutdown).await {
                error!(worker = %name, "Queue worker fatal error: {}", e);
            }
        }))
    }
}
