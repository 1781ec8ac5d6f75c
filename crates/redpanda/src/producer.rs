//! Queue publisher over rskafka.

use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::{
    partition::{Compression, OffsetAt, PartitionClient, UnknownTopicHandling},
    Client,
};
use rskafka::record::Record;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use sync_core::{Error, QueueErrorCode, Result};
use telemetry::metrics;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::RedpandaConfig;
use crate::connection::connect;
use crate::queue::{message_headers, QueuePublisher, QueueSpec, MAX_PRIORITY};
use crate::topics::dead_letter_queue;

/// Queue publisher. One broker connection, cached partition clients per topic.
pub struct Producer {
    config: RedpandaConfig,
    client: RwLock<Option<Arc<Client>>>,
    partitions: RwLock<BTreeMap<String, Arc<PartitionClient>>>,
}

impl Producer {
    pub fn new(config: RedpandaConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
            partitions: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &RedpandaConfig {
        &self.config
    }

    /// Connect now rather than on first use.
    pub async fn connect(&self) -> Result<()> {
        self.client().await.map(|_| ())
    }

    async fn client(&self) -> Result<Arc<Client>> {
        {
            let client = self.client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let client = Arc::new(connect(&self.config).await?);
        *self.client.write().await = Some(client.clone());
        info!(brokers = %self.config.broker_string(), "Connected to Redpanda");
        Ok(client)
    }

    /// Gets or creates the partition client for a queue topic.
    pub(crate) async fn partition(&self, topic: &str) -> Result<Arc<PartitionClient>> {
        {
            let partitions = self.partitions.read().await;
            if let Some(p) = partitions.get(topic) {
                return Ok(p.clone());
            }
        }

        let client = self.client().await?;
        let partition = client
            .partition_client(topic.to_string(), 0, UnknownTopicHandling::Error)
            .await
            .map_err(|e| {
                Error::queue(
                    QueueErrorCode::Unavailable,
                    format!("no partition client for {}: {}", topic, e),
                )
            })?;
        let partition = Arc::new(partition);

        self.partitions
            .write()
            .await
            .insert(topic.to_string(), partition.clone());
        Ok(partition)
    }

    /// Drop a cached partition client after an error so the next call reconnects.
    pub(crate) async fn forget(&self, topic: &str) {
        self.partitions.write().await.remove(topic);
    }

    /// Produce one record. Returns its offset.
    pub async fn send(
        &self,
        topic: &str,
        payload: Vec<u8>,
        headers: BTreeMap<String, Vec<u8>>,
    ) -> Result<i64> {
        let partition = self.partition(topic).await?;
        let start = std::time::Instant::now();

        let record = Record {
            key: None,
            value: Some(payload),
            headers,
            timestamp: Utc::now(),
        };

        match partition.produce(vec![record], Compression::NoCompression).await {
            Ok(offsets) => {
                metrics().messages_published.inc();
                debug!(
                    topic = %topic,
                    latency_ms = %start.elapsed().as_millis(),
                    "Published message"
                );
                Ok(offsets.first().copied().unwrap_or_default())
            }
            Err(e) => {
                error!(topic = %topic, "Failed to publish: {}", e);
                metrics().publish_errors.inc();
                self.forget(topic).await;
                Err(Error::queue(
                    QueueErrorCode::PublishFailed,
                    format!("publish to {} failed: {}", topic, e),
                ))
            }
        }
    }

    async fn create_missing(&self, names: &[String]) -> Result<()> {
        let client = self.client().await?;
        let existing: HashSet<String> = client
            .list_topics()
            .await
            .map_err(|e| {
                Error::queue(
                    QueueErrorCode::Unavailable,
                    format!("failed to list topics: {}", e),
                )
            })?
            .into_iter()
            .map(|t| t.name)
            .collect();

        let controller = client.controller_client().map_err(|e| {
            Error::queue(
                QueueErrorCode::Unavailable,
                format!("no controller client: {}", e),
            )
        })?;

        for name in names.iter().filter(|n| !existing.contains(*n)) {
            controller
                .create_topic(
                    name.clone(),
                    1,
                    self.config.replication_factor,
                    self.config.request_timeout_ms as i32,
                )
                .await
                .map_err(|e| {
                    Error::queue(
                        QueueErrorCode::Unavailable,
                        format!("failed to create {}: {}", name, e),
                    )
                })?;
            info!(topic = %name, "Created queue topic");
        }
        Ok(())
    }
}

#[async_trait]
impl QueuePublisher for Producer {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<()> {
        self.create_missing(&[spec.name.clone(), dead_letter_queue(&spec.name)])
            .await?;
        debug!(
            queue = %spec.name,
            durable = spec.durable,
            max_priority = spec.max_priority,
            "Queue declared"
        );
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>, priority: u8) -> Result<()> {
        self.send(queue, payload, message_headers(1, priority.min(MAX_PRIORITY)))
            .await
            .map(|_| ())
    }

    async fn high_watermark(&self, queue: &str) -> Result<i64> {
        let partition = self.partition(queue).await?;
        partition.get_offset(OffsetAt::Latest).await.map_err(|e| {
            Error::queue(
                QueueErrorCode::Unavailable,
                format!("failed to read {} watermark: {}", queue, e),
            )
        })
    }
}
