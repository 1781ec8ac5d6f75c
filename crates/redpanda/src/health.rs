//! Redpanda health checks.

use std::collections::HashSet;
use tracing::{debug, error};

use crate::config::RedpandaConfig;
use crate::connection::connect;

/// Check Redpanda connection health.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    match connect(config).await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => {
                debug!(topics = topics.len(), "Redpanda connection healthy");
                true
            }
            Err(e) => {
                error!("Failed to list Redpanda topics: {}", e);
                false
            }
        },
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

/// Return the queues in `queues` that do not exist yet.
pub async fn missing_queues(config: &RedpandaConfig, queues: &[String]) -> Vec<String> {
    let existing: HashSet<String> = match connect(config).await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => topics.into_iter().map(|t| t.name).collect(),
            Err(_) => HashSet::new(),
        },
        Err(_) => HashSet::new(),
    };

    queues
        .iter()
        .filter(|q| !existing.contains(*q))
        .cloned()
        .collect()
}
