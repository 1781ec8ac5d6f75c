//! Redpanda configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redpanda connection and queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// SASL username (Redpanda Cloud)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password (Redpanda Cloud)
    #[serde(default)]
    pub sasl_password: Option<String>,
    /// Prefix for every queue topic
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Replication factor for declared topics
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i16,
    /// Upper bound on bytes per fetch
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: i32,
    /// Upper bound on how long a fetch waits on an empty partition, in milliseconds
    #[serde(default = "default_fetch_wait_ms")]
    pub fetch_wait_ms: u64,
    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_topic_prefix() -> String {
    "killboard".to_string()
}

fn default_replication_factor() -> i16 {
    1
}

fn default_fetch_max_bytes() -> i32 {
    1024 * 1024
}

fn default_fetch_wait_ms() -> u64 {
    1_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            sasl_username: None,
            sasl_password: None,
            topic_prefix: default_topic_prefix(),
            replication_factor: default_replication_factor(),
            fetch_max_bytes: default_fetch_max_bytes(),
            fetch_wait_ms: default_fetch_wait_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    pub fn fetch_wait(&self) -> Duration {
        Duration::from_millis(self.fetch_wait_ms)
    }

    pub fn has_sasl(&self) -> bool {
        self.sasl_username.is_some() && self.sasl_password.is_some()
    }
}
