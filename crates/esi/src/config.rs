//! Upstream client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::limiter::RateLimiterConfig;

/// ESI client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsiConfig {
    /// API root, e.g. `https://esi.evetech.net/latest`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// `datasource` query parameter
    #[serde(default = "default_datasource")]
    pub datasource: String,
    /// Sent on every request; ESI asks for contact details here
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum concurrent in-flight calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum calls started per window
    #[serde(default = "default_max_per_window")]
    pub max_per_window: usize,
    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Pause admission when `X-ESI-Error-Limit-Remain` drops below this
    #[serde(default = "default_error_limit_floor")]
    pub error_limit_floor: i64,
}

fn default_base_url() -> String {
    "https://esi.evetech.net/latest".to_string()
}

fn default_datasource() -> String {
    "tranquility".to_string()
}

fn default_user_agent() -> String {
    format!("killboard-sync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_max_concurrent() -> usize {
    20
}

fn default_max_per_window() -> usize {
    100
}

fn default_window_ms() -> u64 {
    1_000
}

fn default_error_limit_floor() -> i64 {
    10
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            datasource: default_datasource(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_concurrent: default_max_concurrent(),
            max_per_window: default_max_per_window(),
            window_ms: default_window_ms(),
            error_limit_floor: default_error_limit_floor(),
        }
    }
}

impl EsiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_concurrent: self.max_concurrent,
            max_per_window: self.max_per_window,
            window: Duration::from_millis(self.window_ms),
        }
    }
}

/// zKillboard RedisQ feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisQConfig {
    #[serde(default = "default_redisq_url")]
    pub url: String,
    /// Identifies this listener to RedisQ; each id gets its own cursor
    #[serde(default = "default_queue_id")]
    pub queue_id: String,
    /// Long-poll wait in seconds (RedisQ caps this at 10)
    #[serde(default = "default_ttw")]
    pub ttw: u64,
}

fn default_redisq_url() -> String {
    "https://zkillredisq.stream/listen.php".to_string()
}

fn default_queue_id() -> String {
    "killboard-sync".to_string()
}

fn default_ttw() -> u64 {
    10
}

impl Default for RedisQConfig {
    fn default() -> Self {
        Self {
            url: default_redisq_url(),
            queue_id: default_queue_id(),
            ttw: default_ttw(),
        }
    }
}
