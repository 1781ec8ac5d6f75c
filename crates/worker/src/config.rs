//! Worker configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use sync_core::Error;

/// What a process runs. Deployments split roles across processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// One entity sync worker per entity kind.
    Entities,
    /// Killmail ingestion worker.
    Killmails,
    /// RedisQ feed listener.
    Feed,
    /// Projection refresh scheduler.
    Projections,
    /// Operational HTTP surface.
    Api,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Self::Entities,
        Self::Killmails,
        Self::Feed,
        Self::Projections,
        Self::Api,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Killmails => "killmails",
            Self::Feed => "feed",
            Self::Projections => "projections",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| Error::config(format!("unknown role: {}", s)))
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_roles")]
    pub roles: Vec<Role>,
    /// Messages a consumer processes concurrently
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,
    /// Longest a receive blocks on an empty queue
    #[serde(default = "default_receive_wait_ms")]
    pub receive_wait_ms: u64,
    /// Idle time after which a queue counts as drained
    #[serde(default = "default_quiet_period_secs")]
    pub quiet_period_secs: u64,
    /// How long in-flight messages may finish after shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Deliveries before a transiently failing message is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum spacing of offset checkpoints
    #[serde(default = "default_checkpoint_interval_ms")]
    pub checkpoint_interval_ms: u64,
    /// First retry delay for an ack or nack the broker rejected
    #[serde(default = "default_settle_retry_ms")]
    pub settle_retry_ms: u64,
    #[serde(default = "default_settle_retry_max_ms")]
    pub settle_retry_max_ms: u64,
    #[serde(default = "default_staleness_check_secs")]
    pub staleness_check_secs: u64,
    /// Row-count drift that triggers a filter projection refresh
    #[serde(default = "default_staleness_threshold")]
    pub staleness_threshold: i64,
    #[serde(default = "default_daily_refresh_secs")]
    pub daily_refresh_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_startup_max_attempts")]
    pub startup_max_attempts: u32,
    #[serde(default = "default_startup_backoff_ms")]
    pub startup_backoff_ms: u64,
    #[serde(default = "default_startup_backoff_max_ms")]
    pub startup_backoff_max_ms: u64,
}

fn default_roles() -> Vec<Role> {
    Role::ALL.to_vec()
}

fn default_prefetch() -> usize {
    10
}

fn default_receive_wait_ms() -> u64 {
    1_000
}

fn default_quiet_period_secs() -> u64 {
    30
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_checkpoint_interval_ms() -> u64 {
    1_000
}

fn default_settle_retry_ms() -> u64 {
    500
}

fn default_settle_retry_max_ms() -> u64 {
    30_000
}

fn default_staleness_check_secs() -> u64 {
    60
}

fn default_staleness_threshold() -> i64 {
    100
}

fn default_daily_refresh_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    3_600
}

fn default_startup_max_attempts() -> u32 {
    8
}

fn default_startup_backoff_ms() -> u64 {
    500
}

fn default_startup_backoff_max_ms() -> u64 {
    30_000
}

impl WorkerConfig {
    pub fn runs(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn receive_wait(&self) -> Duration {
        Duration::from_millis(self.receive_wait_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_secs(self.quiet_period_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms)
    }

    /// Settlements are retried until they land; only the delay is bounded.
    pub fn settle_backoff(&self) -> crate::backoff::BackoffPolicy {
        crate::backoff::BackoffPolicy {
            max_attempts: u32::MAX,
            initial: Duration::from_millis(self.settle_retry_ms),
            max: Duration::from_millis(self.settle_retry_max_ms),
        }
    }

    pub fn staleness_check_interval(&self) -> Duration {
        Duration::from_secs(self.staleness_check_secs)
    }

    pub fn daily_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.daily_refresh_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn startup_backoff(&self) -> crate::backoff::BackoffPolicy {
        crate::backoff::BackoffPolicy {
            max_attempts: self.startup_max_attempts,
            initial: Duration::from_millis(self.startup_backoff_ms),
            max: Duration::from_millis(self.startup_backoff_max_ms),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            prefetch: default_prefetch(),
            receive_wait_ms: default_receive_wait_ms(),
            quiet_period_secs: default_quiet_period_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            max_attempts: default_max_attempts(),
            checkpoint_interval_ms: default_checkpoint_interval_ms(),
            settle_retry_ms: default_settle_retry_ms(),
            settle_retry_max_ms: default_settle_retry_max_ms(),
            staleness_check_secs: default_staleness_check_secs(),
            staleness_threshold: default_staleness_threshold(),
            daily_refresh_secs: default_daily_refresh_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            startup_max_attempts: default_startup_max_attempts(),
            startup_backoff_ms: default_startup_backoff_ms(),
            startup_backoff_max_ms: default_startup_backoff_max_ms(),
        }
    }
}
