//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::key::QueryKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// Entity details: reference data barely moves.
    #[serde(default = "default_entity_ttl_secs")]
    pub entity_ttl_secs: u64,
    /// Killmail listings grow continuously.
    #[serde(default = "default_killmail_list_ttl_secs")]
    pub killmail_list_ttl_secs: u64,
    #[serde(default = "default_daily_activity_ttl_secs")]
    pub daily_activity_ttl_secs: u64,
    /// How long a refresh request suppresses repeats for the same entity.
    #[serde(default = "default_refresh_cooldown_secs")]
    pub refresh_cooldown_secs: u64,
}

fn default_max_capacity() -> u64 {
    10_000
}

fn default_entity_ttl_secs() -> u64 {
    3_600
}

fn default_killmail_list_ttl_secs() -> u64 {
    60
}

fn default_daily_activity_ttl_secs() -> u64 {
    300
}

fn default_refresh_cooldown_secs() -> u64 {
    300
}

impl CacheConfig {
    pub fn ttl(&self, kind: QueryKind) -> Duration {
        Duration::from_secs(match kind {
            QueryKind::Entity => self.entity_ttl_secs,
            QueryKind::KillmailList => self.killmail_list_ttl_secs,
            QueryKind::DailyActivity => self.daily_activity_ttl_secs,
            QueryKind::RefreshCooldown => self.refresh_cooldown_secs,
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
            entity_ttl_secs: default_entity_ttl_secs(),
            killmail_list_ttl_secs: default_killmail_list_ttl_secs(),
            daily_activity_ttl_secs: default_daily_activity_ttl_secs(),
            refresh_cooldown_secs: default_refresh_cooldown_secs(),
        }
    }
}
