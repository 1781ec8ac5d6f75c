//! Health check aggregation and worker heartbeats.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Health status for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

/// Component health state.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    healthy: AtomicBool,
    message: RwLock<Option<String>>,
}

impl ComponentHealth {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            healthy: AtomicBool::new(false),
            message: RwLock::new(None),
        }
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        *self.message.write() = None;
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.healthy.store(false, Ordering::Relaxed);
        *self.message.write() = Some(msg.into());
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.message.read().clone()
    }

    fn report(&self) -> ComponentHealthReport {
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: self.is_healthy(),
            message: self.message(),
        }
    }
}

/// Aggregated health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Last-seen state of one worker loop.
#[derive(Debug, Clone)]
struct Heartbeat {
    last_beat: DateTime<Utc>,
    quiet_period: Duration,
}

/// Liveness of one worker as reported to monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub name: String,
    pub last_beat: DateTime<Utc>,
    pub age_secs: i64,
    pub alive: bool,
}

/// Heartbeats published by long-running workers.
///
/// A worker counts as alive while its last beat is younger than twice its
/// quiet period. Workers beat on every delivery and on every idle tick.
#[derive(Debug, Default)]
pub struct Heartbeats {
    beats: RwLock<BTreeMap<String, Heartbeat>>,
}

impl Heartbeats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beat(&self, worker: &str, quiet_period: Duration) {
        self.beat_at(worker, quiet_period, Utc::now());
    }

    pub fn beat_at(&self, worker: &str, quiet_period: Duration, at: DateTime<Utc>) {
        self.beats.write().insert(
            worker.to_string(),
            Heartbeat {
                last_beat: at,
                quiet_period,
            },
        );
    }

    pub fn remove(&self, worker: &str) {
        self.beats.write().remove(worker);
    }

    pub fn report_at(&self, now: DateTime<Utc>) -> Vec<WorkerReport> {
        self.beats
            .read()
            .iter()
            .map(|(name, hb)| {
                let age = now - hb.last_beat;
                let limit = chrono::Duration::from_std(hb.quiet_period * 2)
                    .unwrap_or(chrono::Duration::MAX);
                WorkerReport {
                    name: name.clone(),
                    last_beat: hb.last_beat,
                    age_secs: age.num_seconds(),
                    alive: age <= limit,
                }
            })
            .collect()
    }

    pub fn report(&self) -> Vec<WorkerReport> {
        self.report_at(Utc::now())
    }
}

/// Global health registry.
pub struct HealthRegistry {
    pub redpanda: ComponentHealth,
    pub postgres: ComponentHealth,
    pub esi: ComponentHealth,
    pub workers: Heartbeats,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            redpanda: ComponentHealth::new("redpanda"),
            postgres: ComponentHealth::new("postgres"),
            esi: ComponentHealth::new("esi"),
            workers: Heartbeats::new(),
        }
    }

    /// Generate a health report.
    pub fn report(&self) -> HealthReport {
        let components = vec![
            self.redpanda.report(),
            self.postgres.report(),
            self.esi.report(),
        ];

        let all_healthy = components.iter().all(|c| c.healthy);
        let any_healthy = components.iter().any(|c| c.healthy);

        let status = if all_healthy {
            HealthStatus::Healthy
        } else if any_healthy {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        HealthReport { status, components }
    }

    /// Broker and store are both required to make progress.
    pub fn is_ready(&self) -> bool {
        self.redpanda.is_healthy() && self.postgres.is_healthy()
    }

    pub fn is_alive(&self) -> bool {
        true
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global health registry.
pub static HEALTH: std::sync::LazyLock<HealthRegistry> =
    std::sync::LazyLock::new(HealthRegistry::new);

/// Get the global health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
