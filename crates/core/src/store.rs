//! Store contract shared by workers, the query service and test fakes.
//!
//! The store is the single source of truth. Concurrent writers are
//! arbitrated by its transactions and unique keys: entity writes are
//! last-write-wins upserts, killmail writes are all-or-nothing.

use async_trait::async_trait;

use crate::entity::{DailyActivity, EntityKind, EntityRecord};
use crate::error::Result;
use crate::filter::KillmailQuery;
use crate::killmail::Killmail;

/// Result of a killmail write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Killmail and all sub-records were committed.
    Inserted,
    /// A row with this key already existed; nothing was written.
    AlreadyExists,
}

/// Row counts used by the staleness check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionCounts {
    pub killmails: i64,
    pub projected: i64,
}

impl ProjectionCounts {
    pub fn drift(&self) -> i64 {
        (self.killmails - self.projected).abs()
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // Entities

    async fn entity_exists(&self, kind: EntityKind, id: i64) -> Result<bool>;

    /// Create-or-update in one statement.
    async fn upsert_entity(&self, record: &EntityRecord) -> Result<()>;

    async fn get_entity(&self, kind: EntityKind, id: i64) -> Result<Option<EntityRecord>>;

    /// IDs of a dependent kind seen on ingested killmails.
    async fn known_entity_ids(&self, kind: EntityKind) -> Result<Vec<i64>>;

    /// Resolve a system's region through its constellation, if synced.
    async fn region_for_system(&self, system_id: i64) -> Result<Option<i64>>;

    // Killmails

    async fn killmail_exists(&self, killmail_id: i64) -> Result<bool>;

    /// Write the killmail and every sub-record atomically.
    ///
    /// Rejects killmails that fail [`Killmail::validate`] without writing anything.
    async fn insert_killmail(&self, killmail: &Killmail) -> Result<InsertOutcome>;

    async fn find_killmails(&self, query: &KillmailQuery) -> Result<Vec<i64>>;

    /// Delete killmails that have no attacker rows. Returns how many.
    async fn sweep_attackerless(&self) -> Result<u64>;

    // Projections

    async fn projection_counts(&self) -> Result<ProjectionCounts>;

    /// Rebuild the filter projection without blocking readers.
    async fn refresh_filter_projection(&self) -> Result<()>;

    /// Rebuild the daily per-character aggregate.
    async fn refresh_daily_activity(&self) -> Result<()>;

    async fn daily_activity(&self, character_id: i64, days: i64) -> Result<Vec<DailyActivity>>;

    // Queue checkpoints

    async fn queue_offset(&self, queue: &str) -> Result<Option<i64>>;

    async fn save_queue_offset(&self, queue: &str, offset: i64) -> Result<()>;

    /// Cheap round trip for readiness.
    async fn ping(&self) -> Result<()>;
}
