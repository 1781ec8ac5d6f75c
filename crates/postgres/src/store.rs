use async_trait::async_trait;
use sync_core::{
    DailyActivity, EntityKind, EntityRecord, InsertOutcome, Killmail, KillmailQuery,
    ProjectionCounts, Result, Store,
};

use crate::client::PostgresStore;
use crate::projection::{DAILY_VIEW, FILTER_VIEW};

#[async_trait]
impl Store for PostgresStore {
    async fn entity_exists(&self, kind: EntityKind, id: i64) -> Result<bool> {
        PostgresStore::entity_exists(self, kind, id).await
    }

    async fn upsert_entity(&self, record: &EntityRecord) -> Result<()> {
        PostgresStore::upsert_entity(self, record).await
    }

    async fn get_entity(&self, kind: EntityKind, id: i64) -> Result<Option<EntityRecord>> {
        PostgresStore::get_entity(self, kind, id).await
    }

    async fn known_entity_ids(&self, kind: EntityKind) -> Result<Vec<i64>> {
        PostgresStore::known_entity_ids(self, kind).await
    }

    async fn region_for_system(&self, system_id: i64) -> Result<Option<i64>> {
        PostgresStore::region_for_system(self, system_id).await
    }

    async fn killmail_exists(&self, killmail_id: i64) -> Result<bool> {
        PostgresStore::killmail_exists(self, killmail_id).await
    }

    async fn insert_killmail(&self, killmail: &Killmail) -> Result<InsertOutcome> {
        PostgresStore::insert_killmail(self, killmail).await
    }

    async fn find_killmails(&self, query: &KillmailQuery) -> Result<Vec<i64>> {
        PostgresStore::find_killmails(self, query).await
    }

    async fn sweep_attackerless(&self) -> Result<u64> {
        PostgresStore::sweep_attackerless(self).await
    }

    async fn projection_counts(&self) -> Result<ProjectionCounts> {
        PostgresStore::projection_counts(self).await
    }

    async fn refresh_filter_projection(&self) -> Result<()> {
        self.refresh_view(FILTER_VIEW).await
    }

    async fn refresh_daily_activity(&self) -> Result<()> {
        self.refresh_view(DAILY_VIEW).await
    }

    async fn daily_activity(&self, character_id: i64, days: i64) -> Result<Vec<DailyActivity>> {
        PostgresStore::daily_activity(self, character_id, days).await
    }

    async fn queue_offset(&self, queue: &str) -> Result<Option<i64>> {
        PostgresStore::queue_offset(self, queue).await
    }

    async fn save_queue_offset(&self, queue: &str, offset: i64) -> Result<()> {
        PostgresStore::save_queue_offset(self, queue, offset).await
    }

    async fn ping(&self) -> Result<()> {
        PostgresStore::ping(self).await
    }
}
