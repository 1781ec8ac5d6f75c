//! Cached query service handed to the external query surface.
//!
//! Reads go through the [`QueryCache`] with a TTL per query kind.
//! Writers that know they made something stale call the `invalidate_*`
//! hooks. Refresh requests share the cache as a cooldown store.

use cache::{CacheKey, QueryCache, QueryKind};
use redpanda::{entity_queue, QueuePublisher, MAX_PRIORITY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_core::{
    source, DailyActivity, EntityKind, EntityRecord, Error, KillFilter, KillmailQuery, Page,
    QueryMode, QueueMessage, Result, Store,
};
use telemetry::metrics;
use tracing::{debug, info};

const KILLMAIL_DOMAIN: &str = "killmail";

/// Longest daily activity window served.
pub const MAX_ACTIVITY_DAYS: i64 = 366;

/// Result of a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshRequest {
    /// A high-priority sync message was published.
    Queued,
    /// A request for the same entity is still cooling down.
    Suppressed,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn Store>,
    publisher: Arc<dyn QueuePublisher>,
    cache: QueryCache,
    topic_prefix: String,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn QueuePublisher>,
        cache: QueryCache,
        topic_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            cache,
            topic_prefix: topic_prefix.into(),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn entity_key(kind: EntityKind, id: i64) -> CacheKey {
        CacheKey::new(kind.as_str(), QueryKind::Entity, id.to_string())
    }

    fn cooldown_key(kind: EntityKind, id: i64) -> CacheKey {
        CacheKey::new(kind.as_str(), QueryKind::RefreshCooldown, id.to_string())
    }

    fn killmail_key(query: &KillmailQuery) -> CacheKey {
        let mut fingerprint = format!(
            "{}|{}|limit={}",
            query.mode.as_str(),
            query.filter.fingerprint(),
            query.page.limit
        );
        if let Some(before) = query.page.before_id {
            fingerprint.push_str(&format!("|before={}", before));
        }
        CacheKey::new(KILLMAIL_DOMAIN, QueryKind::KillmailList, fingerprint)
    }

    fn daily_key(character_id: i64, days: i64) -> CacheKey {
        CacheKey::new(
            EntityKind::Character.as_str(),
            QueryKind::DailyActivity,
            format!("{}|days={}", character_id, days),
        )
    }

    /// Entity detail. While a refresh is pending the store is read
    /// directly, so the refetched row shows up as soon as it is written.
    pub async fn entity(&self, kind: EntityKind, id: i64) -> Result<Option<EntityRecord>> {
        if kind.is_mutable() && self.cache.is_fresh(&Self::cooldown_key(kind, id)) {
            return self.store.get_entity(kind, id).await;
        }
        let store = self.store.clone();
        self.cache
            .get_or_compute_kind(&Self::entity_key(kind, id), || async move {
                store.get_entity(kind, id).await
            })
            .await
    }

    /// Killmail IDs matching `filter`, newest first.
    ///
    /// Without an explicit mode the filter picks one: pinned actors go to
    /// the live relation, broad filters to the projection.
    pub async fn killmails(
        &self,
        filter: KillFilter,
        mode: Option<QueryMode>,
        page: Page,
    ) -> Result<Vec<i64>> {
        let mode = mode.unwrap_or_else(|| QueryMode::suggested(&filter));
        let query = KillmailQuery::new(filter, mode).with_page(page);
        // Reject bad filters before they become cache keys.
        query.filter.plan()?;

        let store = self.store.clone();
        let key = Self::killmail_key(&query);
        self.cache
            .get_or_compute_kind(&key, || async move { store.find_killmails(&query).await })
            .await
    }

    pub async fn daily_activity(&self, character_id: i64, days: i64) -> Result<Vec<DailyActivity>> {
        if !(1..=MAX_ACTIVITY_DAYS).contains(&days) {
            return Err(Error::validation(format!(
                "days must be between 1 and {}, got {}",
                MAX_ACTIVITY_DAYS, days
            )));
        }
        let store = self.store.clone();
        self.cache
            .get_or_compute_kind(&Self::daily_key(character_id, days), || async move {
                store.daily_activity(character_id, days).await
            })
            .await
    }

    /// Clear one entity's detail cache.
    pub async fn invalidate_entity(&self, kind: EntityKind, id: i64) {
        self.cache.invalidate(&Self::entity_key(kind, id)).await;
    }

    /// Clear every cached killmail listing.
    pub async fn invalidate_killmail_lists(&self) -> usize {
        self.cache
            .invalidate_prefix(&CacheKey::prefix(KILLMAIL_DOMAIN, QueryKind::KillmailList))
            .await
    }

    /// Clear every cached daily activity window for one character.
    pub async fn invalidate_daily(&self, character_id: i64) -> usize {
        let prefix = format!(
            "{}{}|",
            CacheKey::prefix(EntityKind::Character.as_str(), QueryKind::DailyActivity),
            character_id
        );
        self.cache.invalidate_prefix(&prefix).await
    }

    /// Ask the entity worker to refetch an organization or individual.
    ///
    /// Repeats inside the cooldown window are suppressed. The message
    /// jumps the sync backlog at top priority.
    pub async fn request_refresh(&self, kind: EntityKind, id: i64) -> Result<RefreshRequest> {
        if !kind.is_mutable() {
            return Err(Error::validation(format!(
                "{} entities are not refreshable",
                kind
            )));
        }
        if id <= 0 {
            return Err(Error::validation(format!("invalid {} id {}", kind, id)));
        }

        let cooldown = Self::cooldown_key(kind, id);
        let ttl = self.cache.ttl_for(QueryKind::RefreshCooldown);
        if !self.cache.try_claim_cooldown(&cooldown, ttl).await {
            metrics().refresh_suppressed.inc();
            debug!(kind = %kind, id = id, "Refresh suppressed by cooldown");
            return Ok(RefreshRequest::Suppressed);
        }

        let queue = entity_queue(&self.topic_prefix, kind);
        let payload = QueueMessage::new(id, source::REFRESH).to_bytes()?;
        if let Err(e) = self.publisher.publish(&queue, payload, MAX_PRIORITY).await {
            // Let the caller retry right away.
            self.cache.invalidate(&cooldown).await;
            return Err(e);
        }

        // Reads bypass the cache until the cooldown lapses; drop the stale copy.
        self.invalidate_entity(kind, id).await;
        metrics().refresh_requests.inc();
        info!(kind = %kind, id = id, "Refresh queued");
        Ok(RefreshRequest::Queued)
    }
}
