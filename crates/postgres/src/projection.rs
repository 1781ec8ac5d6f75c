//! Materialized view maintenance, aggregate reads and queue checkpoints.

use chrono::{Duration, NaiveDate, Utc};
use sqlx::FromRow;
use sync_core::{DailyActivity, DbErrorCode, ProjectionCounts, Result};
use tracing::{debug, warn};

use crate::client::{db_error, PostgresStore};

/// SQLSTATE object_not_in_prerequisite_state: a concurrent refresh of a
/// view that has never been populated.
const NOT_POPULATED: &str = "55000";

pub const FILTER_VIEW: &str = "killmail_filters";
pub const DAILY_VIEW: &str = "character_daily_activity";

#[derive(Debug, FromRow)]
struct DbDailyActivity {
    day: NaiveDate,
    character_id: i64,
    kills: i64,
    losses: i64,
}

impl From<DbDailyActivity> for DailyActivity {
    fn from(row: DbDailyActivity) -> Self {
        Self {
            day: row.day,
            character_id: row.character_id,
            kills: row.kills,
            losses: row.losses,
        }
    }
}

impl PostgresStore {
    pub async fn projection_counts(&self) -> Result<ProjectionCounts> {
        let (killmails, projected) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT (SELECT COUNT(*) FROM killmails), (SELECT COUNT(*) FROM killmail_filters)",
        )
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "projection counts"))?;
        Ok(ProjectionCounts {
            killmails,
            projected,
        })
    }

    /// Rebuild a view without blocking readers.
    ///
    /// Readers keep the previous contents until the refresh commits. A
    /// view that was never populated cannot refresh concurrently, so the
    /// first refresh falls back to a plain one.
    pub async fn refresh_view(&self, view: &str) -> Result<()> {
        let concurrent = format!("REFRESH MATERIALIZED VIEW CONCURRENTLY {}", view);
        match sqlx::query(&concurrent).execute(self.pool()).await {
            Ok(_) => {
                debug!(view = view, "View refreshed concurrently");
                Ok(())
            }
            Err(e)
                if e.as_database_error()
                    .and_then(|d| d.code())
                    .is_some_and(|code| code == NOT_POPULATED) =>
            {
                warn!(view = view, "View not populated, refreshing without CONCURRENTLY");
                sqlx::query(&format!("REFRESH MATERIALIZED VIEW {}", view))
                    .execute(self.pool())
                    .await
                    .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "view refresh"))?;
                Ok(())
            }
            Err(e) => Err(db_error(e, DbErrorCode::QueryFailed, "view refresh")),
        }
    }

    /// Daily rows for one character over the last `days` days, newest first.
    pub async fn daily_activity(&self, character_id: i64, days: i64) -> Result<Vec<DailyActivity>> {
        let since = Utc::now().date_naive() - Duration::days(days.max(0));
        let rows = sqlx::query_as::<_, DbDailyActivity>(
            "SELECT day, character_id, kills, losses FROM character_daily_activity \
             WHERE character_id = $1 AND day >= $2 ORDER BY day DESC",
        )
        .bind(character_id)
        .bind(since)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "daily activity"))?;
        Ok(rows.into_iter().map(DailyActivity::from).collect())
    }

    pub async fn queue_offset(&self, queue: &str) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT committed_offset FROM queue_offsets WHERE queue = $1")
            .bind(queue)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "queue offset"))
    }

    /// Checkpoints never move backwards.
    pub async fn save_queue_offset(&self, queue: &str, offset: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO queue_offsets (queue, committed_offset) VALUES ($1, $2) \
             ON CONFLICT (queue) DO UPDATE SET \
             committed_offset = GREATEST(queue_offsets.committed_offset, EXCLUDED.committed_offset), \
             updated_at = now()",
        )
        .bind(queue)
        .bind(offset)
        .execute(self.pool())
        .await
        .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "save queue offset"))?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "ping"))?;
        Ok(())
    }
}
