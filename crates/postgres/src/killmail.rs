//! Killmail writes and filter queries.

use std::time::Instant;
use sync_core::{DbErrorCode, InsertOutcome, Killmail, KillmailQuery, Result};
use telemetry::metrics;
use tracing::{debug, info};

use crate::client::{db_error, PostgresStore};

impl PostgresStore {
    pub async fn killmail_exists(&self, killmail_id: i64) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM killmails WHERE killmail_id = $1)")
            .bind(killmail_id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "killmail exists"))
    }

    /// Killmail, victim, attackers and items in one transaction.
    ///
    /// The parent insert is `ON CONFLICT DO NOTHING`: a concurrent writer
    /// that got there first turns this call into [`InsertOutcome::AlreadyExists`]
    /// and the transaction is dropped, rolling back.
    pub async fn insert_killmail(&self, km: &Killmail) -> Result<InsertOutcome> {
        km.validate()?;
        let start = Instant::now();

        let region_id = match km.region_id {
            Some(id) => Some(id),
            None => self.region_for_system(km.solar_system_id).await?,
        };

        let tx_err = |e: sqlx::Error| db_error(e, DbErrorCode::TransactionFailed, "killmail write");
        let mut tx = self.pool().begin().await.map_err(tx_err)?;

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO killmails \
             (killmail_id, killmail_hash, killmail_time, solar_system_id, region_id, attacker_count) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (killmail_id) DO NOTHING RETURNING killmail_id",
        )
        .bind(km.killmail_id)
        .bind(&km.killmail_hash)
        .bind(km.killmail_time)
        .bind(km.solar_system_id)
        .bind(region_id)
        .bind(km.attacker_count())
        .fetch_optional(&mut *tx)
        .await
        .map_err(tx_err)?;

        if inserted.is_none() {
            debug!(killmail_id = km.killmail_id, "Killmail already stored");
            return Ok(InsertOutcome::AlreadyExists);
        }

        let v = &km.victim;
        sqlx::query(
            "INSERT INTO killmail_victims \
             (killmail_id, character_id, corporation_id, alliance_id, ship_type_id, damage_taken) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(km.killmail_id)
        .bind(v.character_id)
        .bind(v.corporation_id)
        .bind(v.alliance_id)
        .bind(v.ship_type_id)
        .bind(v.damage_taken)
        .execute(&mut *tx)
        .await
        .map_err(tx_err)?;

        for a in &km.attackers {
            sqlx::query(
                "INSERT INTO killmail_attackers \
                 (killmail_id, character_id, corporation_id, alliance_id, ship_type_id, \
                  weapon_type_id, damage_done, final_blow, security_status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(km.killmail_id)
            .bind(a.character_id)
            .bind(a.corporation_id)
            .bind(a.alliance_id)
            .bind(a.ship_type_id)
            .bind(a.weapon_type_id)
            .bind(a.damage_done)
            .bind(a.final_blow)
            .bind(a.security_status)
            .execute(&mut *tx)
            .await
            .map_err(tx_err)?;
        }

        for item in &km.items {
            sqlx::query(
                "INSERT INTO killmail_items \
                 (killmail_id, item_type_id, flag, quantity_destroyed, quantity_dropped, \
                  singleton, container_type_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(km.killmail_id)
            .bind(item.item_type_id)
            .bind(item.flag)
            .bind(item.quantity_destroyed)
            .bind(item.quantity_dropped)
            .bind(item.singleton)
            .bind(item.container_type_id)
            .execute(&mut *tx)
            .await
            .map_err(tx_err)?;
        }

        tx.commit().await.map_err(tx_err)?;

        metrics()
            .killmail_write_ms
            .observe(start.elapsed().as_millis() as u64);
        debug!(
            killmail_id = km.killmail_id,
            attackers = km.attackers.len(),
            items = km.items.len(),
            region_id = ?region_id,
            "Killmail written"
        );
        Ok(InsertOutcome::Inserted)
    }

    /// Run a compiled filter query and return matching killmail IDs, newest first.
    pub async fn find_killmails(&self, query: &KillmailQuery) -> Result<Vec<i64>> {
        let compiled = query.compile()?;
        let mut q = sqlx::query_scalar::<_, i64>(&compiled.sql);
        for param in &compiled.params {
            q = q.bind(*param);
        }
        q.fetch_all(self.pool())
            .await
            .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "killmail filter"))
    }

    /// Delete killmails left without attacker rows. Sub-records cascade.
    pub async fn sweep_attackerless(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM killmails k WHERE NOT EXISTS \
             (SELECT 1 FROM killmail_attackers a WHERE a.killmail_id = k.killmail_id)",
        )
        .execute(self.pool())
        .await
        .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "attackerless sweep"))?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(removed = removed, "Removed killmails without attackers");
        }
        Ok(removed)
    }
}
