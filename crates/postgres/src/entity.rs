//! Entity upserts and lookups.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::FromRow;
use sync_core::{
    Alliance, Character, Constellation, Corporation, DbErrorCode, EntityKind, EntityRecord,
    ItemCategory, ItemGroup, ItemType, Region, Result, SolarSystem,
};
use tracing::debug;

use crate::client::{db_error, PostgresStore};
use crate::schema::entity_table;

#[derive(Debug, FromRow)]
struct DbCategory {
    category_id: i64,
    name: String,
    published: bool,
}

#[derive(Debug, FromRow)]
struct DbGroup {
    group_id: i64,
    category_id: i64,
    name: String,
    published: bool,
}

#[derive(Debug, FromRow)]
struct DbType {
    type_id: i64,
    group_id: i64,
    name: String,
    published: bool,
    mass: Option<f64>,
    volume: Option<f64>,
}

#[derive(Debug, FromRow)]
struct DbRegion {
    region_id: i64,
    name: String,
    description: Option<String>,
}

#[derive(Debug, FromRow)]
struct DbConstellation {
    constellation_id: i64,
    region_id: i64,
    name: String,
}

#[derive(Debug, FromRow)]
struct DbSolarSystem {
    system_id: i64,
    constellation_id: i64,
    name: String,
    security_status: f64,
}

#[derive(Debug, FromRow)]
struct DbAlliance {
    alliance_id: i64,
    name: String,
    ticker: String,
    executor_corporation_id: Option<i64>,
    date_founded: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DbCorporation {
    corporation_id: i64,
    name: String,
    ticker: String,
    member_count: i64,
    alliance_id: Option<i64>,
    ceo_id: i64,
}

#[derive(Debug, FromRow)]
struct DbCharacter {
    character_id: i64,
    name: String,
    corporation_id: i64,
    alliance_id: Option<i64>,
    birthday: DateTime<Utc>,
    security_status: Option<f64>,
}

impl PostgresStore {
    pub async fn entity_exists(&self, kind: EntityKind, id: i64) -> Result<bool> {
        let (table, key) = entity_table(kind);
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)", table, key);
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "entity exists"))
    }

    /// Insert or overwrite. Concurrent writers resolve last-write-wins.
    pub async fn upsert_entity(&self, record: &EntityRecord) -> Result<()> {
        let query = match record {
            EntityRecord::Category(e) => sqlx::query(
                "INSERT INTO item_categories (category_id, name, published) VALUES ($1, $2, $3) \
                 ON CONFLICT (category_id) DO UPDATE SET name = EXCLUDED.name, \
                 published = EXCLUDED.published, updated_at = now()",
            )
            .bind(e.category_id)
            .bind(&e.name)
            .bind(e.published),
            EntityRecord::Group(e) => sqlx::query(
                "INSERT INTO item_groups (group_id, category_id, name, published) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (group_id) DO UPDATE SET category_id = EXCLUDED.category_id, \
                 name = EXCLUDED.name, published = EXCLUDED.published, updated_at = now()",
            )
            .bind(e.group_id)
            .bind(e.category_id)
            .bind(&e.name)
            .bind(e.published),
            EntityRecord::Type(e) => sqlx::query(
                "INSERT INTO item_types (type_id, group_id, name, published, mass, volume) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (type_id) DO UPDATE SET group_id = EXCLUDED.group_id, \
                 name = EXCLUDED.name, published = EXCLUDED.published, mass = EXCLUDED.mass, \
                 volume = EXCLUDED.volume, updated_at = now()",
            )
            .bind(e.type_id)
            .bind(e.group_id)
            .bind(&e.name)
            .bind(e.published)
            .bind(e.mass)
            .bind(e.volume),
            EntityRecord::Region(e) => sqlx::query(
                "INSERT INTO regions (region_id, name, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (region_id) DO UPDATE SET name = EXCLUDED.name, \
                 description = EXCLUDED.description, updated_at = now()",
            )
            .bind(e.region_id)
            .bind(&e.name)
            .bind(&e.description),
            EntityRecord::Constellation(e) => sqlx::query(
                "INSERT INTO constellations (constellation_id, region_id, name) VALUES ($1, $2, $3) \
                 ON CONFLICT (constellation_id) DO UPDATE SET region_id = EXCLUDED.region_id, \
                 name = EXCLUDED.name, updated_at = now()",
            )
            .bind(e.constellation_id)
            .bind(e.region_id)
            .bind(&e.name),
            EntityRecord::SolarSystem(e) => sqlx::query(
                "INSERT INTO solar_systems (system_id, constellation_id, name, security_status) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (system_id) DO UPDATE SET constellation_id = EXCLUDED.constellation_id, \
                 name = EXCLUDED.name, security_status = EXCLUDED.security_status, \
                 updated_at = now()",
            )
            .bind(e.system_id)
            .bind(e.constellation_id)
            .bind(&e.name)
            .bind(e.security_status),
            EntityRecord::Alliance(e) => sqlx::query(
                "INSERT INTO alliances (alliance_id, name, ticker, executor_corporation_id, date_founded) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (alliance_id) DO UPDATE SET name = EXCLUDED.name, \
                 ticker = EXCLUDED.ticker, executor_corporation_id = EXCLUDED.executor_corporation_id, \
                 date_founded = EXCLUDED.date_founded, updated_at = now()",
            )
            .bind(e.alliance_id)
            .bind(&e.name)
            .bind(&e.ticker)
            .bind(e.executor_corporation_id)
            .bind(e.date_founded),
            EntityRecord::Corporation(e) => sqlx::query(
                "INSERT INTO corporations (corporation_id, name, ticker, member_count, alliance_id, ceo_id) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (corporation_id) DO UPDATE SET name = EXCLUDED.name, \
                 ticker = EXCLUDED.ticker, member_count = EXCLUDED.member_count, \
                 alliance_id = EXCLUDED.alliance_id, ceo_id = EXCLUDED.ceo_id, updated_at = now()",
            )
            .bind(e.corporation_id)
            .bind(&e.name)
            .bind(&e.ticker)
            .bind(e.member_count)
            .bind(e.alliance_id)
            .bind(e.ceo_id),
            EntityRecord::Character(e) => sqlx::query(
                "INSERT INTO characters (character_id, name, corporation_id, alliance_id, birthday, security_status) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (character_id) DO UPDATE SET name = EXCLUDED.name, \
                 corporation_id = EXCLUDED.corporation_id, alliance_id = EXCLUDED.alliance_id, \
                 birthday = EXCLUDED.birthday, security_status = EXCLUDED.security_status, \
                 updated_at = now()",
            )
            .bind(e.character_id)
            .bind(&e.name)
            .bind(e.corporation_id)
            .bind(e.alliance_id)
            .bind(e.birthday)
            .bind(e.security_status),
        };

        query
            .execute(self.pool())
            .await
            .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "entity upsert"))?;
        debug!(kind = %record.kind(), id = record.id(), "Entity upserted");
        Ok(())
    }

    pub async fn get_entity(&self, kind: EntityKind, id: i64) -> Result<Option<EntityRecord>> {
        let (table, key) = entity_table(kind);
        let sql = format!("SELECT * FROM {} WHERE {} = $1", table, key);

        let record = match kind {
            EntityKind::Category => self.fetch_row::<DbCategory>(&sql, id).await?.map(|r| {
                EntityRecord::Category(ItemCategory {
                    category_id: r.category_id,
                    name: r.name,
                    published: r.published,
                })
            }),
            EntityKind::Group => self.fetch_row::<DbGroup>(&sql, id).await?.map(|r| {
                EntityRecord::Group(ItemGroup {
                    group_id: r.group_id,
                    category_id: r.category_id,
                    name: r.name,
                    published: r.published,
                })
            }),
            EntityKind::Type => self.fetch_row::<DbType>(&sql, id).await?.map(|r| {
                EntityRecord::Type(ItemType {
                    type_id: r.type_id,
                    group_id: r.group_id,
                    name: r.name,
                    published: r.published,
                    mass: r.mass,
                    volume: r.volume,
                })
            }),
            EntityKind::Region => self.fetch_row::<DbRegion>(&sql, id).await?.map(|r| {
                EntityRecord::Region(Region {
                    region_id: r.region_id,
                    name: r.name,
                    description: r.description,
                })
            }),
            EntityKind::Constellation => {
                self.fetch_row::<DbConstellation>(&sql, id).await?.map(|r| {
                    EntityRecord::Constellation(Constellation {
                        constellation_id: r.constellation_id,
                        region_id: r.region_id,
                        name: r.name,
                    })
                })
            }
            EntityKind::SolarSystem => self.fetch_row::<DbSolarSystem>(&sql, id).await?.map(|r| {
                EntityRecord::SolarSystem(SolarSystem {
                    system_id: r.system_id,
                    constellation_id: r.constellation_id,
                    name: r.name,
                    security_status: r.security_status,
                })
            }),
            EntityKind::Alliance => self.fetch_row::<DbAlliance>(&sql, id).await?.map(|r| {
                EntityRecord::Alliance(Alliance {
                    alliance_id: r.alliance_id,
                    name: r.name,
                    ticker: r.ticker,
                    executor_corporation_id: r.executor_corporation_id,
                    date_founded: r.date_founded,
                })
            }),
            EntityKind::Corporation => self.fetch_row::<DbCorporation>(&sql, id).await?.map(|r| {
                EntityRecord::Corporation(Corporation {
                    corporation_id: r.corporation_id,
                    name: r.name,
                    ticker: r.ticker,
                    member_count: r.member_count,
                    alliance_id: r.alliance_id,
                    ceo_id: r.ceo_id,
                })
            }),
            EntityKind::Character => self.fetch_row::<DbCharacter>(&sql, id).await?.map(|r| {
                EntityRecord::Character(Character {
                    character_id: r.character_id,
                    name: r.name,
                    corporation_id: r.corporation_id,
                    alliance_id: r.alliance_id,
                    birthday: r.birthday,
                    security_status: r.security_status,
                })
            }),
        };
        Ok(record)
    }

    async fn fetch_row<T>(&self, sql: &str, id: i64) -> Result<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        sqlx::query_as::<_, T>(sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "entity lookup"))
    }

    /// Dependent kinds come from killmail participants, the rest from their own table.
    pub async fn known_entity_ids(&self, kind: EntityKind) -> Result<Vec<i64>> {
        let sql = match kind {
            EntityKind::Character => "SELECT character_id FROM killmail_victims WHERE character_id IS NOT NULL \
                 UNION SELECT character_id FROM killmail_attackers WHERE character_id IS NOT NULL \
                 ORDER BY 1"
                .to_string(),
            EntityKind::Corporation => "SELECT corporation_id FROM killmail_victims WHERE corporation_id IS NOT NULL \
                 UNION SELECT corporation_id FROM killmail_attackers WHERE corporation_id IS NOT NULL \
                 ORDER BY 1"
                .to_string(),
            other => {
                let (table, key) = entity_table(other);
                format!("SELECT {} FROM {} ORDER BY 1", key, table)
            }
        };
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "known entity ids"))
    }

    pub async fn region_for_system(&self, system_id: i64) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT c.region_id FROM solar_systems s \
             JOIN constellations c ON c.constellation_id = s.constellation_id \
             WHERE s.system_id = $1",
        )
        .bind(system_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "region lookup"))
    }
}
