//! Table and view definitions.
//!
//! Entity tables carry no foreign keys between each other: reference
//! data syncs per kind in no particular order. Killmail sub-records
//! cascade from their parent so the attackerless sweep removes a whole
//! killmail in one statement.

use sync_core::EntityKind;

pub const CREATE_ITEM_CATEGORIES: &str = r#"
CREATE TABLE IF NOT EXISTS item_categories (
    category_id BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    published BOOLEAN NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_ITEM_GROUPS: &str = r#"
CREATE TABLE IF NOT EXISTS item_groups (
    group_id BIGINT PRIMARY KEY,
    category_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    published BOOLEAN NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_ITEM_TYPES: &str = r#"
CREATE TABLE IF NOT EXISTS item_types (
    type_id BIGINT PRIMARY KEY,
    group_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    published BOOLEAN NOT NULL,
    mass DOUBLE PRECISION,
    volume DOUBLE PRECISION,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_REGIONS: &str = r#"
CREATE TABLE IF NOT EXISTS regions (
    region_id BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_CONSTELLATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS constellations (
    constellation_id BIGINT PRIMARY KEY,
    region_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_SOLAR_SYSTEMS: &str = r#"
CREATE TABLE IF NOT EXISTS solar_systems (
    system_id BIGINT PRIMARY KEY,
    constellation_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    security_status DOUBLE PRECISION NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_ALLIANCES: &str = r#"
CREATE TABLE IF NOT EXISTS alliances (
    alliance_id BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    ticker TEXT NOT NULL,
    executor_corporation_id BIGINT,
    date_founded TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_CORPORATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS corporations (
    corporation_id BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    ticker TEXT NOT NULL,
    member_count BIGINT NOT NULL,
    alliance_id BIGINT,
    ceo_id BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_CHARACTERS: &str = r#"
CREATE TABLE IF NOT EXISTS characters (
    character_id BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    corporation_id BIGINT NOT NULL,
    alliance_id BIGINT,
    birthday TIMESTAMPTZ NOT NULL,
    security_status DOUBLE PRECISION,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_KILLMAILS: &str = r#"
CREATE TABLE IF NOT EXISTS killmails (
    killmail_id BIGINT PRIMARY KEY,
    killmail_hash TEXT NOT NULL,
    killmail_time TIMESTAMPTZ NOT NULL,
    solar_system_id BIGINT NOT NULL,
    region_id BIGINT,
    attacker_count BIGINT NOT NULL CHECK (attacker_count > 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_KILLMAIL_VICTIMS: &str = r#"
CREATE TABLE IF NOT EXISTS killmail_victims (
    killmail_id BIGINT PRIMARY KEY REFERENCES killmails (killmail_id) ON DELETE CASCADE,
    character_id BIGINT,
    corporation_id BIGINT,
    alliance_id BIGINT,
    ship_type_id BIGINT NOT NULL,
    damage_taken BIGINT NOT NULL
)
"#;

pub const CREATE_KILLMAIL_ATTACKERS: &str = r#"
CREATE TABLE IF NOT EXISTS killmail_attackers (
    id BIGSERIAL PRIMARY KEY,
    killmail_id BIGINT NOT NULL REFERENCES killmails (killmail_id) ON DELETE CASCADE,
    character_id BIGINT,
    corporation_id BIGINT,
    alliance_id BIGINT,
    ship_type_id BIGINT,
    weapon_type_id BIGINT,
    damage_done BIGINT NOT NULL,
    final_blow BOOLEAN NOT NULL,
    security_status DOUBLE PRECISION NOT NULL
)
"#;

pub const CREATE_KILLMAIL_ITEMS: &str = r#"
CREATE TABLE IF NOT EXISTS killmail_items (
    id BIGSERIAL PRIMARY KEY,
    killmail_id BIGINT NOT NULL REFERENCES killmails (killmail_id) ON DELETE CASCADE,
    item_type_id BIGINT NOT NULL,
    flag BIGINT NOT NULL,
    quantity_destroyed BIGINT NOT NULL,
    quantity_dropped BIGINT NOT NULL,
    singleton BIGINT NOT NULL,
    container_type_id BIGINT
)
"#;

pub const CREATE_QUEUE_OFFSETS: &str = r#"
CREATE TABLE IF NOT EXISTS queue_offsets (
    queue TEXT PRIMARY KEY,
    committed_offset BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Flattened filter projection: victim scalars plus distinct, sorted
/// attacker arrays. Mirrors `FilterProjectionRow::from_killmail`.
pub const CREATE_KILLMAIL_FILTERS: &str = r#"
CREATE MATERIALIZED VIEW IF NOT EXISTS killmail_filters AS
SELECT
    k.killmail_id,
    k.killmail_time,
    k.solar_system_id,
    k.region_id,
    k.attacker_count,
    v.character_id AS victim_character_id,
    v.corporation_id AS victim_corporation_id,
    v.alliance_id AS victim_alliance_id,
    v.ship_type_id AS victim_ship_type_id,
    ARRAY(SELECT DISTINCT a.character_id FROM killmail_attackers a
          WHERE a.killmail_id = k.killmail_id AND a.character_id IS NOT NULL
          ORDER BY 1) AS attacker_character_ids,
    ARRAY(SELECT DISTINCT a.corporation_id FROM killmail_attackers a
          WHERE a.killmail_id = k.killmail_id AND a.corporation_id IS NOT NULL
          ORDER BY 1) AS attacker_corporation_ids,
    ARRAY(SELECT DISTINCT a.alliance_id FROM killmail_attackers a
          WHERE a.killmail_id = k.killmail_id AND a.alliance_id IS NOT NULL
          ORDER BY 1) AS attacker_alliance_ids,
    ARRAY(SELECT DISTINCT a.ship_type_id FROM killmail_attackers a
          WHERE a.killmail_id = k.killmail_id AND a.ship_type_id IS NOT NULL
          ORDER BY 1) AS attacker_ship_type_ids
FROM killmails k
JOIN killmail_victims v ON v.killmail_id = k.killmail_id
"#;

/// Kills and losses per character per UTC day.
pub const CREATE_CHARACTER_DAILY_ACTIVITY: &str = r#"
CREATE MATERIALIZED VIEW IF NOT EXISTS character_daily_activity AS
SELECT day, character_id, SUM(kills)::BIGINT AS kills, SUM(losses)::BIGINT AS losses
FROM (
    SELECT (k.killmail_time AT TIME ZONE 'UTC')::date AS day, a.character_id, 1 AS kills, 0 AS losses
    FROM killmails k
    JOIN (SELECT DISTINCT killmail_id, character_id FROM killmail_attackers
          WHERE character_id IS NOT NULL) a ON a.killmail_id = k.killmail_id
    UNION ALL
    SELECT (k.killmail_time AT TIME ZONE 'UTC')::date AS day, v.character_id, 0 AS kills, 1 AS losses
    FROM killmails k
    JOIN killmail_victims v ON v.killmail_id = k.killmail_id
    WHERE v.character_id IS NOT NULL
) participation
GROUP BY day, character_id
"#;

/// Indexes. The unique ones on the views are what allow
/// `REFRESH MATERIALIZED VIEW CONCURRENTLY`.
pub const CREATE_INDEXES: [&str; 12] = [
    "CREATE INDEX IF NOT EXISTS killmail_attackers_killmail_idx ON killmail_attackers (killmail_id)",
    "CREATE INDEX IF NOT EXISTS killmail_attackers_character_idx ON killmail_attackers (character_id)",
    "CREATE INDEX IF NOT EXISTS killmail_attackers_ship_idx ON killmail_attackers (ship_type_id)",
    "CREATE INDEX IF NOT EXISTS killmail_items_killmail_idx ON killmail_items (killmail_id)",
    "CREATE INDEX IF NOT EXISTS killmail_victims_character_idx ON killmail_victims (character_id)",
    "CREATE INDEX IF NOT EXISTS killmails_system_idx ON killmails (solar_system_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS killmail_filters_pk ON killmail_filters (killmail_id)",
    "CREATE INDEX IF NOT EXISTS killmail_filters_victim_ship_idx ON killmail_filters (victim_ship_type_id)",
    "CREATE INDEX IF NOT EXISTS killmail_filters_attacker_ships_idx ON killmail_filters USING GIN (attacker_ship_type_ids)",
    "CREATE INDEX IF NOT EXISTS killmail_filters_attacker_chars_idx ON killmail_filters USING GIN (attacker_character_ids)",
    "CREATE INDEX IF NOT EXISTS killmail_filters_attacker_corps_idx ON killmail_filters USING GIN (attacker_corporation_ids)",
    "CREATE UNIQUE INDEX IF NOT EXISTS character_daily_activity_pk ON character_daily_activity (day, character_id)",
];

/// All DDL in dependency order.
pub fn all_statements() -> Vec<&'static str> {
    let mut ddl = vec![
        CREATE_ITEM_CATEGORIES,
        CREATE_ITEM_GROUPS,
        CREATE_ITEM_TYPES,
        CREATE_REGIONS,
        CREATE_CONSTELLATIONS,
        CREATE_SOLAR_SYSTEMS,
        CREATE_ALLIANCES,
        CREATE_CORPORATIONS,
        CREATE_CHARACTERS,
        CREATE_KILLMAILS,
        CREATE_KILLMAIL_VICTIMS,
        CREATE_KILLMAIL_ATTACKERS,
        CREATE_KILLMAIL_ITEMS,
        CREATE_QUEUE_OFFSETS,
        CREATE_KILLMAIL_FILTERS,
        CREATE_CHARACTER_DAILY_ACTIVITY,
    ];
    ddl.extend(CREATE_INDEXES);
    ddl
}

/// Table and primary key column for an entity kind.
pub fn entity_table(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Category => ("item_categories", "category_id"),
        EntityKind::Group => ("item_groups", "group_id"),
        EntityKind::Type => ("item_types", "type_id"),
        EntityKind::Region => ("regions", "region_id"),
        EntityKind::Constellation => ("constellations", "constellation_id"),
        EntityKind::SolarSystem => ("solar_systems", "system_id"),
        EntityKind::Alliance => ("alliances", "alliance_id"),
        EntityKind::Corporation => ("corporations", "corporation_id"),
        EntityKind::Character => ("characters", "character_id"),
    }
}
