//! ESI response shapes and their mapping onto typed records.
//!
//! Only the fields the store keeps are declared; serde ignores the rest.
//! Mapping is where upstream data is validated on ingress.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sync_core::{
    Alliance, Attacker, Character, Constellation, Corporation, EntityKind, EntityRecord, Error,
    ItemCategory, ItemGroup, ItemType, Killmail, KillmailItem, Region, Result, SolarSystem,
    UpstreamErrorCode, Victim,
};

#[derive(Debug, Deserialize)]
pub struct CategoryDto {
    pub category_id: i64,
    pub name: String,
    pub published: bool,
}

#[derive(Debug, Deserialize)]
pub struct GroupDto {
    pub group_id: i64,
    pub category_id: i64,
    pub name: String,
    pub published: bool,
}

#[derive(Debug, Deserialize)]
pub struct TypeDto {
    pub type_id: i64,
    pub group_id: i64,
    pub name: String,
    pub published: bool,
    pub mass: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RegionDto {
    pub region_id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConstellationDto {
    pub constellation_id: i64,
    pub region_id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SystemDto {
    pub system_id: i64,
    pub constellation_id: i64,
    pub name: String,
    pub security_status: f64,
}

/// `/alliances/{id}/` does not echo the id.
#[derive(Debug, Deserialize)]
pub struct AllianceDto {
    pub name: String,
    pub ticker: String,
    pub executor_corporation_id: Option<i64>,
    pub date_founded: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CorporationDto {
    pub name: String,
    pub ticker: String,
    pub member_count: i64,
    pub alliance_id: Option<i64>,
    pub ceo_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CharacterDto {
    pub name: String,
    pub corporation_id: i64,
    pub alliance_id: Option<i64>,
    pub birthday: DateTime<Utc>,
    pub security_status: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct KillmailDto {
    pub killmail_id: i64,
    pub killmail_time: DateTime<Utc>,
    pub solar_system_id: i64,
    pub victim: VictimDto,
    #[serde(default)]
    pub attackers: Vec<AttackerDto>,
}

#[derive(Debug, Deserialize)]
pub struct VictimDto {
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub ship_type_id: i64,
    pub damage_taken: i64,
    #[serde(default)]
    pub items: Vec<ItemDto>,
}

#[derive(Debug, Deserialize)]
pub struct AttackerDto {
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub weapon_type_id: Option<i64>,
    pub damage_done: i64,
    pub final_blow: bool,
    pub security_status: f64,
}

#[derive(Debug, Deserialize)]
pub struct ItemDto {
    pub item_type_id: i64,
    pub flag: i64,
    #[serde(default)]
    pub quantity_destroyed: i64,
    #[serde(default)]
    pub quantity_dropped: i64,
    pub singleton: i64,
    /// Container contents.
    #[serde(default)]
    pub items: Vec<ItemDto>,
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, id: i64, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        Error::upstream(
            UpstreamErrorCode::Decode,
            format!("unexpected {} {} shape: {}", kind, id, e),
            None,
        )
    })
}

/// Map one ESI entity document onto its record.
///
/// `id` is the id that was requested; documents that echo their id must
/// agree with it.
pub fn entity_from_json(kind: EntityKind, id: i64, body: &[u8]) -> Result<EntityRecord> {
    let name = kind.as_str();
    let record = match kind {
        EntityKind::Category => {
            let d: CategoryDto = decode(name, id, body)?;
            EntityRecord::Category(ItemCategory {
                category_id: d.category_id,
                name: d.name,
                published: d.published,
            })
        }
        EntityKind::Group => {
            let d: GroupDto = decode(name, id, body)?;
            EntityRecord::Group(ItemGroup {
                group_id: d.group_id,
                category_id: d.category_id,
                name: d.name,
                published: d.published,
            })
        }
        EntityKind::Type => {
            let d: TypeDto = decode(name, id, body)?;
            EntityRecord::Type(ItemType {
                type_id: d.type_id,
                group_id: d.group_id,
                name: d.name,
                published: d.published,
                mass: d.mass,
                volume: d.volume,
            })
        }
        EntityKind::Region => {
            let d: RegionDto = decode(name, id, body)?;
            EntityRecord::Region(Region {
                region_id: d.region_id,
                name: d.name,
                description: d.description,
            })
        }
        EntityKind::Constellation => {
            let d: ConstellationDto = decode(name, id, body)?;
            EntityRecord::Constellation(Constellation {
                constellation_id: d.constellation_id,
                region_id: d.region_id,
                name: d.name,
            })
        }
        EntityKind::SolarSystem => {
            let d: SystemDto = decode(name, id, body)?;
            EntityRecord::SolarSystem(SolarSystem {
                system_id: d.system_id,
                constellation_id: d.constellation_id,
                name: d.name,
                security_status: d.security_status,
            })
        }
        EntityKind::Alliance => {
            let d: AllianceDto = decode(name, id, body)?;
            EntityRecord::Alliance(Alliance {
                alliance_id: id,
                name: d.name,
                ticker: d.ticker,
                executor_corporation_id: d.executor_corporation_id,
                date_founded: d.date_founded,
            })
        }
        EntityKind::Corporation => {
            let d: CorporationDto = decode(name, id, body)?;
            EntityRecord::Corporation(Corporation {
                corporation_id: id,
                name: d.name,
                ticker: d.ticker,
                member_count: d.member_count,
                alliance_id: d.alliance_id,
                ceo_id: d.ceo_id,
            })
        }
        EntityKind::Character => {
            let d: CharacterDto = decode(name, id, body)?;
            EntityRecord::Character(Character {
                character_id: id,
                name: d.name,
                corporation_id: d.corporation_id,
                alliance_id: d.alliance_id,
                birthday: d.birthday,
                security_status: d.security_status,
            })
        }
    };

    if record.id() != id {
        return Err(Error::upstream(
            UpstreamErrorCode::Decode,
            format!("requested {} {} but got id {}", name, id, record.id()),
            None,
        ));
    }
    Ok(record)
}

fn flatten_items(items: Vec<ItemDto>, container: Option<i64>, out: &mut Vec<KillmailItem>) {
    for item in items {
        out.push(KillmailItem {
            item_type_id: item.item_type_id,
            flag: item.flag,
            quantity_destroyed: item.quantity_destroyed,
            quantity_dropped: item.quantity_dropped,
            singleton: item.singleton,
            container_type_id: container,
        });
        flatten_items(item.items, Some(item.item_type_id), out);
    }
}

/// Map a killmail document. Region is resolved later from local geography.
pub fn killmail_from_json(killmail_id: i64, hash: &str, body: &[u8]) -> Result<Killmail> {
    let d: KillmailDto = decode("killmail", killmail_id, body)?;
    if d.killmail_id != killmail_id {
        return Err(Error::upstream(
            UpstreamErrorCode::Decode,
            format!("requested killmail {} but got {}", killmail_id, d.killmail_id),
            None,
        ));
    }

    let mut items = Vec::new();
    flatten_items(d.victim.items, None, &mut items);

    Ok(Killmail {
        killmail_id: d.killmail_id,
        killmail_hash: hash.to_string(),
        killmail_time: d.killmail_time,
        solar_system_id: d.solar_system_id,
        region_id: None,
        victim: Victim {
            character_id: d.victim.character_id,
            corporation_id: d.victim.corporation_id,
            alliance_id: d.victim.alliance_id,
            ship_type_id: d.victim.ship_type_id,
            damage_taken: d.victim.damage_taken,
        },
        attackers: d
            .attackers
            .into_iter()
            .map(|a| Attacker {
                character_id: a.character_id,
                corporation_id: a.corporation_id,
                alliance_id: a.alliance_id,
                ship_type_id: a.ship_type_id,
                weapon_type_id: a.weapon_type_id,
                damage_done: a.damage_done,
                final_blow: a.final_blow,
                security_status: a.security_status,
            })
            .collect(),
        items,
    })
}
