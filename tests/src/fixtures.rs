//! Test fixtures: entities and killmails.

use chrono::{TimeZone, Utc};
use sync_core::{
    Attacker, Character, Constellation, Corporation, EntityRecord, ItemType, Killmail,
    KillmailItem, KillmailRef, Region, SolarSystem, Victim, source,
};

pub const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

pub const JITA: i64 = 30000142;
pub const THE_FORGE: i64 = 10000002;
pub const KIMOTORO: i64 = 20000020;

pub fn item_type(type_id: i64) -> EntityRecord {
    EntityRecord::Type(ItemType {
        type_id,
        group_id: 25,
        name: format!("Type {}", type_id),
        published: true,
        mass: Some(1_000_000.0),
        volume: Some(20_000.0),
    })
}

pub fn character(character_id: i64, name: &str) -> EntityRecord {
    EntityRecord::Character(Character {
        character_id,
        name: name.to_string(),
        corporation_id: 98000001,
        alliance_id: None,
        birthday: Utc.with_ymd_and_hms(2015, 3, 1, 0, 0, 0).unwrap(),
        security_status: Some(1.2),
    })
}

pub fn corporation(corporation_id: i64, member_count: i64) -> EntityRecord {
    EntityRecord::Corporation(Corporation {
        corporation_id,
        name: format!("Corp {}", corporation_id),
        ticker: "CRP".to_string(),
        member_count,
        alliance_id: None,
        ceo_id: 90000001,
    })
}

/// Jita, Kimotoro and The Forge, enough to resolve a region.
pub fn jita_geography() -> Vec<EntityRecord> {
    vec![
        EntityRecord::Region(Region {
            region_id: THE_FORGE,
            name: "The Forge".to_string(),
            description: None,
        }),
        EntityRecord::Constellation(Constellation {
            constellation_id: KIMOTORO,
            region_id: THE_FORGE,
            name: "Kimotoro".to_string(),
        }),
        EntityRecord::SolarSystem(SolarSystem {
            system_id: JITA,
            constellation_id: KIMOTORO,
            name: "Jita".to_string(),
            security_status: 0.9,
        }),
    ]
}

pub fn attacker(character_id: i64, ship_type_id: i64) -> Attacker {
    Attacker {
        character_id: Some(character_id),
        corporation_id: Some(character_id + 1_000),
        alliance_id: None,
        ship_type_id: Some(ship_type_id),
        weapon_type_id: None,
        damage_done: 100,
        final_blow: false,
        security_status: 0.5,
    }
}

pub fn victim(character_id: i64, ship_type_id: i64) -> Victim {
    Victim {
        character_id: Some(character_id),
        corporation_id: Some(character_id + 1_000),
        alliance_id: None,
        ship_type_id,
        damage_taken: 2_500,
    }
}

/// A killmail in Jita at the current time, region left for the store to resolve.
pub fn killmail(killmail_id: i64, victim: Victim, attackers: Vec<Attacker>) -> Killmail {
    let mut attackers = attackers;
    if let Some(first) = attackers.first_mut() {
        first.final_blow = true;
    }
    Killmail {
        killmail_id,
        killmail_hash: HASH.to_string(),
        killmail_time: Utc::now(),
        solar_system_id: JITA,
        region_id: None,
        victim,
        attackers,
        items: vec![KillmailItem {
            item_type_id: 2048,
            flag: 5,
            quantity_destroyed: 1,
            quantity_dropped: 0,
            singleton: 0,
            container_type_id: None,
        }],
    }
}

pub fn killmail_ref(killmail_id: i64) -> KillmailRef {
    KillmailRef::new(killmail_id, HASH, source::REDISQ)
}
