//! Entity records synced from the upstream API.
//!
//! Every upstream document is mapped onto one of these structs at the
//! boundary; nothing untyped flows past the sync worker.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The entity types the sync pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Group,
    Type,
    Region,
    Constellation,
    SolarSystem,
    Alliance,
    Corporation,
    Character,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        Self::Category,
        Self::Group,
        Self::Type,
        Self::Region,
        Self::Constellation,
        Self::SolarSystem,
        Self::Alliance,
        Self::Corporation,
        Self::Character,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Group => "group",
            Self::Type => "type",
            Self::Region => "region",
            Self::Constellation => "constellation",
            Self::SolarSystem => "solar_system",
            Self::Alliance => "alliance",
            Self::Corporation => "corporation",
            Self::Character => "character",
        }
    }

    /// Reference data rarely changes upstream; once stored it is never refetched.
    pub fn is_reference(&self) -> bool {
        !self.is_mutable()
    }

    /// Organizations and individuals change upstream and are overwritten on every delivery.
    pub fn is_mutable(&self) -> bool {
        matches!(self, Self::Alliance | Self::Corporation | Self::Character)
    }

    /// Kinds whose ID space comes from locally ingested killmails rather than an upstream list.
    pub fn is_dependent(&self) -> bool {
        matches!(self, Self::Corporation | Self::Character)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::config(format!("unknown entity kind: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCategory {
    pub category_id: i64,
    pub name: String,
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemGroup {
    pub group_id: i64,
    pub category_id: i64,
    pub name: String,
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemType {
    pub type_id: i64,
    pub group_id: i64,
    pub name: String,
    pub published: bool,
    pub mass: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub region_id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constellation {
    pub constellation_id: i64,
    pub region_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarSystem {
    pub system_id: i64,
    pub constellation_id: i64,
    pub name: String,
    pub security_status: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alliance {
    pub alliance_id: i64,
    pub name: String,
    pub ticker: String,
    pub executor_corporation_id: Option<i64>,
    pub date_founded: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corporation {
    pub corporation_id: i64,
    pub name: String,
    pub ticker: String,
    pub member_count: i64,
    pub alliance_id: Option<i64>,
    pub ceo_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub character_id: i64,
    pub name: String,
    pub corporation_id: i64,
    pub alliance_id: Option<i64>,
    pub birthday: DateTime<Utc>,
    pub security_status: Option<f64>,
}

/// One synced entity, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRecord {
    Category(ItemCategory),
    Group(ItemGroup),
    Type(ItemType),
    Region(Region),
    Constellation(Constellation),
    SolarSystem(SolarSystem),
    Alliance(Alliance),
    Corporation(Corporation),
    Character(Character),
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Category(_) => EntityKind::Category,
            Self::Group(_) => EntityKind::Group,
            Self::Type(_) => EntityKind::Type,
            Self::Region(_) => EntityKind::Region,
            Self::Constellation(_) => EntityKind::Constellation,
            Self::SolarSystem(_) => EntityKind::SolarSystem,
            Self::Alliance(_) => EntityKind::Alliance,
            Self::Corporation(_) => EntityKind::Corporation,
            Self::Character(_) => EntityKind::Character,
        }
    }

    /// The upstream numeric ID.
    pub fn id(&self) -> i64 {
        match self {
            Self::Category(e) => e.category_id,
            Self::Group(e) => e.group_id,
            Self::Type(e) => e.type_id,
            Self::Region(e) => e.region_id,
            Self::Constellation(e) => e.constellation_id,
            Self::SolarSystem(e) => e.system_id,
            Self::Alliance(e) => e.alliance_id,
            Self::Corporation(e) => e.corporation_id,
            Self::Character(e) => e.character_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Category(e) => &e.name,
            Self::Group(e) => &e.name,
            Self::Type(e) => &e.name,
            Self::Region(e) => &e.name,
            Self::Constellation(e) => &e.name,
            Self::SolarSystem(e) => &e.name,
            Self::Alliance(e) => &e.name,
            Self::Corporation(e) => &e.name,
            Self::Character(e) => &e.name,
        }
    }
}

/// One row of the daily per-character aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub day: NaiveDate,
    pub character_id: i64,
    pub kills: i64,
    pub losses: i64,
}
